use application::PreferencesRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{AccountId, AiPreferences, Preferences, ProfileVisibility, RepositoryError, Theme};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{invalid_data, map_sqlx_err};

const PREFERENCES_COLUMNS: &str = "account_id, theme, language, timezone, notifications_enabled, \
     email_notifications, push_notifications, ai_preferences, profile_visibility, data_sharing, \
     created_at, updated_at";

#[derive(Debug, FromRow)]
struct PreferencesRecord {
    account_id: Uuid,
    theme: String,
    language: String,
    timezone: String,
    notifications_enabled: bool,
    email_notifications: bool,
    push_notifications: bool,
    ai_preferences: Json<AiPreferences>,
    profile_visibility: String,
    data_sharing: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PreferencesRecord> for Preferences {
    type Error = RepositoryError;

    fn try_from(value: PreferencesRecord) -> Result<Self, Self::Error> {
        Ok(Preferences {
            account_id: AccountId::from(value.account_id),
            theme: value
                .theme
                .parse::<Theme>()
                .map_err(|err| invalid_data(err.to_string()))?,
            language: value.language,
            timezone: value.timezone,
            notifications_enabled: value.notifications_enabled,
            email_notifications: value.email_notifications,
            push_notifications: value.push_notifications,
            ai_preferences: value.ai_preferences.0,
            profile_visibility: value
                .profile_visibility
                .parse::<ProfileVisibility>()
                .map_err(|err| invalid_data(err.to_string()))?,
            data_sharing: value.data_sharing,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgPreferencesRepository {
    pool: PgPool,
}

impl PgPreferencesRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PreferencesRepository for PgPreferencesRepository {
    async fn create(&self, preferences: &Preferences) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO user_preferences ({PREFERENCES_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(Uuid::from(preferences.account_id))
        .bind(preferences.theme.as_str())
        .bind(&preferences.language)
        .bind(&preferences.timezone)
        .bind(preferences.notifications_enabled)
        .bind(preferences.email_notifications)
        .bind(preferences.push_notifications)
        .bind(Json(&preferences.ai_preferences))
        .bind(preferences.profile_visibility.as_str())
        .bind(preferences.data_sharing)
        .bind(preferences.created_at)
        .bind(preferences.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn find(&self, account_id: AccountId) -> Result<Option<Preferences>, RepositoryError> {
        let record = sqlx::query_as::<_, PreferencesRecord>(&format!(
            "SELECT {PREFERENCES_COLUMNS} FROM user_preferences WHERE account_id = $1"
        ))
        .bind(Uuid::from(account_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Preferences::try_from).transpose()
    }

    async fn upsert(&self, preferences: &Preferences) -> Result<Preferences, RepositoryError> {
        // created_at 只在首次插入时写入
        let record = sqlx::query_as::<_, PreferencesRecord>(&format!(
            r#"
            INSERT INTO user_preferences ({PREFERENCES_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (account_id) DO UPDATE SET
                theme = EXCLUDED.theme,
                language = EXCLUDED.language,
                timezone = EXCLUDED.timezone,
                notifications_enabled = EXCLUDED.notifications_enabled,
                email_notifications = EXCLUDED.email_notifications,
                push_notifications = EXCLUDED.push_notifications,
                ai_preferences = EXCLUDED.ai_preferences,
                profile_visibility = EXCLUDED.profile_visibility,
                data_sharing = EXCLUDED.data_sharing,
                updated_at = EXCLUDED.updated_at
            RETURNING {PREFERENCES_COLUMNS}
            "#
        ))
        .bind(Uuid::from(preferences.account_id))
        .bind(preferences.theme.as_str())
        .bind(&preferences.language)
        .bind(&preferences.timezone)
        .bind(preferences.notifications_enabled)
        .bind(preferences.email_notifications)
        .bind(preferences.push_notifications)
        .bind(Json(&preferences.ai_preferences))
        .bind(preferences.profile_visibility.as_str())
        .bind(preferences.data_sharing)
        .bind(preferences.created_at)
        .bind(preferences.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Preferences::try_from(record)
    }

    async fn delete(&self, account_id: AccountId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM user_preferences WHERE account_id = $1")
            .bind(Uuid::from(account_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}
