use application::{ActivityRepository, LoginAttemptRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    AccountId, ActivityEvent, ActivityType, LoginAttempt, RepositoryError, Timestamp, UserStats,
};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{map_sqlx_err, to_count};

#[derive(Debug, FromRow)]
struct ActivityCountRecord {
    activity_type: String,
    total: i64,
}

#[derive(Clone)]
pub struct PgActivityRepository {
    pool: PgPool,
}

impl PgActivityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivityRepository for PgActivityRepository {
    async fn record(&self, event: &ActivityEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO activity_events (
                account_id, activity_type, metadata, ip_address, user_agent, session_id, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::from(event.account_id))
        .bind(event.activity_type.as_str())
        .bind(Json(&event.metadata))
        .bind(event.ip_address.as_deref())
        .bind(event.user_agent.as_deref())
        .bind(event.session_id.as_deref())
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }

    async fn stats(
        &self,
        account_id: AccountId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<UserStats, RepositoryError> {
        let rows = sqlx::query_as::<_, ActivityCountRecord>(
            r#"
            SELECT activity_type, COUNT(*) AS total
            FROM activity_events
            WHERE account_id = $1 AND created_at BETWEEN $2 AND $3
            GROUP BY activity_type
            "#,
        )
        .bind(Uuid::from(account_id))
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let last_activity = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            r#"
            SELECT MAX(created_at)
            FROM activity_events
            WHERE account_id = $1 AND created_at BETWEEN $2 AND $3
            "#,
        )
        .bind(Uuid::from(account_id))
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let counts = rows.into_iter().filter_map(|row| {
            match row.activity_type.parse::<ActivityType>() {
                Ok(kind) => Some((kind, to_count(row.total))),
                Err(_) => {
                    tracing::warn!(
                        activity_type = %row.activity_type,
                        "skipping unknown activity type in stats"
                    );
                    None
                }
            }
        });
        Ok(UserStats::from_counts(counts, last_activity))
    }

    async fn delete_for_account(&self, account_id: AccountId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM activity_events WHERE account_id = $1")
            .bind(Uuid::from(account_id))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgLoginAttemptRepository {
    pool: PgPool,
}

impl PgLoginAttemptRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LoginAttemptRepository for PgLoginAttemptRepository {
    async fn record(&self, attempt: &LoginAttempt) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO login_attempts (
                email, account_id, succeeded, failure_reason, ip_address, user_agent, attempted_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&attempt.email)
        .bind(attempt.account_id.map(Uuid::from))
        .bind(attempt.succeeded)
        .bind(attempt.failure_reason.as_deref())
        .bind(attempt.ip_address.as_deref())
        .bind(attempt.user_agent.as_deref())
        .bind(attempt.attempted_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}
