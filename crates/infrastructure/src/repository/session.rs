use application::{Page, SessionRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    AccountId, ChatSession, RepositoryError, SessionId, SessionSettings, SessionStatus, Timestamp,
};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{invalid_data, map_sqlx_err, page, to_count};

const SESSION_COLUMNS: &str =
    "id, owner_id, title, status, settings, created_at, updated_at, last_activity_at";

#[derive(Debug, FromRow)]
struct SessionRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    status: String,
    settings: Json<SessionSettings>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl TryFrom<SessionRecord> for ChatSession {
    type Error = RepositoryError;

    fn try_from(value: SessionRecord) -> Result<Self, Self::Error> {
        Ok(ChatSession {
            id: SessionId::from(value.id),
            owner_id: AccountId::from(value.owner_id),
            title: value.title,
            status: value
                .status
                .parse::<SessionStatus>()
                .map_err(|err| invalid_data(err.to_string()))?,
            settings: value.settings.0,
            created_at: value.created_at,
            updated_at: value.updated_at,
            last_activity_at: value.last_activity_at,
        })
    }
}

#[derive(Clone)]
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            r#"
            INSERT INTO chat_sessions ({SESSION_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(Uuid::from(session.id))
        .bind(Uuid::from(session.owner_id))
        .bind(&session.title)
        .bind(session.status.as_str())
        .bind(Json(&session.settings))
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.last_activity_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        ChatSession::try_from(record)
    }

    async fn find_owned(
        &self,
        id: SessionId,
        owner_id: AccountId,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            "SELECT {SESSION_COLUMNS} FROM chat_sessions WHERE id = $1 AND owner_id = $2"
        ))
        .bind(Uuid::from(id))
        .bind(Uuid::from(owner_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(ChatSession::try_from).transpose()
    }

    async fn list_for_owner(
        &self,
        owner_id: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Page<ChatSession>, RepositoryError> {
        let records = sqlx::query_as::<_, SessionRecord>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM chat_sessions
            WHERE owner_id = $1 AND status <> 'archived'
            ORDER BY last_activity_at DESC, id
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(Uuid::from(owner_id))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chat_sessions WHERE owner_id = $1 AND status <> 'archived'",
        )
        .bind(Uuid::from(owner_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let sessions = records
            .into_iter()
            .map(ChatSession::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(page(sessions, total, offset))
    }

    async fn update(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        let record = sqlx::query_as::<_, SessionRecord>(&format!(
            r#"
            UPDATE chat_sessions
            SET title = $3, status = $4, settings = $5, updated_at = $6, last_activity_at = $7
            WHERE id = $1 AND owner_id = $2
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(Uuid::from(session.id))
        .bind(Uuid::from(session.owner_id))
        .bind(&session.title)
        .bind(session.status.as_str())
        .bind(Json(&session.settings))
        .bind(session.updated_at)
        .bind(session.last_activity_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        ChatSession::try_from(record)
    }

    async fn count_active(&self, owner_id: AccountId) -> Result<u64, RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM chat_sessions WHERE owner_id = $1 AND status = 'active'",
        )
        .bind(Uuid::from(owner_id))
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;
        Ok(to_count(total))
    }

    async fn touch(&self, id: SessionId, at: Timestamp) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE chat_sessions SET last_activity_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
