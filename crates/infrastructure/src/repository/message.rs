use application::{HistoryQuery, MessageRepository, Page};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    AccountId, Message, MessageId, MessageMetadata, MessageType, NewMessage, RepositoryError,
    SessionId,
};
use sqlx::{types::Json, FromRow, PgPool};
use uuid::Uuid;

use super::{invalid_data, map_sqlx_err, page, to_count};

const MESSAGE_COLUMNS: &str = "id, session_id, author_id, content, message_type, metadata, \
     parent_message_id, order_index, created_at";
const ORDER_CONSTRAINT: &str = "messages_session_order_key";
/// 序号冲突时的最大尝试次数
const APPEND_ATTEMPTS: usize = 3;

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    session_id: Uuid,
    author_id: Uuid,
    content: String,
    message_type: String,
    metadata: Json<MessageMetadata>,
    parent_message_id: Option<Uuid>,
    order_index: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for Message {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        Ok(Message {
            id: MessageId::from(value.id),
            session_id: SessionId::from(value.session_id),
            author_id: AccountId::from(value.author_id),
            content: value.content,
            message_type: value
                .message_type
                .parse::<MessageType>()
                .map_err(|err| invalid_data(err.to_string()))?,
            metadata: value.metadata.0,
            parent_message_id: value.parent_message_id.map(MessageId::from),
            order_index: value.order_index,
            created_at: value.created_at,
        })
    }
}

fn into_messages(records: Vec<MessageRecord>) -> Result<Vec<Message>, RepositoryError> {
    records.into_iter().map(Message::try_from).collect()
}

/// 转义 LIKE 通配符，按字面量匹配
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_append(&self, message: &NewMessage) -> Result<MessageRecord, RepositoryError> {
        sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            INSERT INTO messages ({MESSAGE_COLUMNS})
            SELECT $1, $2, $3, $4, $5, $6, $7, COALESCE(MAX(order_index), 0) + 1, $8
            FROM messages
            WHERE session_id = $2
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::from(message.id))
        .bind(Uuid::from(message.session_id))
        .bind(Uuid::from(message.author_id))
        .bind(&message.content)
        .bind(message.message_type.as_str())
        .bind(Json(&message.metadata))
        .bind(message.parent_message_id.map(Uuid::from))
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let mut attempt = 1;
        loop {
            match self.try_append(&message).await {
                Ok(record) => return Message::try_from(record),
                Err(RepositoryError::Conflict { constraint })
                    if constraint == ORDER_CONSTRAINT && attempt < APPEND_ATTEMPTS =>
                {
                    tracing::debug!(
                        session_id = %message.session_id,
                        attempt,
                        "order index taken by a concurrent writer, retrying"
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn history(
        &self,
        session_id: SessionId,
        query: HistoryQuery,
    ) -> Result<Page<Message>, RepositoryError> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE session_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            ORDER BY order_index ASC, created_at ASC
            LIMIT $4 OFFSET $5
            "#
        ))
        .bind(Uuid::from(session_id))
        .bind(query.from)
        .bind(query.to)
        .bind(i64::from(query.limit))
        .bind(i64::from(query.offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE session_id = $1
              AND ($2::timestamptz IS NULL OR created_at >= $2)
              AND ($3::timestamptz IS NULL OR created_at <= $3)
            "#,
        )
        .bind(Uuid::from(session_id))
        .bind(query.from)
        .bind(query.to)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(page(into_messages(records)?, total, query.offset))
    }

    async fn search(
        &self,
        session_id: SessionId,
        needle: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Message>, RepositoryError> {
        let pattern = like_pattern(needle);
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE session_id = $1 AND content ILIKE $2
            ORDER BY order_index DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(Uuid::from(session_id))
        .bind(&pattern)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE session_id = $1 AND content ILIKE $2",
        )
        .bind(Uuid::from(session_id))
        .bind(&pattern)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(page(into_messages(records)?, total, offset))
    }

    async fn count_for_session(&self, session_id: SessionId) -> Result<u64, RepositoryError> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE session_id = $1")
            .bind(Uuid::from(session_id))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(to_count(total))
    }

    async fn delete_owned(
        &self,
        id: MessageId,
        owner_id: AccountId,
    ) -> Result<Option<Message>, RepositoryError> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            DELETE FROM messages m
            USING chat_sessions s
            WHERE m.id = $1 AND m.session_id = s.id AND s.owner_id = $2
            RETURNING m.id, m.session_id, m.author_id, m.content, m.message_type, m.metadata,
                      m.parent_message_id, m.order_index, m.created_at
            "#,
        )
        .bind(Uuid::from(id))
        .bind(Uuid::from(owner_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Message::try_from).transpose()
    }
}
