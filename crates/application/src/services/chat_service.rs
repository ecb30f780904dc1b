use std::sync::Arc;

use domain::{
    validate_content, validate_title, AccountId, ChatSession, DomainError, Message, MessageId,
    MessageMetadata, MessageType, NewMessage, SessionId, SessionSettings, SessionStatus,
    Timestamp,
};

use crate::{
    cache::{CachedHistory, SessionCache},
    clock::Clock,
    dto::Page,
    error::ApplicationError,
    repository::{HistoryQuery, MessageRepository, SessionRepository},
};

pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_SESSION_PAGE_SIZE: u32 = 20;
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;
pub const DEFAULT_SEARCH_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub owner_id: AccountId,
    pub title: String,
    pub settings: Option<SessionSettings>,
}

#[derive(Debug, Clone)]
pub struct ListSessionsRequest {
    pub owner_id: AccountId,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct UpdateSessionRequest {
    pub session_id: SessionId,
    pub owner_id: AccountId,
    pub title: Option<String>,
    pub status: Option<SessionStatus>,
    pub settings: Option<SessionSettings>,
}

#[derive(Debug, Clone)]
pub struct SendMessageRequest {
    pub session_id: SessionId,
    pub author_id: AccountId,
    pub content: String,
    pub message_type: MessageType,
    pub metadata: Option<MessageMetadata>,
    pub parent_message_id: Option<MessageId>,
}

#[derive(Debug, Clone)]
pub struct ChatHistoryRequest {
    pub session_id: SessionId,
    pub requester_id: AccountId,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct SearchMessagesRequest {
    pub session_id: SessionId,
    pub requester_id: AccountId,
    pub query: String,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// 会话与消息的配额
#[derive(Debug, Clone, Copy)]
pub struct ChatLimits {
    pub max_active_sessions: u64,
    pub max_messages_per_session: u64,
    pub max_message_length: usize,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            max_active_sessions: 50,
            max_messages_per_session: 10_000,
            max_message_length: 10_000,
        }
    }
}

pub struct ChatServiceDependencies {
    pub session_repository: Arc<dyn SessionRepository>,
    pub message_repository: Arc<dyn MessageRepository>,
    pub cache: SessionCache,
    pub clock: Arc<dyn Clock>,
    pub limits: ChatLimits,
}

/// 会话与消息用例。
///
/// 持久化存储是事实来源：读路径先查缓存，未命中再查库并异步回填；
/// 写路径先落库，再使相关缓存失效。缓存问题只记录日志。
pub struct ChatService {
    deps: ChatServiceDependencies,
}

impl ChatService {
    pub fn new(deps: ChatServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<ChatSession, ApplicationError> {
        let now = self.deps.clock.now();
        let session = ChatSession::new(
            SessionId::generate(),
            request.owner_id,
            &request.title,
            request.settings.unwrap_or_default(),
            now,
        )?;

        self.ensure_active_quota(request.owner_id).await?;

        let session = self.deps.session_repository.create(&session).await?;
        tracing::info!(session_id = %session.id, owner_id = %session.owner_id, "session created");
        Ok(session)
    }

    pub async fn get_session(
        &self,
        session_id: SessionId,
        requester_id: AccountId,
    ) -> Result<ChatSession, ApplicationError> {
        if let Some(session) = self.deps.cache.session(session_id).await {
            if session.is_owned_by(requester_id) {
                return Ok(session);
            }
        }

        let session = self
            .deps
            .session_repository
            .find_owned(session_id, requester_id)
            .await?
            .ok_or(DomainError::SessionNotFound)?;

        let cache = self.deps.cache.clone();
        let cached = session.clone();
        tokio::spawn(async move {
            cache.store_session(&cached).await;
        });
        Ok(session)
    }

    pub async fn list_sessions(
        &self,
        request: ListSessionsRequest,
    ) -> Result<Page<ChatSession>, ApplicationError> {
        let limit = page_limit(request.limit, DEFAULT_SESSION_PAGE_SIZE);
        let offset = request.offset.unwrap_or(0);
        Ok(self
            .deps
            .session_repository
            .list_for_owner(request.owner_id, limit, offset)
            .await?)
    }

    pub async fn update_session(
        &self,
        request: UpdateSessionRequest,
    ) -> Result<ChatSession, ApplicationError> {
        // 以库中数据为准，避免基于过期缓存写回
        let mut session = self
            .deps
            .session_repository
            .find_owned(request.session_id, request.owner_id)
            .await?
            .ok_or(DomainError::SessionNotFound)?;

        if let Some(title) = request.title {
            session.title = validate_title(&title)?;
        }
        if let Some(settings) = request.settings {
            settings.validate()?;
            session.settings = settings;
        }
        if let Some(status) = request.status {
            // 重新激活与新建一样占用活跃配额
            if status == SessionStatus::Active && session.status != SessionStatus::Active {
                self.ensure_active_quota(request.owner_id).await?;
            }
            session.status = status;
        }
        session.updated_at = self.deps.clock.now();

        let session = self.deps.session_repository.update(&session).await?;
        self.deps.cache.invalidate(session.id).await;
        Ok(session)
    }

    /// 删除即归档
    pub async fn delete_session(
        &self,
        session_id: SessionId,
        owner_id: AccountId,
    ) -> Result<(), ApplicationError> {
        let mut session = self
            .deps
            .session_repository
            .find_owned(session_id, owner_id)
            .await?
            .ok_or(DomainError::SessionNotFound)?;
        session.archive(self.deps.clock.now());
        self.deps.session_repository.update(&session).await?;
        self.deps.cache.invalidate(session_id).await;
        tracing::info!(session_id = %session_id, "session archived");
        Ok(())
    }

    pub async fn send_message(
        &self,
        request: SendMessageRequest,
    ) -> Result<Message, ApplicationError> {
        validate_content(&request.content, self.deps.limits.max_message_length)?;

        // 状态检查以库为准，缓存可能落后于暂停/归档
        let session = self
            .deps
            .session_repository
            .find_owned(request.session_id, request.author_id)
            .await?
            .ok_or(DomainError::SessionNotFound)?;
        session.ensure_accepts_messages()?;

        let count = self
            .deps
            .message_repository
            .count_for_session(session.id)
            .await?;
        if count >= self.deps.limits.max_messages_per_session {
            return Err(DomainError::LimitExceeded {
                resource: "messages_per_session",
                max: self.deps.limits.max_messages_per_session,
            }
            .into());
        }

        let now = self.deps.clock.now();
        let message = self
            .deps
            .message_repository
            .append(NewMessage {
                id: MessageId::generate(),
                session_id: session.id,
                author_id: request.author_id,
                content: request.content,
                message_type: request.message_type,
                metadata: request.metadata.unwrap_or_default(),
                parent_message_id: request.parent_message_id,
                created_at: now,
            })
            .await?;

        if let Err(err) = self.deps.session_repository.touch(session.id, now).await {
            tracing::warn!(session_id = %session.id, error = %err, "failed to bump session activity");
        }
        self.deps.cache.invalidate(session.id).await;

        tracing::debug!(
            session_id = %session.id,
            message_id = %message.id,
            order_index = message.order_index,
            "message stored"
        );
        Ok(message)
    }

    /// 序号升序；不带日期过滤的首页走缓存
    pub async fn get_chat_history(
        &self,
        request: ChatHistoryRequest,
    ) -> Result<Page<Message>, ApplicationError> {
        let session = self
            .get_session(request.session_id, request.requester_id)
            .await?;

        let query = HistoryQuery {
            limit: page_limit(request.limit, DEFAULT_HISTORY_PAGE_SIZE),
            offset: request.offset.unwrap_or(0),
            from: request.from,
            to: request.to,
        };
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(DomainError::invalid_argument("from", "must not be after 'to'").into());
            }
        }
        let first_page = query.offset == 0 && !query.has_date_filter();

        if first_page {
            if let Some(cached) = self.deps.cache.recent_messages(session.id).await {
                if cached.messages.len() >= query.limit as usize
                    || cached.messages.len() as u64 == cached.total_count
                {
                    let items: Vec<Message> = cached
                        .messages
                        .into_iter()
                        .take(query.limit as usize)
                        .collect();
                    return Ok(Page::new(items, cached.total_count, 0));
                }
            }
        }

        let page = self
            .deps
            .message_repository
            .history(session.id, query)
            .await?;

        if first_page && !page.items.is_empty() {
            let cache = self.deps.cache.clone();
            let history = CachedHistory {
                messages: page.items.clone(),
                total_count: page.total_count,
            };
            let session_id = session.id;
            tokio::spawn(async move {
                cache.store_recent_messages(session_id, &history).await;
            });
        }
        Ok(page)
    }

    /// 消息所在会话不属于调用者时与消息不存在同样处理
    pub async fn delete_message(
        &self,
        message_id: MessageId,
        requester_id: AccountId,
    ) -> Result<(), ApplicationError> {
        let deleted = self
            .deps
            .message_repository
            .delete_owned(message_id, requester_id)
            .await?
            .ok_or(DomainError::MessageNotFound)?;
        self.deps.cache.invalidate(deleted.session_id).await;
        Ok(())
    }

    pub async fn search_messages(
        &self,
        request: SearchMessagesRequest,
    ) -> Result<Page<Message>, ApplicationError> {
        let needle = request.query.trim();
        if needle.is_empty() {
            return Err(DomainError::invalid_argument("query", "cannot be empty").into());
        }
        let session = self
            .get_session(request.session_id, request.requester_id)
            .await?;
        let limit = page_limit(request.limit, DEFAULT_SEARCH_PAGE_SIZE);
        let offset = request.offset.unwrap_or(0);
        Ok(self
            .deps
            .message_repository
            .search(session.id, needle, limit, offset)
            .await?)
    }

    pub async fn update_typing_status(
        &self,
        session_id: SessionId,
        account_id: AccountId,
        is_typing: bool,
    ) -> Result<(), ApplicationError> {
        let session = self.get_session(session_id, account_id).await?;
        if is_typing {
            self.deps.cache.add_typing(session.id, account_id).await;
        } else {
            self.deps.cache.remove_typing(session.id, account_id).await;
        }
        Ok(())
    }

    pub async fn get_typing_users(
        &self,
        session_id: SessionId,
        requester_id: AccountId,
    ) -> Result<Vec<AccountId>, ApplicationError> {
        let session = self.get_session(session_id, requester_id).await?;
        Ok(self.deps.cache.typing_users(session.id).await)
    }

    async fn ensure_active_quota(&self, owner_id: AccountId) -> Result<(), ApplicationError> {
        let active = self.deps.session_repository.count_active(owner_id).await?;
        if active >= self.deps.limits.max_active_sessions {
            return Err(DomainError::LimitExceeded {
                resource: "active_sessions",
                max: self.deps.limits.max_active_sessions,
            }
            .into());
        }
        Ok(())
    }
}

/// 0 或缺省取默认值，超过上限截断
fn page_limit(requested: Option<u32>, default: u32) -> u32 {
    match requested {
        None | Some(0) => default,
        Some(limit) => limit.min(MAX_PAGE_SIZE),
    }
}
