//! `chat.ChatService` 的 RPC 路由

use application::{
    ApplicationError, ChatHistoryRequest, CreateSessionRequest, ListSessionsRequest, Page,
    SearchMessagesRequest, SendMessageRequest, UpdateSessionRequest,
};
use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use domain::{
    AccountId, ChatSession, Message, MessageId, MessageMetadata, MessageType, SessionId,
    SessionSettings, SessionStatus,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    rpc::{done, respond, Done, RpcResult},
    state::ChatApiState,
};

#[derive(Debug, Deserialize)]
struct CreateSessionPayload {
    user_id: String,
    title: String,
    settings: Option<SessionSettings>,
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    session_id: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct UserSessionsPayload {
    user_id: String,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UpdateSessionPayload {
    session_id: String,
    user_id: String,
    title: Option<String>,
    status: Option<String>,
    settings: Option<SessionSettings>,
}

#[derive(Debug, Deserialize)]
struct SendMessagePayload {
    session_id: String,
    user_id: String,
    content: String,
    message_type: Option<String>,
    metadata: Option<MessageMetadata>,
    parent_message_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryPayload {
    session_id: String,
    user_id: String,
    limit: Option<u32>,
    offset: Option<u32>,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct DeleteMessagePayload {
    message_id: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    session_id: String,
    user_id: String,
    query: String,
    limit: Option<u32>,
    offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TypingPayload {
    session_id: String,
    user_id: String,
    is_typing: bool,
}

#[derive(Debug, Serialize)]
struct SessionReply {
    session: ChatSession,
}

#[derive(Debug, Serialize)]
struct SessionsReply {
    sessions: Vec<ChatSession>,
    total_count: u64,
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct MessageReply {
    message: Message,
}

#[derive(Debug, Serialize)]
struct MessagesReply {
    messages: Vec<Message>,
    total_count: u64,
    has_more: bool,
}

impl From<Page<Message>> for MessagesReply {
    fn from(page: Page<Message>) -> Self {
        Self {
            messages: page.items,
            total_count: page.total_count,
            has_more: page.has_more,
        }
    }
}

#[derive(Debug, Serialize)]
struct TypingReply {
    typing_users: Vec<AccountId>,
}

pub fn chat_routes() -> Router<ChatApiState> {
    Router::new()
        .route("/chat.ChatService/CreateSession", post(create_session))
        .route("/chat.ChatService/GetSession", post(get_session))
        .route("/chat.ChatService/GetUserSessions", post(get_user_sessions))
        .route("/chat.ChatService/UpdateSession", post(update_session))
        .route("/chat.ChatService/DeleteSession", post(delete_session))
        .route("/chat.ChatService/SendMessage", post(send_message))
        .route("/chat.ChatService/GetChatHistory", post(get_chat_history))
        .route("/chat.ChatService/DeleteMessage", post(delete_message))
        .route("/chat.ChatService/SearchMessages", post(search_messages))
        .route("/chat.ChatService/UpdateTypingStatus", post(update_typing_status))
        .route("/chat.ChatService/GetTypingUsers", post(get_typing_users))
}

fn session_and_user(session_id: &str, user_id: &str) -> Result<(SessionId, AccountId), ApplicationError> {
    Ok((
        SessionId::parse("session_id", session_id)?,
        AccountId::parse("user_id", user_id)?,
    ))
}

async fn create_session(
    State(state): State<ChatApiState>,
    Json(payload): Json<CreateSessionPayload>,
) -> RpcResult<SessionReply> {
    let result = async {
        let owner_id = AccountId::parse("user_id", &payload.user_id)?;
        state
            .chat_service
            .create_session(CreateSessionRequest {
                owner_id,
                title: payload.title,
                settings: payload.settings,
            })
            .await
    }
    .await;
    respond(result, |session| SessionReply { session })
}

async fn get_session(
    State(state): State<ChatApiState>,
    Json(payload): Json<SessionPayload>,
) -> RpcResult<SessionReply> {
    let result = async {
        let (session_id, user_id) = session_and_user(&payload.session_id, &payload.user_id)?;
        state.chat_service.get_session(session_id, user_id).await
    }
    .await;
    respond(result, |session| SessionReply { session })
}

async fn get_user_sessions(
    State(state): State<ChatApiState>,
    Json(payload): Json<UserSessionsPayload>,
) -> RpcResult<SessionsReply> {
    let result = async {
        let owner_id = AccountId::parse("user_id", &payload.user_id)?;
        state
            .chat_service
            .list_sessions(ListSessionsRequest {
                owner_id,
                limit: payload.limit,
                offset: payload.offset,
            })
            .await
    }
    .await;
    respond(result, |page| SessionsReply {
        sessions: page.items,
        total_count: page.total_count,
        has_more: page.has_more,
    })
}

async fn update_session(
    State(state): State<ChatApiState>,
    Json(payload): Json<UpdateSessionPayload>,
) -> RpcResult<SessionReply> {
    let result = async {
        let (session_id, owner_id) = session_and_user(&payload.session_id, &payload.user_id)?;
        let status = payload
            .status
            .as_deref()
            .map(str::parse::<SessionStatus>)
            .transpose()?;
        state
            .chat_service
            .update_session(UpdateSessionRequest {
                session_id,
                owner_id,
                title: payload.title,
                status,
                settings: payload.settings,
            })
            .await
    }
    .await;
    respond(result, |session| SessionReply { session })
}

async fn delete_session(
    State(state): State<ChatApiState>,
    Json(payload): Json<SessionPayload>,
) -> Result<Json<Done>, ApiError> {
    let result = async {
        let (session_id, owner_id) = session_and_user(&payload.session_id, &payload.user_id)?;
        state.chat_service.delete_session(session_id, owner_id).await
    }
    .await;
    done(result)
}

async fn send_message(
    State(state): State<ChatApiState>,
    Json(payload): Json<SendMessagePayload>,
) -> RpcResult<MessageReply> {
    let result = async {
        let (session_id, author_id) = session_and_user(&payload.session_id, &payload.user_id)?;
        let message_type = match payload.message_type.as_deref() {
            Some(raw) => raw.parse::<MessageType>()?,
            None => MessageType::User,
        };
        let parent_message_id = payload
            .parent_message_id
            .as_deref()
            .map(|raw| MessageId::parse("parent_message_id", raw))
            .transpose()?;
        state
            .chat_service
            .send_message(SendMessageRequest {
                session_id,
                author_id,
                content: payload.content,
                message_type,
                metadata: payload.metadata,
                parent_message_id,
            })
            .await
    }
    .await;
    respond(result, |message| MessageReply { message })
}

async fn get_chat_history(
    State(state): State<ChatApiState>,
    Json(payload): Json<HistoryPayload>,
) -> RpcResult<MessagesReply> {
    let result = async {
        let (session_id, requester_id) =
            session_and_user(&payload.session_id, &payload.user_id)?;
        state
            .chat_service
            .get_chat_history(ChatHistoryRequest {
                session_id,
                requester_id,
                limit: payload.limit,
                offset: payload.offset,
                from: payload.from,
                to: payload.to,
            })
            .await
    }
    .await;
    respond(result, MessagesReply::from)
}

async fn delete_message(
    State(state): State<ChatApiState>,
    Json(payload): Json<DeleteMessagePayload>,
) -> Result<Json<Done>, ApiError> {
    let result = async {
        let message_id = MessageId::parse("message_id", &payload.message_id)?;
        let requester_id = AccountId::parse("user_id", &payload.user_id)?;
        state
            .chat_service
            .delete_message(message_id, requester_id)
            .await
    }
    .await;
    done(result)
}

async fn search_messages(
    State(state): State<ChatApiState>,
    Json(payload): Json<SearchPayload>,
) -> RpcResult<MessagesReply> {
    let result = async {
        let (session_id, requester_id) =
            session_and_user(&payload.session_id, &payload.user_id)?;
        state
            .chat_service
            .search_messages(SearchMessagesRequest {
                session_id,
                requester_id,
                query: payload.query,
                limit: payload.limit,
                offset: payload.offset,
            })
            .await
    }
    .await;
    respond(result, MessagesReply::from)
}

async fn update_typing_status(
    State(state): State<ChatApiState>,
    Json(payload): Json<TypingPayload>,
) -> Result<Json<Done>, ApiError> {
    let result = async {
        let (session_id, account_id) = session_and_user(&payload.session_id, &payload.user_id)?;
        state
            .chat_service
            .update_typing_status(session_id, account_id, payload.is_typing)
            .await
    }
    .await;
    done(result)
}

async fn get_typing_users(
    State(state): State<ChatApiState>,
    Json(payload): Json<SessionPayload>,
) -> RpcResult<TypingReply> {
    let result = async {
        let (session_id, requester_id) =
            session_and_user(&payload.session_id, &payload.user_id)?;
        state
            .chat_service
            .get_typing_users(session_id, requester_id)
            .await
    }
    .await;
    respond(result, |typing_users| TypingReply { typing_users })
}
