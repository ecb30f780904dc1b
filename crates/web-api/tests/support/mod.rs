//! 接口测试共用的装配：内存仓储 + 内存缓存

#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use application::{
    memory::{
        MemoryAccountRepository, MemoryActivityRepository, MemoryCacheStore,
        MemoryLoginAttemptRepository, MemoryMessageRepository, MemoryPreferencesRepository,
        MemorySessionRepository, PlainPasswordHasher,
    },
    AccountPolicy, AccountService, AccountServiceDependencies, CacheTtls, ChatLimits,
    ChatService, ChatServiceDependencies, SessionCache, SystemClock, TokenService, TokenSettings,
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use web_api::{chat_router, user_router, ChatApiState, UserApiState};

pub const PASSWORD: &str = "Abcdef1!";

pub fn user_app() -> Router {
    let clock = Arc::new(SystemClock);
    let token_service = TokenService::new(
        TokenSettings {
            secret: "router-test-secret-with-enough-bytes".into(),
            issuer: "chat-platform".into(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        },
        clock.clone(),
    )
    .expect("token service");

    let service = AccountService::new(AccountServiceDependencies {
        account_repository: Arc::new(MemoryAccountRepository::new()),
        preferences_repository: Arc::new(MemoryPreferencesRepository::new()),
        activity_repository: Arc::new(MemoryActivityRepository::new()),
        login_attempt_repository: Arc::new(MemoryLoginAttemptRepository::new()),
        password_hasher: Arc::new(PlainPasswordHasher),
        token_service: Arc::new(token_service),
        clock,
        policy: AccountPolicy::default(),
    });
    user_router(UserApiState::new(Arc::new(service)))
}

pub fn chat_app() -> Router {
    let sessions = Arc::new(MemorySessionRepository::new());
    let messages = Arc::new(MemoryMessageRepository::new(sessions.clone()));
    let service = ChatService::new(ChatServiceDependencies {
        session_repository: sessions,
        message_repository: messages,
        cache: SessionCache::new(Arc::new(MemoryCacheStore::new()), CacheTtls::default()),
        clock: Arc::new(SystemClock),
        limits: ChatLimits::default(),
    });
    chat_router(ChatApiState::new(Arc::new(service)))
}

pub async fn call(app: &Router, path: &str, payload: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let body = serde_json::from_slice(&bytes).unwrap_or(json!({}));
    (status, body)
}
