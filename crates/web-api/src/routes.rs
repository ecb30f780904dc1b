use axum::{http::StatusCode, routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{
    chat_routes::chat_routes,
    state::{ChatApiState, UserApiState},
    user_routes::user_routes,
};

/// 身份服务的完整路由
pub fn user_router(state: UserApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(user_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 会话服务的完整路由
pub fn chat_router(state: ChatApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(chat_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}
