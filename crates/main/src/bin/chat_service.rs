//! 会话服务入口

use std::sync::Arc;

use application::{ChatService, ChatServiceDependencies, SessionCache, SystemClock};
use chat_platform::{cache_ttls, chat_limits, init_tracing, listen_addr, shutdown_signal};
use config::AppConfig;
use infrastructure::ChatInfrastructure;
use web_api::{chat_router, ChatApiState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);
    tracing::debug!(config = ?config.redacted(), "configuration loaded");

    let infra = ChatInfrastructure::connect(&config.database, &config.redis).await?;

    let chat_service = ChatService::new(ChatServiceDependencies {
        session_repository: infra.session_repository(),
        message_repository: infra.message_repository(),
        cache: SessionCache::new(infra.cache_store(), cache_ttls(&config.chat)),
        clock: Arc::new(SystemClock),
        limits: chat_limits(&config.chat),
    });

    let app = chat_router(ChatApiState::new(Arc::new(chat_service)));
    let addr = listen_addr(&config.server, config.server.chat_service_port)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "chat service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    infra.pool.close().await;
    tracing::info!("chat service stopped");
    Ok(())
}
