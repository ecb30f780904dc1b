//! 身份服务入口

use std::sync::Arc;

use application::{AccountService, AccountServiceDependencies, Clock, SystemClock, TokenService};
use chat_platform::{account_policy, init_tracing, listen_addr, shutdown_signal, token_settings};
use config::AppConfig;
use infrastructure::AccountInfrastructure;
use web_api::{user_router, UserApiState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging);
    tracing::debug!(config = ?config.redacted(), "configuration loaded");

    let infra = AccountInfrastructure::connect(&config.database, config.auth.bcrypt_cost).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let token_service = TokenService::new(token_settings(&config.auth), clock.clone())?;

    let account_service = AccountService::new(AccountServiceDependencies {
        account_repository: infra.account_repository(),
        preferences_repository: infra.preferences_repository(),
        activity_repository: infra.activity_repository(),
        login_attempt_repository: infra.login_attempt_repository(),
        password_hasher: infra.password_hasher_trait(),
        token_service: Arc::new(token_service),
        clock,
        policy: account_policy(&config.auth),
    });

    let app = user_router(UserApiState::new(Arc::new(account_service)));
    let addr = listen_addr(&config.server, config.server.user_service_port)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "user service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    infra.pool.close().await;
    tracing::info!("user service stopped");
    Ok(())
}
