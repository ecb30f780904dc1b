//! 两个服务进程共用的启动逻辑：日志初始化、配置到策略的转换、停机信号

use std::net::SocketAddr;

use application::{AccountPolicy, CacheTtls, ChatLimits, TokenSettings};
use config::{AuthConfig, ChatConfig, LogFormat, LoggingConfig, ServerConfig};
use domain::{LockoutPolicy, PasswordPolicy};
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` 优先于配置里的级别
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

pub fn token_settings(auth: &AuthConfig) -> TokenSettings {
    TokenSettings {
        secret: auth.jwt_secret.clone(),
        issuer: auth.jwt_issuer.clone(),
        access_ttl: auth.access_token_ttl(),
        refresh_ttl: auth.refresh_token_ttl(),
    }
}

pub fn account_policy(auth: &AuthConfig) -> AccountPolicy {
    let lockout_duration = chrono::Duration::from_std(auth.lockout_duration())
        .unwrap_or_else(|_| LockoutPolicy::default().lockout_duration);
    AccountPolicy {
        lockout: LockoutPolicy::new(auth.max_login_attempts, lockout_duration),
        password: PasswordPolicy::with_min_length(auth.password_min_length),
    }
}

pub fn chat_limits(chat: &ChatConfig) -> ChatLimits {
    ChatLimits {
        max_active_sessions: chat.max_active_sessions,
        max_messages_per_session: chat.max_messages_per_session,
        max_message_length: chat.max_message_length,
    }
}

pub fn cache_ttls(chat: &ChatConfig) -> CacheTtls {
    CacheTtls {
        session: chat.session_cache_ttl(),
        messages: chat.message_cache_ttl(),
        typing: chat.typing_ttl(),
    }
}

pub fn listen_addr(server: &ServerConfig, port: u16) -> anyhow::Result<SocketAddr> {
    let addr = format!("{}:{}", server.host, port).parse::<SocketAddr>()?;
    Ok(addr)
}

/// Ctrl+C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use config::AppConfig;

    #[test]
    fn policies_follow_configuration() {
        let mut config = AppConfig::default();
        config.auth.max_login_attempts = 3;
        config.auth.lockout_duration_secs = 60;
        config.auth.password_min_length = 10;

        let policy = account_policy(&config.auth);
        assert_eq!(policy.lockout.max_attempts, 3);
        assert_eq!(policy.lockout.lockout_duration, chrono::Duration::seconds(60));
        assert_eq!(policy.password.min_length, 10);
    }

    #[test]
    fn chat_settings_follow_configuration() {
        let mut config = AppConfig::default();
        config.chat.typing_ttl_secs = 5;
        config.chat.max_active_sessions = 2;

        assert_eq!(cache_ttls(&config.chat).typing, Duration::from_secs(5));
        assert_eq!(chat_limits(&config.chat).max_active_sessions, 2);
    }

    #[test]
    fn listen_addr_combines_host_and_port() {
        let server = AppConfig::default().server;
        let addr = listen_addr(&server, 50051).unwrap();
        assert_eq!(addr.port(), 50051);
    }
}
