//! 账户服务单元测试
//!
//! 使用内存仓储和手动时钟，覆盖注册、登录锁定、令牌、资料与偏好。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use domain::{
    Account, AccountId, AccountStatus, ActivityType, DomainError, Email, FailedLoginOutcome,
    LockoutPolicy, PasswordViolation, Preferences, RepositoryError, Theme, Timestamp, Username,
};

use crate::clock::{Clock, ManualClock};
use crate::error::ApplicationError;
use crate::memory::{
    MemoryAccountRepository, EMAIL_CONSTRAINT, USERNAME_CONSTRAINT, MemoryActivityRepository, MemoryLoginAttemptRepository,
    MemoryPreferencesRepository, PlainPasswordHasher,
};
use crate::repository::{AccountRepository, PreferencesRepository};
use crate::services::account_service::*;
use crate::token::{TokenService, TokenSettings};

const PASSWORD: &str = "Abcdef1!";

struct Fixture {
    service: AccountService,
    clock: Arc<ManualClock>,
    accounts: Arc<MemoryAccountRepository>,
    preferences: Arc<MemoryPreferencesRepository>,
    activity: Arc<MemoryActivityRepository>,
    attempts: Arc<MemoryLoginAttemptRepository>,
}

fn fixture() -> Fixture {
    fixture_with(|accounts| accounts as Arc<dyn AccountRepository>)
}

/// 允许在内存仓储外再包一层，用于模拟存储层的特殊行为
fn fixture_with(
    wrap: impl FnOnce(Arc<MemoryAccountRepository>) -> Arc<dyn AccountRepository>,
) -> Fixture {
    let clock = Arc::new(ManualClock::default());
    let accounts = Arc::new(MemoryAccountRepository::new());
    let preferences = Arc::new(MemoryPreferencesRepository::new());
    let activity = Arc::new(MemoryActivityRepository::new());
    let attempts = Arc::new(MemoryLoginAttemptRepository::new());
    let token_service = TokenService::new(
        TokenSettings {
            secret: "unit-test-secret-with-enough-bytes!!".into(),
            issuer: "chat-platform".into(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        },
        clock.clone(),
    )
    .unwrap();

    let service = AccountService::new(AccountServiceDependencies {
        account_repository: wrap(accounts.clone()),
        preferences_repository: preferences.clone(),
        activity_repository: activity.clone(),
        login_attempt_repository: attempts.clone(),
        password_hasher: Arc::new(PlainPasswordHasher),
        token_service: Arc::new(token_service),
        clock: clock.clone(),
        policy: AccountPolicy::default(),
    });

    Fixture {
        service,
        clock,
        accounts,
        preferences,
        activity,
        attempts,
    }
}

fn register_request(email: &str, username: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        username: username.to_string(),
        password: PASSWORD.to_string(),
        first_name: None,
        last_name: None,
    }
}

fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
        remember_me: false,
        ip_address: Some("10.0.0.1".to_string()),
        user_agent: None,
    }
}

fn domain_err(result: Result<impl std::fmt::Debug, ApplicationError>) -> DomainError {
    match result {
        Err(ApplicationError::Domain(err)) => err,
        other => panic!("expected domain error, got {other:?}"),
    }
}

#[tokio::test]
async fn register_then_login_issues_usable_tokens() {
    let fx = fixture();
    let registered = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap();
    assert_eq!(registered.account.email, "a@b.com");
    assert_eq!(registered.account.username, "ab");
    assert_eq!(registered.account.status, AccountStatus::Active);

    fx.clock.advance(ChronoDuration::seconds(5));
    let outcome = fx
        .service
        .login(login_request("a@b.com", PASSWORD))
        .await
        .unwrap();
    assert_eq!(outcome.account.id, registered.account.id);
    assert!(outcome.account.last_login_at.is_some());
    assert!(outcome.tokens.issued_at > registered.tokens.issued_at);
    assert!(outcome.tokens.access_expires_at > registered.tokens.access_expires_at);
    assert_ne!(outcome.tokens.access_token, registered.tokens.access_token);
    assert_ne!(outcome.tokens.refresh_token, registered.tokens.refresh_token);

    let verified = fx
        .service
        .verify_token(&outcome.tokens.access_token)
        .await
        .unwrap();
    assert_eq!(verified.account.id, registered.account.id);

    let attempts = fx.attempts.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert!(attempts[0].succeeded);
}

#[tokio::test]
async fn register_normalizes_email_and_creates_default_preferences() {
    let fx = fixture();
    let outcome = fx
        .service
        .register(register_request("  Mixed@Example.COM ", "mixed"))
        .await
        .unwrap();
    assert_eq!(outcome.account.email, "mixed@example.com");

    let stored = fx.preferences.find(outcome.account.id).await.unwrap();
    assert_eq!(stored.map(|p| p.theme), Some(Theme::System));

    let events = fx.activity.events_for(outcome.account.id).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].activity_type, ActivityType::Registration);
}

#[tokio::test]
async fn register_rejects_duplicates() {
    let fx = fixture();
    fx.service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap();

    let dup_email = fx
        .service
        .register(register_request("A@B.com", "other"))
        .await;
    assert_eq!(domain_err(dup_email), DomainError::EmailTaken);

    let dup_username = fx
        .service
        .register(register_request("other@b.com", "ab"))
        .await;
    assert_eq!(domain_err(dup_username), DomainError::UsernameTaken);
}

#[tokio::test]
async fn register_reports_first_password_violation() {
    let fx = fixture();
    let mut request = register_request("a@b.com", "ab");
    request.password = "abcdefgh".into();
    assert_eq!(
        domain_err(fx.service.register(request).await),
        DomainError::WeakPassword(PasswordViolation::MissingUppercase)
    );

    let mut request = register_request("a@b.com", "ab");
    request.password = "Ab1!".into();
    assert_eq!(
        domain_err(fx.service.register(request).await),
        DomainError::WeakPassword(PasswordViolation::TooShort { min: 8 })
    );
}

#[tokio::test]
async fn register_rejects_malformed_input() {
    let fx = fixture();
    let err = domain_err(
        fx.service
            .register(register_request("not-an-email", "ab"))
            .await,
    );
    assert!(matches!(err, DomainError::InvalidArgument { .. }));

    let err = domain_err(fx.service.register(register_request("a@b.com", "a")).await);
    assert!(matches!(err, DomainError::InvalidArgument { .. }));
}

#[tokio::test]
async fn unknown_email_and_wrong_password_look_the_same() {
    let fx = fixture();
    fx.service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap();

    let unknown = fx.service.login(login_request("nobody@b.com", PASSWORD)).await;
    let wrong = fx.service.login(login_request("a@b.com", "Wrong123!")).await;
    assert_eq!(domain_err(unknown), DomainError::InvalidCredentials);
    assert_eq!(domain_err(wrong), DomainError::InvalidCredentials);

    let reasons: Vec<_> = fx
        .attempts
        .attempts()
        .await
        .into_iter()
        .map(|a| a.failure_reason)
        .collect();
    assert_eq!(
        reasons,
        vec![
            Some("unknown_account".to_string()),
            Some("invalid_password".to_string())
        ]
    );
}

#[tokio::test]
async fn five_failures_lock_the_account_until_deadline() {
    let fx = fixture();
    let account = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .account;

    for _ in 0..5 {
        let result = fx.service.login(login_request("a@b.com", "Wrong123!")).await;
        assert_eq!(domain_err(result), DomainError::InvalidCredentials);
    }

    let raw = fx.accounts.raw(account.id).await.unwrap();
    assert_eq!(raw.failed_login_attempts, 5);
    let until = raw.locked_until.expect("account should be locked");
    assert_eq!(until, fx.clock.now() + ChronoDuration::minutes(15));

    // 锁定期间即使密码正确也拒绝
    let locked = fx.service.login(login_request("a@b.com", PASSWORD)).await;
    assert_eq!(domain_err(locked), DomainError::AccountLocked { until });

    fx.clock.advance(ChronoDuration::minutes(16));
    let outcome = fx
        .service
        .login(login_request("a@b.com", PASSWORD))
        .await
        .unwrap();
    assert_eq!(outcome.account.id, account.id);

    let raw = fx.accounts.raw(account.id).await.unwrap();
    assert_eq!(raw.failed_login_attempts, 0);
    assert!(raw.locked_until.is_none());
}

#[tokio::test]
async fn deleted_account_cannot_login() {
    let fx = fixture();
    let account = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .account;
    fx.service.delete_account(account.id).await.unwrap();

    // 软删除的账户按查无此人处理
    let result = fx.service.login(login_request("a@b.com", PASSWORD)).await;
    assert_eq!(domain_err(result), DomainError::InvalidCredentials);
    assert_eq!(
        fx.accounts.raw(account.id).await.unwrap().status,
        AccountStatus::Deleted
    );
}

#[tokio::test]
async fn refresh_requires_a_refresh_token() {
    let fx = fixture();
    let tokens = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .tokens;

    fx.clock.advance(ChronoDuration::minutes(5));
    let refreshed = fx.service.refresh(&tokens.refresh_token).await.unwrap();
    assert!(fx.service.verify_token(&refreshed.access_token).await.is_ok());
    assert!(refreshed.access_expires_at > tokens.access_expires_at);
    assert!(refreshed.refresh_expires_at > tokens.refresh_expires_at);
    assert_ne!(refreshed.access_token, tokens.access_token);

    let err = domain_err(fx.service.refresh(&tokens.access_token).await);
    assert!(matches!(err, DomainError::TokenKindMismatch { .. }));

    let err = domain_err(fx.service.verify_token(&tokens.refresh_token).await);
    assert!(matches!(err, DomainError::TokenKindMismatch { .. }));
}

#[tokio::test]
async fn tokens_of_deleted_accounts_are_rejected() {
    let fx = fixture();
    let outcome = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap();
    fx.service.delete_account(outcome.account.id).await.unwrap();

    assert_eq!(
        domain_err(fx.service.verify_token(&outcome.tokens.access_token).await),
        DomainError::TokenInvalid
    );
    assert_eq!(
        domain_err(fx.service.refresh(&outcome.tokens.refresh_token).await),
        DomainError::TokenInvalid
    );
}

#[tokio::test]
async fn suspended_accounts_cannot_use_outstanding_tokens() {
    let fx = fixture();
    let outcome = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap();
    assert!(
        fx.accounts
            .set_status(outcome.account.id, AccountStatus::Suspended)
            .await
    );

    assert_eq!(
        domain_err(fx.service.refresh(&outcome.tokens.refresh_token).await),
        DomainError::AccountInactive
    );
    assert_eq!(
        domain_err(fx.service.verify_token(&outcome.tokens.access_token).await),
        DomainError::AccountInactive
    );
}

#[tokio::test]
async fn locked_accounts_cannot_refresh_until_the_lock_expires() {
    let fx = fixture();
    let outcome = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap();
    for _ in 0..5 {
        let result = fx.service.login(login_request("a@b.com", "Wrong123!")).await;
        assert_eq!(domain_err(result), DomainError::InvalidCredentials);
    }
    let until = fx
        .accounts
        .raw(outcome.account.id)
        .await
        .unwrap()
        .locked_until
        .expect("account should be locked");

    assert_eq!(
        domain_err(fx.service.refresh(&outcome.tokens.refresh_token).await),
        DomainError::AccountLocked { until }
    );

    fx.clock.advance(ChronoDuration::minutes(16));
    assert!(fx.service.refresh(&outcome.tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn access_token_expires_with_clock() {
    let fx = fixture();
    let tokens = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .tokens;
    fx.clock.advance(ChronoDuration::minutes(16));
    assert_eq!(
        domain_err(fx.service.verify_token(&tokens.access_token).await),
        DomainError::TokenExpired
    );
}

#[tokio::test]
async fn update_account_changes_profile_and_checks_username() {
    let fx = fixture();
    let first = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .account;
    fx.service
        .register(register_request("c@d.com", "taken"))
        .await
        .unwrap();

    let mut request = UpdateAccountRequest::for_account(first.id);
    request.first_name = Some("  Ada ".into());
    request.avatar_url = Some("https://cdn.example.com/a.png".into());
    let updated = fx.service.update_account(request).await.unwrap();
    assert_eq!(updated.first_name.as_deref(), Some("Ada"));
    assert_eq!(
        updated.avatar_url.as_deref(),
        Some("https://cdn.example.com/a.png")
    );
    assert_eq!(updated.username, "ab");

    let mut request = UpdateAccountRequest::for_account(first.id);
    request.username = Some("taken".into());
    assert_eq!(
        domain_err(fx.service.update_account(request).await),
        DomainError::UsernameTaken
    );

    let mut request = UpdateAccountRequest::for_account(first.id);
    request.avatar_url = Some("ftp://nope".into());
    assert!(matches!(
        domain_err(fx.service.update_account(request).await),
        DomainError::InvalidArgument { .. }
    ));
}

#[tokio::test]
async fn missing_account_is_not_found() {
    let fx = fixture();
    assert_eq!(
        domain_err(fx.service.get_account(AccountId::generate()).await),
        DomainError::AccountNotFound
    );
    assert_eq!(
        domain_err(fx.service.delete_account(AccountId::generate()).await),
        DomainError::AccountNotFound
    );
}

#[tokio::test]
async fn preferences_are_recreated_when_missing() {
    let fx = fixture();
    let account = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .account;
    fx.preferences.delete(account.id).await.unwrap();

    let preferences = fx.service.get_preferences(account.id).await.unwrap();
    assert_eq!(preferences, Preferences::defaults(account.id, preferences.created_at));
}

#[tokio::test]
async fn update_preferences_applies_only_given_fields() {
    let fx = fixture();
    let account = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .account;

    let mut request = UpdatePreferencesRequest::for_account(account.id);
    request.theme = Some("dark".into());
    request.language = Some("DE".into());
    request.push_notifications = Some(false);
    let updated = fx.service.update_preferences(request).await.unwrap();
    assert_eq!(updated.theme, Theme::Dark);
    assert_eq!(updated.language, "de");
    assert!(!updated.push_notifications);
    assert!(updated.email_notifications);

    let mut request = UpdatePreferencesRequest::for_account(account.id);
    request.theme = Some("neon".into());
    assert!(matches!(
        domain_err(fx.service.update_preferences(request).await),
        DomainError::InvalidArgument { .. }
    ));
}

#[tokio::test]
async fn stats_count_recorded_activity() {
    let fx = fixture();
    let account = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .account;

    for activity_type in ["session_start", "message_sent", "message_sent"] {
        fx.service
            .record_activity(RecordActivityRequest {
                account_id: account.id,
                activity_type: activity_type.into(),
                metadata: HashMap::new(),
                ip_address: None,
                user_agent: None,
                session_id: None,
            })
            .await
            .unwrap();
    }

    let stats = fx.service.get_stats(account.id, None, None).await.unwrap();
    assert_eq!(stats.total_sessions, 1);
    assert_eq!(stats.total_messages, 2);
    assert_eq!(stats.feature_usage.get("registration"), Some(&1));
    assert_eq!(stats.last_activity, Some(fx.clock.now()));

    // 窗口之外的记录不计入
    let future = fx.clock.now() + ChronoDuration::days(1);
    let empty = fx
        .service
        .get_stats(account.id, Some(future), Some(future + ChronoDuration::days(1)))
        .await
        .unwrap();
    assert_eq!(empty.total_messages, 0);
}

#[tokio::test]
async fn record_activity_rejects_unknown_types() {
    let fx = fixture();
    let result = fx
        .service
        .record_activity(RecordActivityRequest {
            account_id: AccountId::generate(),
            activity_type: "teleport".into(),
            metadata: HashMap::new(),
            ip_address: None,
            user_agent: None,
            session_id: None,
        })
        .await;
    assert!(matches!(
        domain_err(result),
        DomainError::InvalidArgument { .. }
    ));
}

#[tokio::test]
async fn logout_records_activity() {
    let fx = fixture();
    let account = fx
        .service
        .register(register_request("a@b.com", "ab"))
        .await
        .unwrap()
        .account;
    fx.service.logout(account.id).await.unwrap();
    let events = fx.activity.events_for(account.id).await;
    assert_eq!(
        events.last().map(|e| e.activity_type),
        Some(ActivityType::Logout)
    );
}

/// 存在性检查总是放行，插入时才撞上唯一约束，相当于并发注册输掉竞争
struct RacingAccountRepository {
    inner: Arc<MemoryAccountRepository>,
    constraint: &'static str,
}

#[async_trait]
impl AccountRepository for RacingAccountRepository {
    async fn create(&self, _account: Account) -> Result<Account, RepositoryError> {
        Err(RepositoryError::conflict(self.constraint))
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        self.inner.find_by_id(id).await
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError> {
        self.inner.find_by_email(email).await
    }

    async fn email_exists(&self, _email: &Email) -> Result<bool, RepositoryError> {
        Ok(false)
    }

    async fn username_exists(&self, _username: &Username) -> Result<bool, RepositoryError> {
        Ok(false)
    }

    async fn update_profile(&self, account: &Account) -> Result<Account, RepositoryError> {
        self.inner.update_profile(account).await
    }

    async fn record_failed_login(
        &self,
        id: AccountId,
        policy: &LockoutPolicy,
        now: Timestamp,
    ) -> Result<FailedLoginOutcome, RepositoryError> {
        self.inner.record_failed_login(id, policy, now).await
    }

    async fn record_successful_login(
        &self,
        id: AccountId,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        self.inner.record_successful_login(id, now).await
    }

    async fn soft_delete(&self, id: AccountId, now: Timestamp) -> Result<(), RepositoryError> {
        self.inner.soft_delete(id, now).await
    }
}

fn racing_fixture(constraint: &'static str) -> Fixture {
    fixture_with(|inner| {
        Arc::new(RacingAccountRepository { inner, constraint }) as Arc<dyn AccountRepository>
    })
}

#[tokio::test]
async fn insert_time_conflicts_map_to_the_taken_field() {
    let fx = racing_fixture(EMAIL_CONSTRAINT);
    let result = fx.service.register(register_request("a@b.com", "ab")).await;
    assert_eq!(domain_err(result), DomainError::EmailTaken);

    let fx = racing_fixture(USERNAME_CONSTRAINT);
    let result = fx.service.register(register_request("a@b.com", "ab")).await;
    assert_eq!(domain_err(result), DomainError::UsernameTaken);
}
