use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use domain::{
    parse_language, Account, AccountId, ActivityEvent, ActivityType, AiPreferences, DomainError,
    Email, LockoutPolicy, LoginAttempt, PasswordPolicy, Preferences, ProfileVisibility,
    RepositoryError, Theme, Timestamp, UserStats, Username,
};

use crate::{
    clock::Clock,
    dto::{AccountView, AuthOutcome, VerifiedToken},
    error::ApplicationError,
    password::PasswordHasher,
    repository::{
        AccountRepository, ActivityRepository, LoginAttemptRepository, PreferencesRepository,
    },
    token::{TokenKind, TokenPair, TokenService},
};

const NAME_MAX_LEN: usize = 100;
const AVATAR_URL_MAX_LEN: usize = 500;
const DEFAULT_STATS_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub remember_me: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdateAccountRequest {
    pub account_id: AccountId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpdatePreferencesRequest {
    pub account_id: AccountId,
    pub theme: Option<String>,
    pub language: Option<String>,
    pub timezone: Option<String>,
    pub notifications_enabled: Option<bool>,
    pub email_notifications: Option<bool>,
    pub push_notifications: Option<bool>,
    pub ai_preferences: Option<AiPreferences>,
    pub profile_visibility: Option<String>,
    pub data_sharing: Option<bool>,
}

impl UpdateAccountRequest {
    /// 不修改任何字段的请求
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id,
            username: None,
            first_name: None,
            last_name: None,
            avatar_url: None,
        }
    }
}

impl UpdatePreferencesRequest {
    pub fn for_account(account_id: AccountId) -> Self {
        Self {
            account_id,
            theme: None,
            language: None,
            timezone: None,
            notifications_enabled: None,
            email_notifications: None,
            push_notifications: None,
            ai_preferences: None,
            profile_visibility: None,
            data_sharing: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordActivityRequest {
    pub account_id: AccountId,
    pub activity_type: String,
    pub metadata: HashMap<String, String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

/// 账户安全相关的策略参数
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountPolicy {
    pub lockout: LockoutPolicy,
    pub password: PasswordPolicy,
}

pub struct AccountServiceDependencies {
    pub account_repository: Arc<dyn AccountRepository>,
    pub preferences_repository: Arc<dyn PreferencesRepository>,
    pub activity_repository: Arc<dyn ActivityRepository>,
    pub login_attempt_repository: Arc<dyn LoginAttemptRepository>,
    pub password_hasher: Arc<dyn PasswordHasher>,
    pub token_service: Arc<TokenService>,
    pub clock: Arc<dyn Clock>,
    pub policy: AccountPolicy,
}

/// 注册、登录锁定、令牌与资料管理
pub struct AccountService {
    deps: AccountServiceDependencies,
}

impl AccountService {
    pub fn new(deps: AccountServiceDependencies) -> Self {
        Self { deps }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<AuthOutcome, ApplicationError> {
        let email = Email::parse(request.email)?;
        let username = Username::parse(request.username)?;
        self.deps
            .policy
            .password
            .validate(&request.password)
            .map_err(DomainError::WeakPassword)?;
        let first_name = optional_text("first_name", request.first_name, NAME_MAX_LEN)?;
        let last_name = optional_text("last_name", request.last_name, NAME_MAX_LEN)?;

        if self.deps.account_repository.email_exists(&email).await? {
            return Err(DomainError::EmailTaken.into());
        }
        if self.deps.account_repository.username_exists(&username).await? {
            return Err(DomainError::UsernameTaken.into());
        }

        let password_hash = self.deps.password_hasher.hash(&request.password).await?;
        let now = self.deps.clock.now();
        let mut account =
            Account::register(AccountId::generate(), email, username, password_hash, now);
        account.first_name = first_name;
        account.last_name = last_name;

        let account = self
            .deps
            .account_repository
            .create(account)
            .await
            .map_err(map_account_conflict)?;

        // 偏好写入与账户写入不在同一事务里，失败只记录
        let preferences = Preferences::defaults(account.id, now);
        if let Err(err) = self.deps.preferences_repository.create(&preferences).await {
            tracing::warn!(account_id = %account.id, error = %err, "failed to create default preferences");
        }

        let tokens = self.deps.token_service.issue_pair(&account)?;
        self.record(
            ActivityEvent::new(account.id, ActivityType::Registration, now)
                .with_metadata("method", "email"),
        )
        .await;

        tracing::info!(account_id = %account.id, username = %account.username, "account registered");
        Ok(AuthOutcome {
            account: AccountView::from(&account),
            tokens,
        })
    }

    /// 校验顺序：账户存在 -> 状态 -> 锁定 -> 密码
    pub async fn login(&self, request: LoginRequest) -> Result<AuthOutcome, ApplicationError> {
        let now = self.deps.clock.now();
        let account = match Email::parse(request.email.clone()) {
            Ok(email) => self.deps.account_repository.find_by_email(&email).await?,
            Err(_) => None,
        };

        let Some(mut account) = account else {
            self.log_attempt(&request, None, Some("unknown_account"), now)
                .await;
            return Err(DomainError::InvalidCredentials.into());
        };

        if let Err(err) = account.ensure_can_login(now) {
            let reason = match err {
                DomainError::AccountLocked { .. } => "account_locked",
                _ => "account_inactive",
            };
            self.log_attempt(&request, Some(account.id), Some(reason), now)
                .await;
            return Err(err.into());
        }

        let password_ok = self
            .deps
            .password_hasher
            .verify(&request.password, &account.password_hash)
            .await?;

        if !password_ok {
            self.register_failure(&account, &request, now).await;
            return Err(DomainError::InvalidCredentials.into());
        }

        self.deps
            .account_repository
            .record_successful_login(account.id, now)
            .await?;
        account.record_successful_login(now);

        let tokens = self.deps.token_service.issue_pair(&account)?;

        let mut event = ActivityEvent::new(account.id, ActivityType::Login, now)
            .with_metadata("remember_me", request.remember_me.to_string());
        event.ip_address = request.ip_address.clone();
        event.user_agent = request.user_agent.clone();
        self.record(event).await;
        self.log_attempt(&request, Some(account.id), None, now).await;

        tracing::info!(account_id = %account.id, "login succeeded");
        Ok(AuthOutcome {
            account: AccountView::from(&account),
            tokens,
        })
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApplicationError> {
        let claims = self
            .deps
            .token_service
            .verify(refresh_token, TokenKind::Refresh)?;
        let account = self.account_for_token(claims.account_id()?).await?;
        self.deps.token_service.issue_pair(&account)
    }

    pub async fn verify_token(&self, access_token: &str) -> Result<VerifiedToken, ApplicationError> {
        let claims = self
            .deps
            .token_service
            .verify(access_token, TokenKind::Access)?;
        let account = self.account_for_token(claims.account_id()?).await?;
        Ok(VerifiedToken {
            claims,
            account: AccountView::from(&account),
        })
    }

    pub async fn logout(&self, account_id: AccountId) -> Result<(), ApplicationError> {
        let account = self.load(account_id).await?;
        let now = self.deps.clock.now();
        self.record(ActivityEvent::new(account.id, ActivityType::Logout, now))
            .await;
        Ok(())
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<AccountView, ApplicationError> {
        let account = self.load(account_id).await?;
        Ok(AccountView::from(&account))
    }

    pub async fn update_account(
        &self,
        request: UpdateAccountRequest,
    ) -> Result<AccountView, ApplicationError> {
        let mut account = self.load(request.account_id).await?;

        if let Some(username) = request.username {
            let username = Username::parse(username)?;
            if username != account.username {
                if self.deps.account_repository.username_exists(&username).await? {
                    return Err(DomainError::UsernameTaken.into());
                }
                account.username = username;
            }
        }
        if request.first_name.is_some() {
            account.first_name = optional_text("first_name", request.first_name, NAME_MAX_LEN)?;
        }
        if request.last_name.is_some() {
            account.last_name = optional_text("last_name", request.last_name, NAME_MAX_LEN)?;
        }
        if request.avatar_url.is_some() {
            account.avatar_url = optional_url(request.avatar_url)?;
        }

        let now = self.deps.clock.now();
        account.updated_at = now;
        let account = self
            .deps
            .account_repository
            .update_profile(&account)
            .await
            .map_err(map_account_conflict)?;

        self.record(ActivityEvent::new(account.id, ActivityType::ProfileUpdate, now))
            .await;
        Ok(AccountView::from(&account))
    }

    /// 软删除账户，随后尽力清理偏好和行为记录
    pub async fn delete_account(&self, account_id: AccountId) -> Result<(), ApplicationError> {
        self.load(account_id).await?;
        let now = self.deps.clock.now();
        self.deps
            .account_repository
            .soft_delete(account_id, now)
            .await?;

        if let Err(err) = self.deps.preferences_repository.delete(account_id).await {
            tracing::warn!(account_id = %account_id, error = %err, "failed to delete preferences");
        }
        if let Err(err) = self
            .deps
            .activity_repository
            .delete_for_account(account_id)
            .await
        {
            tracing::warn!(account_id = %account_id, error = %err, "failed to delete activity history");
        }
        tracing::info!(account_id = %account_id, "account deleted");
        Ok(())
    }

    /// 注册时偏好写入可能失败，读取时缺失则补写默认值
    pub async fn get_preferences(
        &self,
        account_id: AccountId,
    ) -> Result<Preferences, ApplicationError> {
        self.load(account_id).await?;
        if let Some(preferences) = self.deps.preferences_repository.find(account_id).await? {
            return Ok(preferences);
        }
        let defaults = Preferences::defaults(account_id, self.deps.clock.now());
        Ok(self.deps.preferences_repository.upsert(&defaults).await?)
    }

    pub async fn update_preferences(
        &self,
        request: UpdatePreferencesRequest,
    ) -> Result<Preferences, ApplicationError> {
        let mut preferences = self.get_preferences(request.account_id).await?;

        if let Some(theme) = request.theme {
            preferences.theme = theme.parse::<Theme>()?;
        }
        if let Some(language) = request.language {
            preferences.language = parse_language(&language)?;
        }
        if let Some(timezone) = request.timezone {
            let timezone = timezone.trim();
            if timezone.is_empty() || timezone.len() > 64 {
                return Err(DomainError::invalid_argument("timezone", "invalid timezone").into());
            }
            preferences.timezone = timezone.to_owned();
        }
        if let Some(visibility) = request.profile_visibility {
            preferences.profile_visibility = visibility.parse::<ProfileVisibility>()?;
        }
        if let Some(ai) = request.ai_preferences {
            validate_ai_preferences(&ai)?;
            preferences.ai_preferences = ai;
        }
        if let Some(value) = request.notifications_enabled {
            preferences.notifications_enabled = value;
        }
        if let Some(value) = request.email_notifications {
            preferences.email_notifications = value;
        }
        if let Some(value) = request.push_notifications {
            preferences.push_notifications = value;
        }
        if let Some(value) = request.data_sharing {
            preferences.data_sharing = value;
        }
        preferences.updated_at = self.deps.clock.now();

        Ok(self.deps.preferences_repository.upsert(&preferences).await?)
    }

    /// 默认统计最近 30 天
    pub async fn get_stats(
        &self,
        account_id: AccountId,
        from: Option<Timestamp>,
        to: Option<Timestamp>,
    ) -> Result<UserStats, ApplicationError> {
        self.load(account_id).await?;
        let to = to.unwrap_or_else(|| self.deps.clock.now());
        let from = from.unwrap_or(to - Duration::days(DEFAULT_STATS_WINDOW_DAYS));
        if from > to {
            return Err(DomainError::invalid_argument("from", "must not be after 'to'").into());
        }
        Ok(self
            .deps
            .activity_repository
            .stats(account_id, from, to)
            .await?)
    }

    /// 只校验输入；写入失败不影响调用方
    pub async fn record_activity(
        &self,
        request: RecordActivityRequest,
    ) -> Result<(), ApplicationError> {
        let activity_type = request.activity_type.parse::<ActivityType>()?;
        let mut event = ActivityEvent::new(request.account_id, activity_type, self.deps.clock.now());
        event.ip_address = request
            .ip_address
            .or_else(|| request.metadata.get("ip_address").cloned());
        event.user_agent = request
            .user_agent
            .or_else(|| request.metadata.get("user_agent").cloned());
        event.session_id = request.session_id;
        event.metadata = request.metadata;
        self.record(event).await;
        Ok(())
    }

    async fn load(&self, account_id: AccountId) -> Result<Account, ApplicationError> {
        self.deps
            .account_repository
            .find_by_id(account_id)
            .await?
            .ok_or_else(|| DomainError::AccountNotFound.into())
    }

    /// 令牌对应的账户必须仍然存在且可登录
    async fn account_for_token(&self, account_id: AccountId) -> Result<Account, ApplicationError> {
        let account = self
            .deps
            .account_repository
            .find_by_id(account_id)
            .await?
            .ok_or(DomainError::TokenInvalid)?;
        account.ensure_can_login(self.deps.clock.now())?;
        Ok(account)
    }

    async fn register_failure(&self, account: &Account, request: &LoginRequest, now: Timestamp) {
        match self
            .deps
            .account_repository
            .record_failed_login(account.id, &self.deps.policy.lockout, now)
            .await
        {
            Ok(outcome) => {
                if let Some(until) = outcome.locked_until.filter(|until| *until > now) {
                    tracing::warn!(
                        account_id = %account.id,
                        attempts = outcome.attempts,
                        locked_until = %until,
                        "account locked after repeated login failures"
                    );
                }
            }
            Err(err) => {
                tracing::error!(account_id = %account.id, error = %err, "failed to record login failure");
            }
        }

        let mut event = ActivityEvent::new(account.id, ActivityType::FailedLogin, now)
            .with_metadata("reason", "invalid_password");
        event.ip_address = request.ip_address.clone();
        event.user_agent = request.user_agent.clone();
        self.record(event).await;
        self.log_attempt(request, Some(account.id), Some("invalid_password"), now)
            .await;
    }

    async fn record(&self, event: ActivityEvent) {
        if let Err(err) = self.deps.activity_repository.record(&event).await {
            tracing::warn!(
                account_id = %event.account_id,
                activity = %event.activity_type,
                error = %err,
                "failed to record activity"
            );
        }
    }

    async fn log_attempt(
        &self,
        request: &LoginRequest,
        account_id: Option<AccountId>,
        failure_reason: Option<&str>,
        now: Timestamp,
    ) {
        let attempt = LoginAttempt {
            email: request.email.trim().to_lowercase(),
            account_id,
            succeeded: failure_reason.is_none(),
            failure_reason: failure_reason.map(str::to_owned),
            ip_address: request.ip_address.clone(),
            user_agent: request.user_agent.clone(),
            attempted_at: now,
        };
        if let Err(err) = self.deps.login_attempt_repository.record(&attempt).await {
            tracing::warn!(error = %err, "failed to record login attempt");
        }
    }
}

/// 存储层唯一约束冲突映射为对应的领域冲突
fn map_account_conflict(err: RepositoryError) -> ApplicationError {
    match err {
        RepositoryError::Conflict { constraint } if constraint.contains("username") => {
            DomainError::UsernameTaken.into()
        }
        RepositoryError::Conflict { constraint } if constraint.contains("email") => {
            DomainError::EmailTaken.into()
        }
        other => other.into(),
    }
}

/// 去除首尾空白；空字符串视为清空
fn optional_text(
    field: &str,
    value: Option<String>,
    max_len: usize,
) -> Result<Option<String>, DomainError> {
    match value.map(|v| v.trim().to_owned()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.chars().count() > max_len => Err(DomainError::invalid_argument(
            field,
            format!("must be at most {max_len} characters"),
        )),
        Some(v) => Ok(Some(v)),
    }
}

fn optional_url(value: Option<String>) -> Result<Option<String>, DomainError> {
    let value = optional_text("avatar_url", value, AVATAR_URL_MAX_LEN)?;
    match value {
        Some(url) if !(url.starts_with("https://") || url.starts_with("http://")) => Err(
            DomainError::invalid_argument("avatar_url", "must be an http(s) URL"),
        ),
        other => Ok(other),
    }
}

fn validate_ai_preferences(ai: &AiPreferences) -> Result<(), DomainError> {
    if !(0.0..=2.0).contains(&ai.temperature) {
        return Err(DomainError::invalid_argument(
            "ai_preferences.temperature",
            "must be between 0 and 2",
        ));
    }
    if ai.max_tokens == 0 {
        return Err(DomainError::invalid_argument(
            "ai_preferences.max_tokens",
            "must be positive",
        ));
    }
    Ok(())
}
