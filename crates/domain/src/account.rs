//! 账户实体与认证状态机

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::lockout::{LockState, LockoutPolicy};
use crate::value_objects::{AccountId, Email, PasswordHash, Timestamp, Username};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRole {
    User,
    Admin,
    Moderator,
}

impl AccountRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Moderator => "moderator",
        }
    }
}

impl FromStr for AccountRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            other => Err(DomainError::invalid_argument(
                "role",
                format!("unknown role '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
    Deleted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            "deleted" => Ok(Self::Deleted),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown account status '{other}'"),
            )),
        }
    }
}

/// 用户账户。
///
/// 不变量：`status != Active` 或 `locked_until` 在未来时不可认证。
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub email: Email,
    pub username: Username,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub password_hash: PasswordHash,
    pub role: AccountRole,
    pub status: AccountStatus,
    pub failed_login_attempts: u32,
    pub last_failed_login_at: Option<Timestamp>,
    pub locked_until: Option<Timestamp>,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Account {
    /// 新注册账户：普通用户、激活状态、计数清零。
    pub fn register(
        id: AccountId,
        email: Email,
        username: Username,
        password_hash: PasswordHash,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            email,
            username,
            first_name: None,
            last_name: None,
            avatar_url: None,
            password_hash,
            role: AccountRole::User,
            status: AccountStatus::Active,
            failed_login_attempts: 0,
            last_failed_login_at: None,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn lock_state(&self, now: Timestamp) -> LockState {
        LockState::at(self.locked_until, now)
    }

    /// 认证前置检查：先看状态，再看锁定。
    pub fn ensure_can_login(&self, now: Timestamp) -> Result<(), DomainError> {
        if self.status != AccountStatus::Active {
            return Err(DomainError::AccountInactive);
        }
        if let LockState::Locked { until } = self.lock_state(now) {
            return Err(DomainError::AccountLocked { until });
        }
        Ok(())
    }

    /// 记录一次密码错误，返回本次是否触发锁定。
    pub fn record_failed_login(&mut self, policy: &LockoutPolicy, now: Timestamp) -> bool {
        let lock = policy.should_lock(self.failed_login_attempts);
        self.failed_login_attempts = self.failed_login_attempts.saturating_add(1);
        self.last_failed_login_at = Some(now);
        if lock {
            self.locked_until = Some(policy.lock_deadline(now));
        }
        self.updated_at = now;
        lock
    }

    pub fn record_successful_login(&mut self, now: Timestamp) {
        self.failed_login_attempts = 0;
        self.locked_until = None;
        self.last_login_at = Some(now);
        self.updated_at = now;
    }

    pub fn soft_delete(&mut self, now: Timestamp) {
        self.status = AccountStatus::Deleted;
        self.updated_at = now;
    }

    pub fn is_deleted(&self) -> bool {
        self.status == AccountStatus::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn sample(now: Timestamp) -> Account {
        Account::register(
            AccountId::generate(),
            Email::parse("a@b.com").unwrap(),
            Username::parse("ab").unwrap(),
            PasswordHash::new("hash").unwrap(),
            now,
        )
    }

    #[test]
    fn fifth_failure_locks_account() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let policy = LockoutPolicy::default();
        let mut account = sample(now);

        for _ in 0..4 {
            assert!(!account.record_failed_login(&policy, now));
        }
        assert!(account.ensure_can_login(now).is_ok());

        assert!(account.record_failed_login(&policy, now));
        assert_eq!(account.failed_login_attempts, 5);
        assert!(matches!(
            account.ensure_can_login(now),
            Err(DomainError::AccountLocked { .. })
        ));
        assert!(account
            .ensure_can_login(now + Duration::minutes(15))
            .is_ok());
    }

    #[test]
    fn success_resets_counters() {
        let now = Utc::now();
        let policy = LockoutPolicy::default();
        let mut account = sample(now);
        for _ in 0..5 {
            account.record_failed_login(&policy, now);
        }
        account.record_successful_login(now);
        assert_eq!(account.failed_login_attempts, 0);
        assert_eq!(account.locked_until, None);
        assert_eq!(account.last_login_at, Some(now));
    }

    #[test]
    fn status_is_checked_before_lock() {
        let now = Utc::now();
        let mut account = sample(now);
        account.status = AccountStatus::Suspended;
        account.locked_until = Some(now + Duration::minutes(5));
        assert_eq!(
            account.ensure_can_login(now),
            Err(DomainError::AccountInactive)
        );
    }

    #[test]
    fn role_and_status_round_trip_through_strings() {
        for role in [AccountRole::User, AccountRole::Admin, AccountRole::Moderator] {
            assert_eq!(role.as_str().parse::<AccountRole>().unwrap(), role);
        }
        assert!("root".parse::<AccountRole>().is_err());
        assert_eq!(
            "deleted".parse::<AccountStatus>().unwrap(),
            AccountStatus::Deleted
        );
    }
}
