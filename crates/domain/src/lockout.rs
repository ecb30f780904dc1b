//! 登录失败锁定策略
//!
//! 连续失败次数达到阈值后锁定账户一段时间；锁定到期后自动解除，
//! 任意一次成功登录会清零计数并解除锁定。

use chrono::Duration;

use crate::value_objects::Timestamp;

pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_LOGIN_ATTEMPTS,
            lockout_duration: Duration::minutes(DEFAULT_LOCKOUT_MINUTES),
        }
    }
}

impl LockoutPolicy {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            max_attempts,
            lockout_duration,
        }
    }

    /// 本次失败（已有 `prior_failures` 次）是否触发锁定
    pub fn should_lock(&self, prior_failures: u32) -> bool {
        prior_failures.saturating_add(1) >= self.max_attempts
    }

    /// 从 `now` 起算的锁定截止时间
    pub fn lock_deadline(&self, now: Timestamp) -> Timestamp {
        now + self.lockout_duration
    }
}

/// 账户在某一时刻的锁定状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked { until: Timestamp },
}

impl LockState {
    pub fn at(locked_until: Option<Timestamp>, now: Timestamp) -> Self {
        match locked_until {
            Some(until) if until > now => Self::Locked { until },
            _ => Self::Unlocked,
        }
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked { .. })
    }
}

/// 一次失败登录落库后的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedLoginOutcome {
    pub attempts: u32,
    pub locked_until: Option<Timestamp>,
}
