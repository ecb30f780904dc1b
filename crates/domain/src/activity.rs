//! 用户行为记录与统计

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{AccountId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Registration,
    Login,
    FailedLogin,
    Logout,
    PasswordChange,
    ProfileUpdate,
    SessionStart,
    MessageSent,
    FeatureUsed,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Login => "login",
            Self::FailedLogin => "failed_login",
            Self::Logout => "logout",
            Self::PasswordChange => "password_change",
            Self::ProfileUpdate => "profile_update",
            Self::SessionStart => "session_start",
            Self::MessageSent => "message_sent",
            Self::FeatureUsed => "feature_used",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "registration" => Self::Registration,
            "login" => Self::Login,
            "failed_login" => Self::FailedLogin,
            "logout" => Self::Logout,
            "password_change" => Self::PasswordChange,
            "profile_update" => Self::ProfileUpdate,
            "session_start" => Self::SessionStart,
            "message_sent" => Self::MessageSent,
            "feature_used" => Self::FeatureUsed,
            other => {
                return Err(DomainError::invalid_argument(
                    "activity_type",
                    format!("unknown activity type '{other}'"),
                ))
            }
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub account_id: AccountId,
    pub activity_type: ActivityType,
    pub metadata: HashMap<String, String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub created_at: Timestamp,
}

impl ActivityEvent {
    pub fn new(account_id: AccountId, activity_type: ActivityType, now: Timestamp) -> Self {
        Self {
            account_id,
            activity_type,
            metadata: HashMap::new(),
            ip_address: None,
            user_agent: None,
            session_id: None,
            created_at: now,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 登录尝试流水（成功与失败都记录）
#[derive(Debug, Clone, PartialEq)]
pub struct LoginAttempt {
    pub email: String,
    pub account_id: Option<AccountId>,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub attempted_at: Timestamp,
}

/// 指定时间范围内的用户统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_sessions: u64,
    pub total_messages: u64,
    pub last_activity: Option<Timestamp>,
    pub feature_usage: BTreeMap<String, u64>,
}

impl UserStats {
    /// 按行为类型的计数汇总出统计结果
    pub fn from_counts(
        counts: impl IntoIterator<Item = (ActivityType, u64)>,
        last_activity: Option<Timestamp>,
    ) -> Self {
        let mut stats = UserStats {
            last_activity,
            ..UserStats::default()
        };
        for (kind, count) in counts {
            match kind {
                ActivityType::SessionStart => stats.total_sessions += count,
                ActivityType::MessageSent => stats.total_messages += count,
                _ => {}
            }
            *stats
                .feature_usage
                .entry(kind.as_str().to_owned())
                .or_default() += count;
        }
        stats
    }
}
