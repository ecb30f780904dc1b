//! 聊天会话实体

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{AccountId, SessionId, Timestamp};

pub const SESSION_TITLE_MAX_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Paused,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "archived" => Ok(Self::Archived),
            other => Err(DomainError::invalid_argument(
                "status",
                format!("unknown session status '{other}'"),
            )),
        }
    }
}

/// 会话级 AI 设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    pub ai_persona: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub enable_rag: bool,
    #[serde(default)]
    pub document_sources: Vec<String>,
    #[serde(default)]
    pub system_prompt: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ai_persona: "assistant".into(),
            temperature: 0.7,
            max_tokens: 2048,
            enable_rag: true,
            document_sources: Vec::new(),
            system_prompt: String::new(),
        }
    }
}

impl SessionSettings {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(DomainError::invalid_argument(
                "settings.temperature",
                "must be between 0 and 2",
            ));
        }
        if self.max_tokens == 0 {
            return Err(DomainError::invalid_argument(
                "settings.max_tokens",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// 会话标题：去除首尾空白后 1..=200 个字符
pub fn validate_title(title: &str) -> Result<String, DomainError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(DomainError::invalid_argument("title", "cannot be empty"));
    }
    if title.chars().count() > SESSION_TITLE_MAX_LEN {
        return Err(DomainError::invalid_argument(
            "title",
            format!("must be at most {SESSION_TITLE_MAX_LEN} characters"),
        ));
    }
    Ok(title.to_owned())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,
    pub owner_id: AccountId,
    pub title: String,
    pub status: SessionStatus,
    pub settings: SessionSettings,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub last_activity_at: Timestamp,
}

impl ChatSession {
    pub fn new(
        id: SessionId,
        owner_id: AccountId,
        title: &str,
        settings: SessionSettings,
        now: Timestamp,
    ) -> Result<Self, DomainError> {
        let title = validate_title(title)?;
        settings.validate()?;
        Ok(Self {
            id,
            owner_id,
            title,
            status: SessionStatus::Active,
            settings,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
        })
    }

    pub fn is_owned_by(&self, account: AccountId) -> bool {
        self.owner_id == account
    }

    pub fn ensure_accepts_messages(&self) -> Result<(), DomainError> {
        if self.status != SessionStatus::Active {
            return Err(DomainError::SessionNotActive);
        }
        Ok(())
    }

    pub fn archive(&mut self, now: Timestamp) {
        self.status = SessionStatus::Archived;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn new_session_is_active_with_trimmed_title() {
        let owner = AccountId::generate();
        let session = ChatSession::new(
            SessionId::generate(),
            owner,
            "  Research notes ",
            SessionSettings::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(session.title, "Research notes");
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.is_owned_by(owner));
        assert!(session.ensure_accepts_messages().is_ok());
    }

    #[test]
    fn title_bounds() {
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"t".repeat(200)).is_ok());
        assert!(validate_title(&"t".repeat(201)).is_err());
    }

    #[test]
    fn archived_session_rejects_messages() {
        let mut session = ChatSession::new(
            SessionId::generate(),
            AccountId::generate(),
            "x",
            SessionSettings::default(),
            Utc::now(),
        )
        .unwrap();
        session.archive(Utc::now());
        assert_eq!(
            session.ensure_accepts_messages(),
            Err(DomainError::SessionNotActive)
        );
    }

    #[test]
    fn settings_reject_out_of_range_temperature() {
        let settings = SessionSettings {
            temperature: 3.5,
            ..SessionSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
