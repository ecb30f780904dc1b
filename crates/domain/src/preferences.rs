//! 用户偏好设置

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{AccountId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    System,
}

impl Theme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::System => "system",
        }
    }
}

impl FromStr for Theme {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            _ => Err(DomainError::invalid_argument(
                "theme",
                "must be one of light, dark, system",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileVisibility {
    Public,
    Private,
    Friends,
}

impl ProfileVisibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
            Self::Friends => "friends",
        }
    }
}

impl FromStr for ProfileVisibility {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            "friends" => Ok(Self::Friends),
            _ => Err(DomainError::invalid_argument(
                "profile_visibility",
                "must be one of public, private, friends",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiPreferences {
    pub default_persona: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub enable_rag: bool,
    #[serde(default)]
    pub preferred_models: Vec<String>,
    #[serde(default)]
    pub custom_instructions: String,
}

impl Default for AiPreferences {
    fn default() -> Self {
        Self {
            default_persona: "assistant".into(),
            temperature: 0.7,
            max_tokens: 2048,
            enable_rag: true,
            preferred_models: vec!["gpt-3.5-turbo".into()],
            custom_instructions: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub account_id: AccountId,
    pub theme: Theme,
    pub language: String,
    pub timezone: String,
    pub notifications_enabled: bool,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub ai_preferences: AiPreferences,
    pub profile_visibility: ProfileVisibility,
    pub data_sharing: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Preferences {
    /// 注册时写入的默认偏好
    pub fn defaults(account_id: AccountId, now: Timestamp) -> Self {
        Self {
            account_id,
            theme: Theme::System,
            language: "en".into(),
            timezone: "UTC".into(),
            notifications_enabled: true,
            email_notifications: true,
            push_notifications: true,
            ai_preferences: AiPreferences::default(),
            profile_visibility: ProfileVisibility::Public,
            data_sharing: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 语言代码为两个 ASCII 字母，统一小写
pub fn parse_language(value: &str) -> Result<String, DomainError> {
    let value = value.trim();
    if value.len() != 2 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(DomainError::invalid_argument(
            "language",
            "must be a two-letter language code",
        ));
    }
    Ok(value.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn defaults_match_registration_profile() {
        let prefs = Preferences::defaults(AccountId::generate(), Utc::now());
        assert_eq!(prefs.theme, Theme::System);
        assert_eq!(prefs.language, "en");
        assert_eq!(prefs.profile_visibility, ProfileVisibility::Public);
        assert!(!prefs.data_sharing);
        assert_eq!(prefs.ai_preferences.preferred_models, vec!["gpt-3.5-turbo"]);
    }

    #[test]
    fn language_code_validation() {
        assert_eq!(parse_language("DE").unwrap(), "de");
        assert!(parse_language("eng").is_err());
        assert!(parse_language("e1").is_err());
    }

    #[test]
    fn enum_parsing_rejects_unknown_values() {
        assert!("sepia".parse::<Theme>().is_err());
        assert_eq!(
            "friends".parse::<ProfileVisibility>().unwrap(),
            ProfileVisibility::Friends
        );
    }
}
