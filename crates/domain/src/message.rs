//! 会话消息实体

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;
use crate::value_objects::{AccountId, MessageId, SessionId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    User,
    Assistant,
    System,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl FromStr for MessageType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(DomainError::invalid_argument(
                "message_type",
                format!("unknown message type '{other}'"),
            )),
        }
    }
}

/// 消息附加信息（引用、模型、耗时等）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageMetadata {
    pub source_citations: BTreeMap<String, String>,
    pub relevance_score: f64,
    pub tags: Vec<String>,
    pub model_used: Option<String>,
    pub token_count: u32,
    pub response_time_ms: f64,
    pub processing_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub author_id: AccountId,
    pub content: String,
    pub message_type: MessageType,
    pub metadata: MessageMetadata,
    pub parent_message_id: Option<MessageId>,
    /// 会话内严格递增的序号，从 1 开始
    pub order_index: i64,
    pub created_at: Timestamp,
}

/// 待写入的消息；序号由存储层分配
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    pub author_id: AccountId,
    pub content: String,
    pub message_type: MessageType,
    pub metadata: MessageMetadata,
    pub parent_message_id: Option<MessageId>,
    pub created_at: Timestamp,
}

impl NewMessage {
    pub fn into_message(self, order_index: i64) -> Message {
        Message {
            id: self.id,
            session_id: self.session_id,
            author_id: self.author_id,
            content: self.content,
            message_type: self.message_type,
            metadata: self.metadata,
            parent_message_id: self.parent_message_id,
            order_index,
            created_at: self.created_at,
        }
    }
}

/// 消息内容：非空，且不超过 `max_chars` 个字符
pub fn validate_content(content: &str, max_chars: usize) -> Result<(), DomainError> {
    if content.trim().is_empty() {
        return Err(DomainError::invalid_argument("content", "cannot be empty"));
    }
    if content.chars().count() > max_chars {
        return Err(DomainError::invalid_argument(
            "content",
            format!("exceeds maximum length of {max_chars} characters"),
        ));
    }
    Ok(())
}
