//! 存储端口
//!
//! 持久化存储是唯一的事实来源；这里的接口由 PostgreSQL 实现和内存实现共同满足。

use async_trait::async_trait;
use domain::{
    Account, AccountId, ActivityEvent, ChatSession, Email, FailedLoginOutcome, LockoutPolicy,
    LoginAttempt, Message, MessageId, NewMessage, Preferences, RepositoryError, SessionId,
    Timestamp, UserStats, Username,
};

use crate::dto::Page;

#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// 邮箱或用户名冲突时返回 `RepositoryError::Conflict`
    async fn create(&self, account: Account) -> Result<Account, RepositoryError>;
    /// 已软删除的账户视为不存在
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError>;
    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError>;
    async fn email_exists(&self, email: &Email) -> Result<bool, RepositoryError>;
    async fn username_exists(&self, username: &Username) -> Result<bool, RepositoryError>;
    /// 更新用户名与资料字段
    async fn update_profile(&self, account: &Account) -> Result<Account, RepositoryError>;
    /// 原子地累加失败次数，达到阈值时同时写入锁定截止时间
    async fn record_failed_login(
        &self,
        id: AccountId,
        policy: &LockoutPolicy,
        now: Timestamp,
    ) -> Result<FailedLoginOutcome, RepositoryError>;
    async fn record_successful_login(
        &self,
        id: AccountId,
        now: Timestamp,
    ) -> Result<(), RepositoryError>;
    async fn soft_delete(&self, id: AccountId, now: Timestamp) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PreferencesRepository: Send + Sync {
    async fn create(&self, preferences: &Preferences) -> Result<(), RepositoryError>;
    async fn find(&self, account_id: AccountId) -> Result<Option<Preferences>, RepositoryError>;
    /// 不存在时插入
    async fn upsert(&self, preferences: &Preferences) -> Result<Preferences, RepositoryError>;
    async fn delete(&self, account_id: AccountId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn record(&self, event: &ActivityEvent) -> Result<(), RepositoryError>;
    async fn stats(
        &self,
        account_id: AccountId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<UserStats, RepositoryError>;
    async fn delete_for_account(&self, account_id: AccountId) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait LoginAttemptRepository: Send + Sync {
    async fn record(&self, attempt: &LoginAttempt) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError>;
    /// 按 id 和所有者查找；不属于该所有者的会话与不存在的会话同样返回 `None`
    async fn find_owned(
        &self,
        id: SessionId,
        owner_id: AccountId,
    ) -> Result<Option<ChatSession>, RepositoryError>;
    /// 未归档的会话，按最近活跃时间倒序
    async fn list_for_owner(
        &self,
        owner_id: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Page<ChatSession>, RepositoryError>;
    async fn update(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError>;
    async fn count_active(&self, owner_id: AccountId) -> Result<u64, RepositoryError>;
    async fn touch(&self, id: SessionId, at: Timestamp) -> Result<(), RepositoryError>;
}

/// 历史消息查询条件
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HistoryQuery {
    pub limit: u32,
    pub offset: u32,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
}

impl HistoryQuery {
    pub fn has_date_filter(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// 写入消息并原子地分配会话内序号（当前最大值 + 1）
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError>;
    /// 按序号升序
    async fn history(
        &self,
        session_id: SessionId,
        query: HistoryQuery,
    ) -> Result<Page<Message>, RepositoryError>;
    /// 内容大小写不敏感的子串匹配，最新的在前
    async fn search(
        &self,
        session_id: SessionId,
        needle: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Message>, RepositoryError>;
    async fn count_for_session(&self, session_id: SessionId) -> Result<u64, RepositoryError>;
    /// 仅当消息所在会话属于 `owner_id` 时删除并返回该消息
    async fn delete_owned(
        &self,
        id: MessageId,
        owner_id: AccountId,
    ) -> Result<Option<Message>, RepositoryError>;
}
