//! 内存实现
//!
//! 与 PostgreSQL / Redis 实现遵守同样的接口约定（唯一约束、软删除过滤、
//! 原子计数、序号分配），用于单元测试、接口测试和本地试运行。

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use domain::{
    Account, AccountId, AccountStatus, ActivityEvent, ActivityType, ChatSession, Email, FailedLoginOutcome,
    LockoutPolicy, LoginAttempt, Message, MessageId, NewMessage, PasswordHash, Preferences,
    RepositoryError, SessionId, SessionStatus, Timestamp, UserStats, Username,
};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cache::{CacheError, CacheStore};
use crate::dto::Page;
use crate::password::{PasswordHasher, PasswordHasherError};
use crate::repository::{
    AccountRepository, ActivityRepository, HistoryQuery, LoginAttemptRepository,
    MessageRepository, PreferencesRepository, SessionRepository,
};

pub const EMAIL_CONSTRAINT: &str = "accounts_email_key";
pub const USERNAME_CONSTRAINT: &str = "accounts_username_key";

fn page_of<T: Clone>(items: &[T], limit: u32, offset: u32) -> Page<T> {
    let total = items.len() as u64;
    let slice = items
        .iter()
        .skip(offset as usize)
        .take(limit as usize)
        .cloned()
        .collect();
    Page::new(slice, total, offset)
}

#[derive(Default)]
pub struct MemoryAccountRepository {
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl MemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取原始记录（包括已软删除的）
    pub async fn raw(&self, id: AccountId) -> Option<Account> {
        self.accounts.read().await.get(&id).cloned()
    }

    /// 直接改写账户状态，模拟管理端的停用操作
    pub async fn set_status(&self, id: AccountId, status: AccountStatus) -> bool {
        match self.accounts.write().await.get_mut(&id) {
            Some(account) => {
                account.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AccountRepository for MemoryAccountRepository {
    async fn create(&self, account: Account) -> Result<Account, RepositoryError> {
        let mut accounts = self.accounts.write().await;
        if accounts.values().any(|a| a.email == account.email) {
            return Err(RepositoryError::conflict(EMAIL_CONSTRAINT));
        }
        if accounts.values().any(|a| a.username == account.username) {
            return Err(RepositoryError::conflict(USERNAME_CONSTRAINT));
        }
        accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        Ok(self
            .accounts
            .read()
            .await
            .get(&id)
            .filter(|a| !a.is_deleted())
            .cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .find(|a| &a.email == email && !a.is_deleted())
            .cloned())
    }

    async fn email_exists(&self, email: &Email) -> Result<bool, RepositoryError> {
        Ok(self.accounts.read().await.values().any(|a| &a.email == email))
    }

    async fn username_exists(&self, username: &Username) -> Result<bool, RepositoryError> {
        Ok(self
            .accounts
            .read()
            .await
            .values()
            .any(|a| &a.username == username))
    }

    async fn update_profile(&self, account: &Account) -> Result<Account, RepositoryError> {
        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|a| a.id != account.id && a.username == account.username)
        {
            return Err(RepositoryError::conflict(USERNAME_CONSTRAINT));
        }
        let stored = accounts
            .get_mut(&account.id)
            .filter(|a| !a.is_deleted())
            .ok_or(RepositoryError::NotFound)?;
        stored.username = account.username.clone();
        stored.first_name = account.first_name.clone();
        stored.last_name = account.last_name.clone();
        stored.avatar_url = account.avatar_url.clone();
        stored.updated_at = account.updated_at;
        Ok(stored.clone())
    }

    async fn record_failed_login(
        &self,
        id: AccountId,
        policy: &LockoutPolicy,
        now: Timestamp,
    ) -> Result<FailedLoginOutcome, RepositoryError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        account.record_failed_login(policy, now);
        Ok(FailedLoginOutcome {
            attempts: account.failed_login_attempts,
            locked_until: account.locked_until,
        })
    }

    async fn record_successful_login(
        &self,
        id: AccountId,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        account.record_successful_login(now);
        Ok(())
    }

    async fn soft_delete(&self, id: AccountId, now: Timestamp) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        let account = accounts
            .get_mut(&id)
            .filter(|a| !a.is_deleted())
            .ok_or(RepositoryError::NotFound)?;
        account.soft_delete(now);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPreferencesRepository {
    rows: RwLock<HashMap<AccountId, Preferences>>,
}

impl MemoryPreferencesRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferencesRepository for MemoryPreferencesRepository {
    async fn create(&self, preferences: &Preferences) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&preferences.account_id) {
            return Err(RepositoryError::conflict("user_preferences_pkey"));
        }
        rows.insert(preferences.account_id, preferences.clone());
        Ok(())
    }

    async fn find(&self, account_id: AccountId) -> Result<Option<Preferences>, RepositoryError> {
        Ok(self.rows.read().await.get(&account_id).cloned())
    }

    async fn upsert(&self, preferences: &Preferences) -> Result<Preferences, RepositoryError> {
        let mut rows = self.rows.write().await;
        let created_at = rows
            .get(&preferences.account_id)
            .map(|existing| existing.created_at)
            .unwrap_or(preferences.created_at);
        let stored = Preferences {
            created_at,
            ..preferences.clone()
        };
        rows.insert(preferences.account_id, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, account_id: AccountId) -> Result<(), RepositoryError> {
        self.rows.write().await.remove(&account_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryActivityRepository {
    events: RwLock<Vec<ActivityEvent>>,
}

impl MemoryActivityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events_for(&self, account_id: AccountId) -> Vec<ActivityEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.account_id == account_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ActivityRepository for MemoryActivityRepository {
    async fn record(&self, event: &ActivityEvent) -> Result<(), RepositoryError> {
        self.events.write().await.push(event.clone());
        Ok(())
    }

    async fn stats(
        &self,
        account_id: AccountId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<UserStats, RepositoryError> {
        let events = self.events.read().await;
        let mut counts: HashMap<ActivityType, u64> = HashMap::new();
        let mut last_activity = None;
        for event in events.iter().filter(|e| {
            e.account_id == account_id && e.created_at >= from && e.created_at <= to
        }) {
            *counts.entry(event.activity_type).or_default() += 1;
            last_activity = last_activity.max(Some(event.created_at));
        }
        Ok(UserStats::from_counts(counts, last_activity))
    }

    async fn delete_for_account(&self, account_id: AccountId) -> Result<(), RepositoryError> {
        self.events
            .write()
            .await
            .retain(|e| e.account_id != account_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLoginAttemptRepository {
    attempts: RwLock<Vec<LoginAttempt>>,
}

impl MemoryLoginAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attempts(&self) -> Vec<LoginAttempt> {
        self.attempts.read().await.clone()
    }
}

#[async_trait]
impl LoginAttemptRepository for MemoryLoginAttemptRepository {
    async fn record(&self, attempt: &LoginAttempt) -> Result<(), RepositoryError> {
        self.attempts.write().await.push(attempt.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: RwLock<HashMap<SessionId, ChatSession>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn owner_of(&self, id: SessionId) -> Option<AccountId> {
        self.sessions.read().await.get(&id).map(|s| s.owner_id)
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(RepositoryError::conflict("chat_sessions_pkey"));
        }
        sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn find_owned(
        &self,
        id: SessionId,
        owner_id: AccountId,
    ) -> Result<Option<ChatSession>, RepositoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .get(&id)
            .filter(|s| s.owner_id == owner_id)
            .cloned())
    }

    async fn list_for_owner(
        &self,
        owner_id: AccountId,
        limit: u32,
        offset: u32,
    ) -> Result<Page<ChatSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut owned: Vec<ChatSession> = sessions
            .values()
            .filter(|s| s.owner_id == owner_id && s.status != SessionStatus::Archived)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(page_of(&owned, limit, offset))
    }

    async fn update(&self, session: &ChatSession) -> Result<ChatSession, RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(&session.id)
            .filter(|s| s.owner_id == session.owner_id)
            .ok_or(RepositoryError::NotFound)?;
        *stored = session.clone();
        Ok(stored.clone())
    }

    async fn count_active(&self, owner_id: AccountId) -> Result<u64, RepositoryError> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.owner_id == owner_id && s.status == SessionStatus::Active)
            .count() as u64)
    }

    async fn touch(&self, id: SessionId, at: Timestamp) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        session.last_activity_at = at;
        session.updated_at = at;
        Ok(())
    }
}

pub struct MemoryMessageRepository {
    sessions: Arc<MemorySessionRepository>,
    messages: RwLock<Vec<Message>>,
}

impl MemoryMessageRepository {
    pub fn new(sessions: Arc<MemorySessionRepository>) -> Self {
        Self {
            sessions,
            messages: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageRepository for MemoryMessageRepository {
    async fn append(&self, message: NewMessage) -> Result<Message, RepositoryError> {
        let mut messages = self.messages.write().await;
        let next = messages
            .iter()
            .filter(|m| m.session_id == message.session_id)
            .map(|m| m.order_index)
            .max()
            .unwrap_or(0)
            + 1;
        let stored = message.into_message(next);
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn history(
        &self,
        session_id: SessionId,
        query: HistoryQuery,
    ) -> Result<Page<Message>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut matching: Vec<Message> = messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .filter(|m| query.from.map_or(true, |from| m.created_at >= from))
            .filter(|m| query.to.map_or(true, |to| m.created_at <= to))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            a.order_index
                .cmp(&b.order_index)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(page_of(&matching, query.limit, query.offset))
    }

    async fn search(
        &self,
        session_id: SessionId,
        needle: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<Message>, RepositoryError> {
        let needle = needle.to_lowercase();
        let messages = self.messages.read().await;
        let mut matching: Vec<Message> = messages
            .iter()
            .filter(|m| m.session_id == session_id && m.content.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.order_index.cmp(&a.order_index));
        Ok(page_of(&matching, limit, offset))
    }

    async fn count_for_session(&self, session_id: SessionId) -> Result<u64, RepositoryError> {
        Ok(self
            .messages
            .read()
            .await
            .iter()
            .filter(|m| m.session_id == session_id)
            .count() as u64)
    }

    async fn delete_owned(
        &self,
        id: MessageId,
        owner_id: AccountId,
    ) -> Result<Option<Message>, RepositoryError> {
        let session_id = match self.messages.read().await.iter().find(|m| m.id == id) {
            Some(message) => message.session_id,
            None => return Ok(None),
        };
        if self.sessions.owner_of(session_id).await != Some(owner_id) {
            return Ok(None);
        }
        let mut messages = self.messages.write().await;
        let position = messages.iter().position(|m| m.id == id);
        Ok(position.map(|idx| messages.remove(idx)))
    }
}

enum CacheValue {
    Text(String),
    Set(BTreeSet<String>),
}

struct CacheEntry {
    value: CacheValue,
    expires_at: Instant,
}

/// 带过期时间的内存缓存
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, CacheEntry>) -> R) -> R {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        f(&mut entries)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.with_entries(|entries| entries.contains_key(key))
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.with_entries(|entries| match entries.get(key) {
            Some(CacheEntry {
                value: CacheValue::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(CacheError::backend(format!("{key} holds a set"))),
            None => Ok(None),
        })
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            entries.insert(
                key.to_owned(),
                CacheEntry {
                    value: CacheValue::Text(value),
                    expires_at: Instant::now() + ttl,
                },
            );
        });
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            for key in keys {
                entries.remove(key);
            }
        });
        Ok(())
    }

    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_owned()).or_insert_with(|| CacheEntry {
                value: CacheValue::Set(BTreeSet::new()),
                expires_at: Instant::now() + ttl,
            });
            match &mut entry.value {
                CacheValue::Set(members) => {
                    members.insert(member.to_owned());
                    entry.expires_at = Instant::now() + ttl;
                    Ok(())
                }
                CacheValue::Text(_) => Err(CacheError::backend(format!("{key} holds a string"))),
            }
        })
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), CacheError> {
        self.with_entries(|entries| {
            if let Some(CacheEntry {
                value: CacheValue::Set(members),
                ..
            }) = entries.get_mut(key)
            {
                members.remove(member);
                if members.is_empty() {
                    entries.remove(key);
                }
            }
        });
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError> {
        self.with_entries(|entries| match entries.get(key) {
            Some(CacheEntry {
                value: CacheValue::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(CacheError::backend(format!("{key} holds a string"))),
            None => Ok(Vec::new()),
        })
    }
}

/// 不做真正哈希的密码器，只给测试和本地试运行用
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainPasswordHasher;

#[async_trait]
impl PasswordHasher for PlainPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        PasswordHash::new(format!("plain${plaintext}"))
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        Ok(hashed.as_str() == format!("plain${plaintext}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::{MessageMetadata, MessageType, SessionSettings};

    #[tokio::test]
    async fn order_index_starts_at_one_per_session() {
        let sessions = Arc::new(MemorySessionRepository::new());
        let messages = MemoryMessageRepository::new(sessions);
        let first = SessionId::generate();
        let second = SessionId::generate();
        let author = AccountId::generate();
        let new = |session_id| NewMessage {
            id: MessageId::generate(),
            session_id,
            author_id: author,
            content: "hi".into(),
            message_type: MessageType::User,
            metadata: MessageMetadata::default(),
            parent_message_id: None,
            created_at: Utc::now(),
        };
        assert_eq!(messages.append(new(first)).await.unwrap().order_index, 1);
        assert_eq!(messages.append(new(first)).await.unwrap().order_index, 2);
        assert_eq!(messages.append(new(second)).await.unwrap().order_index, 1);
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let store = MemoryCacheStore::new();
        store
            .set_with_ttl("k", "v".into(), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".into()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_add_refreshes_ttl_and_remove_keeps_it() {
        let store = MemoryCacheStore::new();
        store
            .add_to_set("typing:s", "a", Duration::from_secs(30))
            .await
            .unwrap();
        store
            .add_to_set("typing:s", "b", Duration::from_secs(30))
            .await
            .unwrap();
        store.remove_from_set("typing:s", "a").await.unwrap();
        assert_eq!(store.set_members("typing:s").await.unwrap(), vec!["b"]);
    }

    #[tokio::test]
    async fn sessions_listing_hides_archived_and_orders_by_activity() {
        let repo = MemorySessionRepository::new();
        let owner = AccountId::generate();
        let now = Utc::now();
        let mut older = ChatSession::new(
            SessionId::generate(),
            owner,
            "older",
            SessionSettings::default(),
            now - chrono::Duration::hours(1),
        )
        .unwrap();
        let newer =
            ChatSession::new(SessionId::generate(), owner, "newer", SessionSettings::default(), now)
                .unwrap();
        let mut archived =
            ChatSession::new(SessionId::generate(), owner, "gone", SessionSettings::default(), now)
                .unwrap();
        archived.archive(now);
        older.last_activity_at = now - chrono::Duration::hours(1);
        for session in [&older, &newer, &archived] {
            repo.create(session).await.unwrap();
        }

        let page = repo.list_for_owner(owner, 10, 0).await.unwrap();
        let titles: Vec<_> = page.items.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["newer", "older"]);
        assert_eq!(page.total_count, 2);
        assert!(!page.has_more);
    }
}
