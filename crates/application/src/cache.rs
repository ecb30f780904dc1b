//! 会话读穿缓存
//!
//! 缓存只是加速层：命中失败、反序列化失败、连接失败都按未命中处理并记录日志，
//! 从不向调用方返回错误。写路径先落库，再删除相关键。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{AccountId, ChatSession, Message, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// 缓存后端能力：键值 + TTL，以及带 TTL 的集合
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration)
        -> Result<(), CacheError>;
    async fn delete(&self, keys: &[String]) -> Result<(), CacheError>;
    /// 加入成员并刷新整个集合的 TTL，两步必须原子完成
    async fn add_to_set(&self, key: &str, member: &str, ttl: Duration) -> Result<(), CacheError>;
    /// 移除成员，不改变 TTL
    async fn remove_from_set(&self, key: &str, member: &str) -> Result<(), CacheError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, CacheError>;
}

/// 永远未命中的缓存，用于关闭缓存的部署
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheStore;

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set_with_ttl(
        &self,
        _key: &str,
        _value: String,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _keys: &[String]) -> Result<(), CacheError> {
        Ok(())
    }

    async fn add_to_set(
        &self,
        _key: &str,
        _member: &str,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Ok(())
    }

    async fn remove_from_set(&self, _key: &str, _member: &str) -> Result<(), CacheError> {
        Ok(())
    }

    async fn set_members(&self, _key: &str) -> Result<Vec<String>, CacheError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub session: Duration,
    pub messages: Duration,
    pub typing: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            session: Duration::from_secs(24 * 60 * 60),
            messages: Duration::from_secs(60 * 60),
            typing: Duration::from_secs(30),
        }
    }
}

/// 缓存中的首页历史消息（序号升序）及总数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedHistory {
    pub messages: Vec<Message>,
    pub total_count: u64,
}

pub fn session_key(id: SessionId) -> String {
    format!("session:{id}")
}

pub fn messages_key(id: SessionId) -> String {
    format!("messages:{id}")
}

pub fn typing_key(id: SessionId) -> String {
    format!("typing:{id}")
}

/// 聊天服务使用的缓存门面，负责键空间和 JSON 编解码
#[derive(Clone)]
pub struct SessionCache {
    store: Arc<dyn CacheStore>,
    ttls: CacheTtls,
}

impl SessionCache {
    pub fn new(store: Arc<dyn CacheStore>, ttls: CacheTtls) -> Self {
        Self { store, ttls }
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCacheStore), CacheTtls::default())
    }

    pub async fn session(&self, id: SessionId) -> Option<ChatSession> {
        self.read_json(&session_key(id)).await
    }

    pub async fn store_session(&self, session: &ChatSession) {
        self.write_json(&session_key(session.id), session, self.ttls.session)
            .await;
    }

    pub async fn recent_messages(&self, id: SessionId) -> Option<CachedHistory> {
        self.read_json(&messages_key(id)).await
    }

    pub async fn store_recent_messages(&self, id: SessionId, history: &CachedHistory) {
        self.write_json(&messages_key(id), history, self.ttls.messages)
            .await;
    }

    pub async fn add_typing(&self, session_id: SessionId, account_id: AccountId) {
        let key = typing_key(session_id);
        if let Err(err) = self
            .store
            .add_to_set(&key, &account_id.to_string(), self.ttls.typing)
            .await
        {
            tracing::warn!(key = %key, error = %err, "failed to mark user as typing");
        }
    }

    pub async fn remove_typing(&self, session_id: SessionId, account_id: AccountId) {
        let key = typing_key(session_id);
        if let Err(err) = self
            .store
            .remove_from_set(&key, &account_id.to_string())
            .await
        {
            tracing::warn!(key = %key, error = %err, "failed to clear typing status");
        }
    }

    pub async fn typing_users(&self, session_id: SessionId) -> Vec<AccountId> {
        let key = typing_key(session_id);
        match self.store.set_members(&key).await {
            Ok(members) => members
                .iter()
                .filter_map(|member| uuid::Uuid::parse_str(member).ok())
                .map(AccountId::from)
                .collect(),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to read typing users");
                Vec::new()
            }
        }
    }

    /// 删除会话、消息列表和输入状态三个键
    pub async fn invalidate(&self, session_id: SessionId) {
        let keys = vec![
            session_key(session_id),
            messages_key(session_id),
            typing_key(session_id),
        ];
        if let Err(err) = self.store.delete(&keys).await {
            tracing::warn!(session_id = %session_id, error = %err, "cache invalidation failed");
        }
    }

    async fn read_json<T>(&self, key: &str) -> Option<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!(key = %key, error = %err, "discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "cache read failed");
                None
            }
        }
    }

    async fn write_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to encode cache entry");
                return;
            }
        };
        if let Err(err) = self.store.set_with_ttl(key, raw, ttl).await {
            tracing::warn!(key = %key, error = %err, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domain::SessionSettings;

    fn session() -> ChatSession {
        ChatSession::new(
            SessionId::generate(),
            AccountId::generate(),
            "cached",
            SessionSettings::default(),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn backend_errors_read_as_miss() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Err(CacheError::backend("connection refused")));
        let cache = SessionCache::new(Arc::new(store), CacheTtls::default());
        assert!(cache.session(SessionId::generate()).await.is_none());
    }

    #[tokio::test]
    async fn garbage_entries_read_as_miss() {
        let mut store = MockCacheStore::new();
        store
            .expect_get()
            .returning(|_| Ok(Some("{not json".to_string())));
        let cache = SessionCache::new(Arc::new(store), CacheTtls::default());
        assert!(cache.session(SessionId::generate()).await.is_none());
    }

    #[tokio::test]
    async fn session_written_with_session_ttl() {
        let session = session();
        let key = session_key(session.id);
        let mut store = MockCacheStore::new();
        store
            .expect_set_with_ttl()
            .withf(move |k, _, ttl| k == key && *ttl == Duration::from_secs(24 * 60 * 60))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let cache = SessionCache::new(Arc::new(store), CacheTtls::default());
        cache.store_session(&session).await;
    }

    #[tokio::test]
    async fn invalidate_removes_all_three_keys() {
        let id = SessionId::generate();
        let expected = vec![session_key(id), messages_key(id), typing_key(id)];
        let mut store = MockCacheStore::new();
        store
            .expect_delete()
            .withf(move |keys| keys == expected.as_slice())
            .times(1)
            .returning(|_| Err(CacheError::backend("timeout")));
        let cache = SessionCache::new(Arc::new(store), CacheTtls::default());
        // 失败只记录日志
        cache.invalidate(id).await;
    }

    #[tokio::test]
    async fn typing_users_ignores_foreign_members() {
        let account = AccountId::generate();
        let members = vec![account.to_string(), "not-a-uuid".to_string()];
        let mut store = MockCacheStore::new();
        store
            .expect_set_members()
            .returning(move |_| Ok(members.clone()));
        let cache = SessionCache::new(Arc::new(store), CacheTtls::default());
        assert_eq!(cache.typing_users(SessionId::generate()).await, vec![account]);
    }

    #[test]
    fn key_layout() {
        let id = SessionId::generate();
        assert_eq!(session_key(id), format!("session:{id}"));
        assert_eq!(messages_key(id), format!("messages:{id}"));
        assert_eq!(typing_key(id), format!("typing:{id}"));
    }
}
