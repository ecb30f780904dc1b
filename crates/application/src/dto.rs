use domain::{Account, AccountId, AccountRole, AccountStatus, Timestamp};
use serde::{Deserialize, Serialize};

use crate::token::{TokenClaims, TokenPair};

/// 对外可见的账户信息，不含密码哈希与登录计数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: AccountId,
    pub email: String,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: AccountRole,
    pub status: AccountStatus,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.as_str().to_owned(),
            username: account.username.as_str().to_owned(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            avatar_url: account.avatar_url.clone(),
            role: account.role,
            status: account.status,
            last_login_at: account.last_login_at,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthOutcome {
    pub account: AccountView,
    pub tokens: TokenPair,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedToken {
    pub claims: TokenClaims,
    pub account: AccountView,
}

/// 分页结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total_count: u64, offset: u32) -> Self {
        let has_more = u64::from(offset) + (items.len() as u64) < total_count;
        Self {
            items,
            total_count,
            has_more,
        }
    }

    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            has_more: false,
        }
    }
}
