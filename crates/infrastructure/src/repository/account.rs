use application::AccountRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    Account, AccountId, AccountRole, AccountStatus, Email, FailedLoginOutcome, LockoutPolicy,
    PasswordHash, RepositoryError, Timestamp, Username,
};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{invalid_data, map_sqlx_err};

const ACCOUNT_COLUMNS: &str = "id, email, username, first_name, last_name, avatar_url, \
     password_hash, role, status, failed_login_attempts, last_failed_login_at, locked_until, \
     last_login_at, created_at, updated_at";

#[derive(Debug, FromRow)]
struct AccountRecord {
    id: Uuid,
    email: String,
    username: String,
    first_name: Option<String>,
    last_name: Option<String>,
    avatar_url: Option<String>,
    password_hash: String,
    role: String,
    status: String,
    failed_login_attempts: i32,
    last_failed_login_at: Option<DateTime<Utc>>,
    locked_until: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AccountRecord> for Account {
    type Error = RepositoryError;

    fn try_from(value: AccountRecord) -> Result<Self, Self::Error> {
        let email = Email::parse(value.email).map_err(|err| invalid_data(err.to_string()))?;
        let username =
            Username::parse(value.username).map_err(|err| invalid_data(err.to_string()))?;
        let password_hash =
            PasswordHash::new(value.password_hash).map_err(|err| invalid_data(err.to_string()))?;
        let role = value
            .role
            .parse::<AccountRole>()
            .map_err(|err| invalid_data(err.to_string()))?;
        let status = value
            .status
            .parse::<AccountStatus>()
            .map_err(|err| invalid_data(err.to_string()))?;

        Ok(Account {
            id: AccountId::from(value.id),
            email,
            username,
            first_name: value.first_name,
            last_name: value.last_name,
            avatar_url: value.avatar_url,
            password_hash,
            role,
            status,
            failed_login_attempts: u32::try_from(value.failed_login_attempts).unwrap_or(0),
            last_failed_login_at: value.last_failed_login_at,
            locked_until: value.locked_until,
            last_login_at: value.last_login_at,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct FailedLoginRecord {
    failed_login_attempts: i32,
    locked_until: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn create(&self, account: Account) -> Result<Account, RepositoryError> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            r#"
            INSERT INTO accounts (
                id, email, username, first_name, last_name, avatar_url, password_hash,
                role, status, failed_login_attempts, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(Uuid::from(account.id))
        .bind(account.email.as_str())
        .bind(account.username.as_str())
        .bind(account.first_name.as_deref())
        .bind(account.last_name.as_deref())
        .bind(account.avatar_url.as_deref())
        .bind(account.password_hash.as_str())
        .bind(account.role.as_str())
        .bind(account.status.as_str())
        .bind(account.failed_login_attempts as i32)
        .bind(account.created_at)
        .bind(account.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Account::try_from(record)
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, RepositoryError> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 AND status <> 'deleted'"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Account::try_from).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<Account>, RepositoryError> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1 AND status <> 'deleted'"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        record.map(Account::try_from).transpose()
    }

    async fn email_exists(&self, email: &Email) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1)")
            .bind(email.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn username_exists(&self, username: &Username) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM accounts WHERE username = $1)")
            .bind(username.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)
    }

    async fn update_profile(&self, account: &Account) -> Result<Account, RepositoryError> {
        let record = sqlx::query_as::<_, AccountRecord>(&format!(
            r#"
            UPDATE accounts
            SET username = $2, first_name = $3, last_name = $4, avatar_url = $5, updated_at = $6
            WHERE id = $1 AND status <> 'deleted'
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(Uuid::from(account.id))
        .bind(account.username.as_str())
        .bind(account.first_name.as_deref())
        .bind(account.last_name.as_deref())
        .bind(account.avatar_url.as_deref())
        .bind(account.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Account::try_from(record)
    }

    async fn record_failed_login(
        &self,
        id: AccountId,
        policy: &LockoutPolicy,
        now: Timestamp,
    ) -> Result<FailedLoginOutcome, RepositoryError> {
        // 计数与锁定在同一条语句里完成，并发失败不会丢失计数
        let record = sqlx::query_as::<_, FailedLoginRecord>(
            r#"
            UPDATE accounts
            SET failed_login_attempts = failed_login_attempts + 1,
                last_failed_login_at = $2,
                locked_until = CASE
                    WHEN failed_login_attempts + 1 >= $3 THEN $4
                    ELSE locked_until
                END,
                updated_at = $2
            WHERE id = $1
            RETURNING failed_login_attempts, locked_until
            "#,
        )
        .bind(Uuid::from(id))
        .bind(now)
        .bind(policy.max_attempts as i32)
        .bind(policy.lock_deadline(now))
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_err)?
        .ok_or(RepositoryError::NotFound)?;

        Ok(FailedLoginOutcome {
            attempts: u32::try_from(record.failed_login_attempts).unwrap_or(0),
            locked_until: record.locked_until,
        })
    }

    async fn record_successful_login(
        &self,
        id: AccountId,
        now: Timestamp,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET failed_login_attempts = 0, locked_until = NULL, last_login_at = $2, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(id))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn soft_delete(&self, id: AccountId, now: Timestamp) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE accounts SET status = 'deleted', updated_at = $2 WHERE id = $1 AND status <> 'deleted'",
        )
        .bind(Uuid::from(id))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
