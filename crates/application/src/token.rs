//! JWT 令牌签发与校验
//!
//! 使用 HS256 对称密钥。访问令牌和刷新令牌共享签发时间、各自独立过期，
//! 并通过 `kind` 声明区分用途：刷新令牌永远不能当作访问令牌使用。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use domain::{Account, AccountId, AccountRole, DomainError, Timestamp};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ApplicationError;

pub const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT Claims 结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub email: String,
    pub username: String,
    pub role: AccountRole,
    pub kind: TokenKind,
    pub jti: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn account_id(&self) -> Result<AccountId, DomainError> {
        Uuid::parse_str(&self.sub)
            .map(AccountId::from)
            .map_err(|_| DomainError::TokenInvalid)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub issued_at: Timestamp,
    pub access_expires_at: Timestamp,
    pub refresh_expires_at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: String,
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

/// JWT Token 服务
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(settings: TokenSettings, clock: Arc<dyn Clock>) -> Result<Self, ApplicationError> {
        if settings.secret.len() < MIN_SECRET_BYTES {
            return Err(ApplicationError::configuration(format!(
                "jwt secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        let access_ttl = chrono::Duration::from_std(settings.access_ttl)
            .map_err(|err| ApplicationError::configuration(format!("access ttl: {err}")))?;
        let refresh_ttl = chrono::Duration::from_std(settings.refresh_ttl)
            .map_err(|err| ApplicationError::configuration(format!("refresh ttl: {err}")))?;

        // 过期时间用注入的时钟自行判断，便于测试
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["sub", "exp", "iat"]);
        validation.set_issuer(&[settings.issuer.as_str()]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            issuer: settings.issuer,
            access_ttl,
            refresh_ttl,
            clock,
        })
    }

    /// 为账户签发一对新令牌
    pub fn issue_pair(&self, account: &Account) -> Result<TokenPair, ApplicationError> {
        let issued_at = self.clock.now();
        let access_expires_at = issued_at + self.access_ttl;
        let refresh_expires_at = issued_at + self.refresh_ttl;

        let access_token = self.sign(account, TokenKind::Access, issued_at, access_expires_at)?;
        let refresh_token =
            self.sign(account, TokenKind::Refresh, issued_at, refresh_expires_at)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".into(),
            issued_at,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// 校验签名、过期时间和令牌用途
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<TokenClaims, DomainError> {
        let claims = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(error = %err, "token rejected");
                DomainError::TokenInvalid
            })?;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(DomainError::TokenExpired);
        }
        if claims.kind != expected {
            return Err(DomainError::TokenKindMismatch {
                expected: expected.to_string(),
                actual: claims.kind.to_string(),
            });
        }
        Ok(claims)
    }

    fn sign(
        &self,
        account: &Account,
        kind: TokenKind,
        issued_at: Timestamp,
        expires_at: Timestamp,
    ) -> Result<String, ApplicationError> {
        let claims = TokenClaims {
            sub: account.id.to_string(),
            email: account.email.as_str().to_owned(),
            username: account.username.as_str().to_owned(),
            role: account.role,
            kind,
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| ApplicationError::infrastructure(format!("token signing failed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Utc;
    use domain::{Email, PasswordHash, Username};

    const SECRET: &str = "an-hs256-secret-that-is-long-enough!";

    fn settings() -> TokenSettings {
        TokenSettings {
            secret: SECRET.into(),
            issuer: "chat-platform".into(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }

    fn account() -> Account {
        Account::register(
            AccountId::generate(),
            Email::parse("a@b.com").unwrap(),
            Username::parse("ab").unwrap(),
            PasswordHash::new("hash").unwrap(),
            Utc::now(),
        )
    }

    fn service(clock: Arc<ManualClock>) -> TokenService {
        TokenService::new(settings(), clock).unwrap()
    }

    #[test]
    fn short_secret_is_rejected() {
        let result = TokenService::new(
            TokenSettings {
                secret: "short".into(),
                ..settings()
            },
            Arc::new(ManualClock::default()),
        );
        assert!(matches!(result, Err(ApplicationError::Configuration(_))));
    }

    #[test]
    fn issued_pair_verifies_with_matching_kinds() {
        let clock = Arc::new(ManualClock::default());
        let tokens = service(clock.clone());
        let account = account();
        let pair = tokens.issue_pair(&account).unwrap();

        let access = tokens.verify(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.account_id().unwrap(), account.id);
        assert_eq!(access.kind, TokenKind::Access);
        assert_eq!(access.email, "a@b.com");

        let refresh = tokens.verify(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.iat, access.iat);
        assert!(refresh.exp > access.exp);
        assert_ne!(refresh.jti, access.jti);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let tokens = service(Arc::new(ManualClock::default()));
        let pair = tokens.issue_pair(&account()).unwrap();
        assert_eq!(
            tokens.verify(&pair.refresh_token, TokenKind::Access),
            Err(DomainError::TokenKindMismatch {
                expected: "access".into(),
                actual: "refresh".into()
            })
        );
    }

    #[test]
    fn expired_access_token_is_rejected() {
        let clock = Arc::new(ManualClock::default());
        let tokens = service(clock.clone());
        let pair = tokens.issue_pair(&account()).unwrap();

        clock.advance(chrono::Duration::minutes(16));
        assert_eq!(
            tokens.verify(&pair.access_token, TokenKind::Access),
            Err(DomainError::TokenExpired)
        );
        assert!(tokens.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn tampered_or_foreign_tokens_are_invalid() {
        let clock = Arc::new(ManualClock::default());
        let tokens = service(clock.clone());
        let pair = tokens.issue_pair(&account()).unwrap();

        let mut tampered = pair.access_token.clone();
        tampered.push('x');
        assert_eq!(
            tokens.verify(&tampered, TokenKind::Access),
            Err(DomainError::TokenInvalid)
        );
        assert_eq!(
            tokens.verify("not-a-jwt", TokenKind::Access),
            Err(DomainError::TokenInvalid)
        );

        let other = TokenService::new(
            TokenSettings {
                secret: "a-completely-different-secret-value!!".into(),
                ..settings()
            },
            clock,
        )
        .unwrap();
        assert_eq!(
            other.verify(&pair.access_token, TokenKind::Access),
            Err(DomainError::TokenInvalid)
        );
    }
}
