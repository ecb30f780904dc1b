use application::{PasswordHasher, PasswordHasherError};
use async_trait::async_trait;
use bcrypt::{hash, verify, DEFAULT_COST};
use domain::PasswordHash;

/// bcrypt 计算放到阻塞线程池里执行
#[derive(Debug, Clone)]
pub struct BcryptPasswordHasher {
    cost: u32,
}

impl BcryptPasswordHasher {
    pub fn new(cost: Option<u32>) -> Self {
        Self {
            cost: cost.unwrap_or(DEFAULT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

#[async_trait]
impl PasswordHasher for BcryptPasswordHasher {
    async fn hash(&self, plaintext: &str) -> Result<PasswordHash, PasswordHasherError> {
        let cost = self.cost;
        let plaintext = plaintext.to_owned();
        let hashed = tokio::task::spawn_blocking(move || hash(plaintext, cost))
            .await
            .map_err(|err| PasswordHasherError::unavailable(err.to_string()))?
            .map_err(|err| PasswordHasherError::hash_error(err.to_string()))?;

        PasswordHash::new(hashed).map_err(|err| PasswordHasherError::hash_error(err.to_string()))
    }

    async fn verify(
        &self,
        plaintext: &str,
        hashed: &PasswordHash,
    ) -> Result<bool, PasswordHasherError> {
        let plaintext = plaintext.to_owned();
        let hashed = hashed.as_str().to_owned();
        tokio::task::spawn_blocking(move || verify(plaintext, &hashed))
            .await
            .map_err(|err| PasswordHasherError::unavailable(err.to_string()))?
            .map_err(|err| PasswordHasherError::verify_error(err.to_string()))
    }
}

impl Default for BcryptPasswordHasher {
    fn default() -> Self {
        Self::new(Some(DEFAULT_COST))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_verify() {
        // 最低 cost，测试里足够快
        let hasher = BcryptPasswordHasher::new(Some(4));
        let hashed = hasher.hash("Abcdef1!").await.unwrap();
        assert_ne!(hashed.as_str(), "Abcdef1!");
        assert!(hasher.verify("Abcdef1!", &hashed).await.unwrap());
        assert!(!hasher.verify("abcdef1!", &hashed).await.unwrap());
    }

    #[tokio::test]
    async fn hashes_carry_the_configured_cost() {
        let hasher = BcryptPasswordHasher::new(Some(5));
        assert_eq!(hasher.cost(), 5);
        let hashed = hasher.hash("Abcdef1!").await.unwrap();
        assert!(hashed.as_str().starts_with("$2b$05$"));

        assert_eq!(BcryptPasswordHasher::new(None).cost(), DEFAULT_COST);
    }

    #[tokio::test]
    async fn corrupt_hash_is_an_error() {
        let hasher = BcryptPasswordHasher::new(Some(4));
        let corrupt = PasswordHash::new("not-a-bcrypt-hash").unwrap();
        assert!(matches!(
            hasher.verify("Abcdef1!", &corrupt).await,
            Err(PasswordHasherError::Verify(_))
        ));
    }
}
