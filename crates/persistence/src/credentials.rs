//! Credential hashing and verification.
//!
//! Passwords are stored as bcrypt hashes with a per-hash random salt. Older
//! tenant databases may still hold plaintext values, so [`CredentialHasher::verify`]
//! falls back to a constant-time comparison when the stored value carries no
//! recognized hash prefix. Such comparisons are logged at `warn`.
//!
//! bcrypt is deliberately slow; the `*_blocking` variants run it on the
//! blocking thread pool so async callers do not stall their executor.

use tracing::warn;

use crate::config::DEFAULT_HASH_COST;
use crate::error::CredentialError;

/// Prefixes of the bcrypt variants accepted by [`CredentialHasher::verify`].
pub const HASH_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

/// Hashes and verifies credential values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialHasher {
    cost: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_COST)
    }
}

impl CredentialHasher {
    /// Creates a hasher with the given bcrypt cost.
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// The bcrypt cost.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Returns true if `value` looks like a hash this hasher can verify.
    pub fn is_hashed(value: &str) -> bool {
        HASH_PREFIXES.iter().any(|prefix| value.starts_with(prefix))
    }

    /// Hashes `plaintext` with a fresh salt.
    pub fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        Ok(bcrypt::hash(plaintext, self.cost)?)
    }

    /// Checks `plaintext` against a stored value.
    ///
    /// # Examples
    ///
    /// ```
    /// use formgate_persistence::CredentialHasher;
    ///
    /// let hasher = CredentialHasher::new(4);
    /// let stored = hasher.hash("secret123").unwrap();
    /// assert!(hasher.verify("secret123", &stored).unwrap());
    ///
    /// // Unhashed legacy value
    /// assert!(hasher.verify("plain", "plain").unwrap());
    /// ```
    pub fn verify(&self, plaintext: &str, stored: &str) -> Result<bool, CredentialError> {
        if Self::is_hashed(stored) {
            return Ok(bcrypt::verify(plaintext, stored)?);
        }
        warn!("Comparing against an unhashed legacy credential");
        Ok(constant_time_eq(plaintext.as_bytes(), stored.as_bytes()))
    }

    /// [`hash`](Self::hash) on the blocking thread pool.
    pub async fn hash_blocking(&self, plaintext: String) -> Result<String, CredentialError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| CredentialError::Task {
                message: format!("Task join error: {}", e),
            })?
    }

    /// [`verify`](Self::verify) on the blocking thread pool.
    pub async fn verify_blocking(
        &self,
        plaintext: String,
        stored: String,
    ) -> Result<bool, CredentialError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &stored))
            .await
            .map_err(|e| CredentialError::Task {
                message: format!("Task join error: {}", e),
            })?
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> CredentialHasher {
        CredentialHasher::new(4)
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let hashed = hasher().hash("secret123").unwrap();
        assert_ne!(hashed, "secret123");
        assert!(CredentialHasher::is_hashed(&hashed));
        assert!(hasher().verify("secret123", &hashed).unwrap());
        assert!(!hasher().verify("secret124", &hashed).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        let first = hasher().hash("secret123").unwrap();
        let second = hasher().hash("secret123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_legacy_plaintext() {
        assert!(hasher().verify("plain", "plain").unwrap());
        assert!(!hasher().verify("plain", "plainer").unwrap());
        assert!(!hasher().verify("", "plain").unwrap());
    }

    #[test]
    fn test_recognized_prefixes() {
        assert!(CredentialHasher::is_hashed("$2y$10$abcdefghijklmnopqrstuv"));
        assert!(!CredentialHasher::is_hashed("$argon2id$v=19$"));
        assert!(!CredentialHasher::is_hashed("pw1"));
    }

    #[test]
    fn test_invalid_cost_is_an_error() {
        assert!(CredentialHasher::new(2).hash("x").is_err());
    }

    #[tokio::test]
    async fn test_blocking_variants() {
        let hasher = hasher();
        let hashed = hasher.hash_blocking("pw1".to_string()).await.unwrap();
        assert!(hasher
            .verify_blocking("pw1".to_string(), hashed)
            .await
            .unwrap());
    }
}
