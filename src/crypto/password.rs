use argon2::{
    Algorithm, Argon2, Params, ParamsBuilder, Version,
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use zeroize::Zeroizing;

use crate::config::Config;
use crate::crypto::token;
use crate::error::{AppError, Result};

/// Result of checking a plaintext against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// The plaintext produced the stored hash.
    Match,
    /// The plaintext did not produce the stored hash.
    Mismatch,
    /// The stored value is not a hash this hasher understands.
    Malformed,
}

/// Argon2id password hasher whose cost comes from configuration.
///
/// Hashes embed their own parameters, so raising the cost only affects new
/// hashes; existing ones keep verifying with the cost they were made with.
#[derive(Clone)]
pub struct CredentialHasher {
    params: Params,
}

impl std::fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .field("p_cost", &self.params.p_cost())
            .finish()
    }
}

impl CredentialHasher {
    /// Creates a hasher with explicit Argon2 costs.
    ///
    /// # Arguments
    ///
    /// * `memory_kib` - Memory cost in KiB.
    /// * `iterations` - Number of passes.
    /// * `parallelism` - Number of lanes.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self> {
        let params = ParamsBuilder::new()
            .m_cost(memory_kib)
            .t_cost(iterations)
            .p_cost(parallelism)
            .build()
            .map_err(|e| AppError::Hashing(format!("Argon2 params: {}", e)))?;
        Ok(Self { params })
    }

    /// Creates a hasher from the configured cost factor.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.hash_memory_kib,
            config.hash_iterations,
            config.hash_parallelism,
        )
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a password using Argon2id with a fresh random salt.
    ///
    /// # Returns
    ///
    /// A `Result` containing the PHC-formatted hash string.
    pub fn hash(&self, password: &str) -> Result<String> {
        let password_bytes = Zeroizing::new(password.as_bytes().to_vec());

        let salt_bytes = token::generate_array::<16>();
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AppError::Hashing(format!("Salt encoding error: {}", e)))?;

        let password_hash = self
            .argon2()
            .hash_password(&password_bytes, &salt)
            .map_err(|e| AppError::Hashing(format!("Argon2 hash error: {}", e)))?
            .to_string();

        tracing::debug!("Password hashed successfully with Argon2");
        Ok(password_hash)
    }

    /// Verifies a password against a stored hash.
    ///
    /// The comparison inside `argon2` is constant-time, so the time taken does
    /// not depend on where the computed and stored digests diverge.
    pub fn verify(&self, password: &str, hash: &str) -> Verification {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Stored password hash could not be parsed: {}", e);
                return Verification::Malformed;
            }
        };

        let password_bytes = Zeroizing::new(password.as_bytes().to_vec());
        match self.argon2().verify_password(&password_bytes, &parsed_hash) {
            Ok(()) => Verification::Match,
            Err(password_hash::Error::Password) => Verification::Mismatch,
            Err(e) => {
                tracing::warn!("Stored password hash is unusable: {}", e);
                Verification::Malformed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> CredentialHasher {
        CredentialHasher::new(1024, 1, 1).unwrap()
    }

    #[test]
    fn hash_then_verify_matches() {
        let hasher = fast_hasher();
        let hash = hasher.hash("correct horse battery staple").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert_eq!(
            hasher.verify("correct horse battery staple", &hash),
            Verification::Match
        );
    }

    #[test]
    fn one_character_difference_mismatches() {
        let hasher = fast_hasher();
        let hash = hasher.hash("hunter22").unwrap();
        for candidate in ["hunter23", "Hunter22", "hunter2", "hunter222", ""] {
            assert_eq!(hasher.verify(candidate, &hash), Verification::Mismatch);
        }
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = fast_hasher();
        let first = hasher.hash("same password").unwrap();
        let second = hasher.hash("same password").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn garbage_hash_is_malformed() {
        let hasher = fast_hasher();
        assert_eq!(hasher.verify("pw", "not-a-hash"), Verification::Malformed);
        assert_eq!(hasher.verify("pw", ""), Verification::Malformed);
    }

    #[test]
    fn verifies_hashes_made_with_other_costs() {
        let old = CredentialHasher::new(2048, 2, 1).unwrap();
        let hash = old.hash("legacy").unwrap();
        assert_eq!(fast_hasher().verify("legacy", &hash), Verification::Match);
    }

    #[test]
    fn rejects_invalid_cost() {
        assert!(CredentialHasher::new(1024, 0, 1).is_err());
    }
}
