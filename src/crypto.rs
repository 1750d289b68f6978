//! Cryptogragic logics.

use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::{Argon2, Params, Version};
use rand::Rng;
use rand::rngs::OsRng;

use crate::config::Argon2 as ArgonConfig;
use crate::error::ServerError;
use crate::ports::CodeGenerator;
use crate::verification::CODE_RANGE;

type Result<T> = std::result::Result<T, CryptoError>;

#[derive(thiserror::Error, Debug)]
pub enum CryptoError {
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("password does not match")]
    Mismatch,
}

impl From<CryptoError> for ServerError {
    fn from(err: CryptoError) -> Self {
        ServerError::Internal {
            details: "password hashing failed".into(),
            source: Some(Box::new(err)),
        }
    }
}

/// Argon2id password hashing.
pub struct PasswordManager {
    params: Params,
}

impl PasswordManager {
    /// Create a new [`PasswordManager`].
    pub fn new(config: Option<ArgonConfig>) -> Result<Self> {
        let config = config.unwrap_or_default();

        let params = Params::new(
            config.memory_cost,
            config.iterations,
            config.parallelism,
            Some(config.hash_length),
        )
        .map_err(|err| CryptoError::Argon2(err.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'_> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            Version::V0x13,
            self.params.clone(),
        )
    }

    /// Hash password using Argon2id, output is a PHC string.
    pub fn hash_password(&self, password: impl AsRef<[u8]>) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_ref(), &salt)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        Ok(hash.to_string())
    }

    /// Verify password against a PHC.
    /// Parameters are read from the PHC, not from the current configuration.
    pub fn verify_password(
        &self,
        password: impl AsRef<[u8]>,
        phc_hash: &str,
    ) -> Result<()> {
        let hash = PasswordHash::new(phc_hash)
            .map_err(|e| CryptoError::Argon2(e.to_string()))?;

        self.argon2()
            .verify_password(password.as_ref(), &hash)
            .map_err(|_| CryptoError::Mismatch)
    }
}

/// One-time codes drawn from the operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsCodeGenerator;

impl CodeGenerator for OsCodeGenerator {
    fn next(&self) -> u32 {
        OsRng.gen_range(CODE_RANGE)
    }
}
