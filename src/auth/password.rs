//! Password Credentials
//! Mission: Salted PBKDF2 hashes that stay verifiable after the defaults move
//!
//! Every credential carries the algorithm and iteration count it was made
//! with. Raising the global defaults only affects new signups and password
//! changes; older hashes keep verifying with their own parameters.

use crate::auth::error::{AuthError, AuthResult};
use anyhow::{anyhow, ensure, Context};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha512};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Salt length in bytes.
pub const SALT_LEN: usize = 32;

/// PRF used inside PBKDF2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(format!("unsupported hash algorithm '{other}'")),
        }
    }
}

/// Key-derivation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub algorithm: HashAlgorithm,
    pub iterations: u32,
    /// Derived key length in bytes.
    pub length: usize,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: HashAlgorithm::Sha512,
            iterations: 100_000,
            length: 64,
        }
    }
}

impl KdfParams {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.iterations > 0, "hash iterations must be positive");
        ensure!(self.length > 0, "hash length must be positive");
        Ok(())
    }
}

/// Stored password verifier.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub salt: Vec<u8>,
    pub hash: Vec<u8>,
    pub algorithm: HashAlgorithm,
    pub iterations: u32,
}

impl Credential {
    /// Parameters this credential was derived with. The length comes from
    /// the stored hash itself.
    pub fn params(&self) -> KdfParams {
        KdfParams {
            algorithm: self.algorithm,
            iterations: self.iterations,
            length: self.hash.len(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("algorithm", &self.algorithm)
            .field("iterations", &self.iterations)
            .field("hash_len", &self.hash.len())
            .finish_non_exhaustive()
    }
}

/// Creates and verifies password credentials.
#[derive(Debug, Clone)]
pub struct PasswordCredentialStore {
    defaults: KdfParams,
}

impl PasswordCredentialStore {
    pub fn new(defaults: KdfParams) -> anyhow::Result<Self> {
        defaults.validate()?;
        Ok(Self { defaults })
    }

    pub fn defaults(&self) -> KdfParams {
        self.defaults
    }

    /// Hash `password` under a fresh salt with the current defaults.
    pub async fn create(&self, password: &str) -> AuthResult<Credential> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        let params = self.defaults;
        let hash = derive_blocking(password.to_owned(), salt.clone(), params).await?;

        debug!(
            algorithm = %params.algorithm,
            iterations = params.iterations,
            "Created password credential"
        );

        Ok(Credential {
            salt,
            hash,
            algorithm: params.algorithm,
            iterations: params.iterations,
        })
    }

    /// Check `password` against `stored`, using the stored parameters.
    ///
    /// A wrong password is `Ok(false)`. Errors mean the check itself could not
    /// run.
    pub async fn verify(&self, password: &str, stored: &Credential) -> AuthResult<bool> {
        let params = stored.params();
        let candidate = derive_blocking(password.to_owned(), stored.salt.clone(), params).await?;
        Ok(bool::from(candidate.ct_eq(&stored.hash)))
    }

    /// Burn one derivation with the current defaults. Used when the account
    /// does not exist so the response time matches a real check.
    pub async fn dummy_verify(&self, password: &str) -> AuthResult<()> {
        let salt = vec![0u8; SALT_LEN];
        derive_blocking(password.to_owned(), salt, self.defaults).await?;
        Ok(())
    }
}

async fn derive_blocking(
    password: String,
    salt: Vec<u8>,
    params: KdfParams,
) -> AuthResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || derive(password.as_bytes(), &salt, params))
        .await
        .context("Password hashing task failed")?
        .map_err(AuthError::from)
}

/// PBKDF2-HMAC over the chosen PRF.
pub fn derive(password: &[u8], salt: &[u8], params: KdfParams) -> anyhow::Result<Vec<u8>> {
    params
        .validate()
        .map_err(|e| anyhow!("corrupt credential parameters: {e}"))?;

    let mut out = vec![0u8; params.length];
    match params.algorithm {
        HashAlgorithm::Sha256 => {
            pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, params.iterations, &mut out)
        }
        HashAlgorithm::Sha512 => {
            pbkdf2::pbkdf2_hmac::<Sha512>(password, salt, params.iterations, &mut out)
        }
    }
    Ok(out)
}
