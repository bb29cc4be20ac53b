//! Runtime configuration.
//!
//! Flags fall back to environment variables, which `main` may load from a
//! `.env` file first.

use crate::auth::password::{HashAlgorithm, KdfParams};
use anyhow::{ensure, Result};
use clap::Parser;
use std::time::Duration;

/// Development fallback for `JWT_SECRET`.
pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production-minimum-32-characters";

#[derive(Debug, Clone, Parser)]
#[command(name = "conduit-auth", about = "Conduit authentication and session service")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind: String,

    /// SQLite database file
    #[arg(long, env = "AUTH_DB_PATH", default_value = "conduit_auth.db")]
    pub db_path: String,

    /// HS256 signing secret
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// Token lifetime in hours
    #[arg(long, env = "TOKEN_TTL_HOURS", default_value_t = 24)]
    pub token_ttl_hours: i64,

    /// PBKDF2 PRF for new credentials (sha256 | sha512)
    #[arg(long, env = "HASH_ALGORITHM", default_value = "sha512")]
    pub hash_algorithm: HashAlgorithm,

    /// PBKDF2 iterations for new credentials
    #[arg(long, env = "HASH_ITERATIONS", default_value_t = 100_000)]
    pub hash_iterations: u32,

    /// Derived key length in bytes for new credentials
    #[arg(long, env = "HASH_LENGTH", default_value_t = 64)]
    pub hash_length: usize,

    /// Seconds between sweeps of expired sign ids (0 disables)
    #[arg(long, env = "REVOCATION_SWEEP_SECS", default_value_t = 3600)]
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.token_ttl_hours > 0, "TOKEN_TTL_HOURS must be positive");
        self.kdf_params().validate()?;
        Ok(())
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            algorithm: self.hash_algorithm,
            iterations: self.hash_iterations,
            length: self.hash_length,
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.token_ttl_hours)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}
