//! Service Configuration
//! Mission: Gather every startup knob from flags, environment and `.env`, then check it once
//!
//! Nothing here is global; `main` parses a `Config` and hands the pieces to the
//! components that need them.

use anyhow::{bail, Result};
use clap::Parser;
use std::fmt;
use std::net::SocketAddr;

use crate::auth::jwt::DEFAULT_TOKEN_TTL_MINUTES;

pub const MIN_SECRET_BYTES: usize = 32;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Parser, Clone)]
#[command(name = "assignhub")]
#[command(about = "AssignHub backend - assignments, solutions and accounts over HTTP")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "ASSIGNHUB_BIND", default_value = "0.0.0.0:8000")]
    pub bind: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "ASSIGNHUB_DB_PATH", default_value = "assignhub.db")]
    pub db_path: String,

    /// HMAC signing key for access tokens (at least 32 bytes)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Access token lifetime in minutes
    #[arg(long, env = "ACCESS_TOKEN_EXPIRE_MINUTES", default_value_t = DEFAULT_TOKEN_TTL_MINUTES)]
    pub token_ttl_minutes: i64,

    /// bcrypt work factor
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Directory for assignment attachments
    #[arg(long, env = "ASSIGNHUB_UPLOAD_DIR", default_value = "uploaded_files")]
    pub upload_dir: String,

    /// Directory for solution attachments
    #[arg(long, env = "ASSIGNHUB_SOLUTION_UPLOAD_DIR", default_value = "solution_files")]
    pub solution_upload_dir: String,

    /// Largest accepted request body, in bytes
    #[arg(long, env = "ASSIGNHUB_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < MIN_SECRET_BYTES {
            bail!(
                "JWT_SECRET must be at least {} bytes (got {})",
                MIN_SECRET_BYTES,
                self.jwt_secret.len()
            );
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31 (got {})", self.bcrypt_cost);
        }
        if self.token_ttl_minutes <= 0 {
            bail!(
                "ACCESS_TOKEN_EXPIRE_MINUTES must be positive (got {})",
                self.token_ttl_minutes
            );
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("db_path", &self.db_path)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("upload_dir", &self.upload_dir)
            .field("solution_upload_dir", &self.solution_upload_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}
