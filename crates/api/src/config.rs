//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use kacaf_auth::Principal;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KACAF_BIND_ADDR '{value}' is not a socket address")]
    InvalidBindAddr { value: String },

    #[error("failed to read principals file {path}: {source}")]
    ReadPrincipals {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse principals file {path}: {source}")]
    ParsePrincipals {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// JSON array of principals seeding the account store.
    pub principals_file: Option<PathBuf>,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_addr = lookup("KACAF_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr { value: raw_addr.clone() })?;

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let principals_file = lookup("KACAF_PRINCIPALS_FILE")
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            bind_addr,
            jwt_secret,
            principals_file,
        })
    }

    /// Seed accounts, or none when no file is configured.
    pub fn load_principals(&self) -> Result<Vec<Principal>, ConfigError> {
        let Some(path) = &self.principals_file else {
            return Ok(Vec::new());
        };

        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadPrincipals {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| ConfigError::ParsePrincipals {
            path: path.clone(),
            source,
        })
    }
}
