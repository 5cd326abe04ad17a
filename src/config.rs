//! Runtime configuration read from the environment (and `.env` via dotenvy).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_DATA_PATH: &str = "fablab_data";
const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_path: String,
    pub secret_key: String,
    pub algorithm: Algorithm,
    pub token_ttl_minutes: i64,
    pub bcrypt_cost: u32,
    pub log_dir: Option<PathBuf>,
    pub seed_file: Option<PathBuf>,
    /// `.env` file that was loaded, if any. Logged once tracing is up.
    pub env_file: Option<PathBuf>,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_file = dotenvy::dotenv().ok();
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.env_file = env_file;
        Ok(config)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = parse("FABLAB_BIND_ADDR", get("FABLAB_BIND_ADDR"), DEFAULT_BIND_ADDR)?;
        let data_path = get("FABLAB_DATA_PATH").unwrap_or_else(|| DEFAULT_DATA_PATH.to_string());
        let secret_key = get("MY_SECRET_KEY").ok_or(ConfigError::Missing("MY_SECRET_KEY"))?;

        let algorithm_name = get("ALGORITHME").unwrap_or_else(|| "HS256".to_string());
        let algorithm = Algorithm::from_str(&algorithm_name).map_err(|e| ConfigError::Invalid {
            key: "ALGORITHME",
            reason: e.to_string(),
        })?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(ConfigError::Invalid {
                key: "ALGORITHME",
                reason: format!("{algorithm_name} needs a key pair; only HS256, HS384 and HS512 use a shared secret"),
            });
        }

        let token_ttl_minutes: i64 = match get("TOKEN_TTL_MINUTES") {
            Some(raw) => parse("TOKEN_TTL_MINUTES", Some(raw), "")?,
            None => DEFAULT_TOKEN_TTL_MINUTES,
        };
        if token_ttl_minutes < 1 {
            return Err(ConfigError::Invalid {
                key: "TOKEN_TTL_MINUTES",
                reason: "must be at least 1".to_string(),
            });
        }

        let bcrypt_cost: u32 = match get("BCRYPT_COST") {
            Some(raw) => parse("BCRYPT_COST", Some(raw), "")?,
            None => bcrypt::DEFAULT_COST,
        };
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                reason: "must be between 4 and 31".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            data_path,
            secret_key,
            algorithm,
            token_ttl_minutes,
            bcrypt_cost,
            log_dir: get("FABLAB_LOG_DIR").map(PathBuf::from),
            seed_file: get("FABLAB_SEED_FILE").map(PathBuf::from),
            env_file: None,
        })
    }
}

fn parse<T>(key: &'static str, raw: Option<String>, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = raw.unwrap_or_else(|| default.to_string());
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: format!("{raw:?}: {e}"),
    })
}
