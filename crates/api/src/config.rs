//! Server configuration, read from the environment.
//!
//! A `.env` file in the working directory is loaded first when present;
//! variables already set in the process environment win.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use quickdrop_core::Money;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Flat fee added to every order at checkout.
    pub delivery_fee: Money,
    /// Limit for wallets opened without an explicit one.
    pub default_wallet_limit: Money,
    /// Local directory for uploads; `None` keeps them in memory.
    pub storage_dir: Option<PathBuf>,
    /// Base of the URLs handed out for uploads; this server answers on `/files`.
    pub storage_public_url: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            delivery_fee: Money::from_minor(500),
            default_wallet_limit: Money::from_minor(50_000),
            storage_dir: None,
            storage_public_url: "http://localhost:8080/files".to_string(),
            use_persistent_stores: false,
            database_url: None,
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(v) => parse("BIND_ADDR", &v)?,
            None => defaults.bind_addr,
        };

        let jwt_secret = get("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            defaults.jwt_secret.clone()
        });

        let delivery_fee = match get("DELIVERY_FEE") {
            Some(v) => Money::from_minor(parse("DELIVERY_FEE", &v)?),
            None => defaults.delivery_fee,
        };
        let default_wallet_limit = match get("DEFAULT_WALLET_LIMIT") {
            Some(v) => Money::from_minor(parse("DEFAULT_WALLET_LIMIT", &v)?),
            None => defaults.default_wallet_limit,
        };

        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            Some(v) => parse("USE_PERSISTENT_STORES", &v.to_ascii_lowercase())?,
            None => false,
        };
        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(Self {
            bind_addr,
            jwt_secret,
            delivery_fee,
            default_wallet_limit,
            storage_dir: get("STORAGE_DIR").map(PathBuf::from),
            storage_public_url: get("STORAGE_PUBLIC_URL").unwrap_or(defaults.storage_public_url),
            use_persistent_stores,
            database_url,
        })
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
