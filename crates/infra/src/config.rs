//! Engine configuration, read from the process environment.

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;

pub const GRANT_CACHE_TTL_SECS: &str = "INSPECTRA_GRANT_CACHE_TTL_SECS";
pub const GRANT_CACHE_CAPACITY: &str = "INSPECTRA_GRANT_CACHE_CAPACITY";
pub const SITE_CACHE_TTL_SECS: &str = "INSPECTRA_SITE_CACHE_TTL_SECS";
pub const BOOTSTRAP_ADMINS: &str = "INSPECTRA_BOOTSTRAP_ADMINS";
pub const DATABASE_URL: &str = "DATABASE_URL";
pub const REDIS_URL: &str = "REDIS_URL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    pub grant_cache_ttl: Duration,
    pub grant_cache_capacity: u64,
    pub site_cache_ttl: Duration,
    /// Lowercased emails allowed to self-escalate when they hold no grant.
    pub bootstrap_admins: HashSet<String>,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            grant_cache_ttl: Duration::from_secs(300),
            grant_cache_capacity: 10_000,
            site_cache_ttl: Duration::from_secs(3_600),
            bootstrap_admins: HashSet::new(),
            database_url: None,
            redis_url: None,
        }
    }
}

impl AccessConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let grant_cache_ttl = match get(GRANT_CACHE_TTL_SECS) {
            Some(raw) => Duration::from_secs(parse_u64(GRANT_CACHE_TTL_SECS, &raw)?),
            None => defaults.grant_cache_ttl,
        };
        let grant_cache_capacity = match get(GRANT_CACHE_CAPACITY) {
            Some(raw) => parse_u64(GRANT_CACHE_CAPACITY, &raw)?,
            None => defaults.grant_cache_capacity,
        };
        let site_cache_ttl = match get(SITE_CACHE_TTL_SECS) {
            Some(raw) => Duration::from_secs(parse_u64(SITE_CACHE_TTL_SECS, &raw)?),
            None => defaults.site_cache_ttl,
        };

        let bootstrap_admins = get(BOOTSTRAP_ADMINS)
            .map(|raw| {
                raw.split(',')
                    .map(|email| email.trim().to_lowercase())
                    .filter(|email| !email.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            grant_cache_ttl,
            grant_cache_capacity,
            site_cache_ttl,
            bootstrap_admins,
            database_url: get(DATABASE_URL),
            redis_url: get(REDIS_URL),
        })
    }
}

fn parse_u64(key: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
        key,
        message: format!("'{raw}': {e}"),
    })
}
