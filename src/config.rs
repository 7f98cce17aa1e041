use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_LEGACY_SERVICES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Web Server
    pub web_host: String,
    pub web_port: u16,

    // Outbound HTTP
    pub http_timeout: Duration,

    // Resolver Cache
    pub cache_capacity: u64,
    pub cache_ttl: Duration,
    pub not_found_ttl: Duration,

    // Services
    pub flickr_api_key: String,

    // Legacy Interoperation
    pub legacy_api_url: Option<String>,
    pub legacy_service_allowlist: BTreeSet<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is present but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8080)?,

            // Outbound HTTP
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 30)?),

            // Resolver Cache
            cache_capacity: parse_env_u64("CACHE_CAPACITY", 10_000)?,
            cache_ttl: Duration::from_secs(parse_env_u64("CACHE_TTL_SECS", 600)?),
            not_found_ttl: Duration::from_secs(parse_env_u64("NOT_FOUND_TTL_SECS", 300)?),

            // Services
            flickr_api_key: env_or_default("FLICKR_API_KEY", ""),

            // Legacy Interoperation
            legacy_api_url: optional_env("LEGACY_API_URL"),
            legacy_service_allowlist: optional_env("LEGACY_SERVICE_ALLOWLIST")
                .map_or_else(default_allowlist, |v| parse_list(&v)),
        })
    }

    /// Configuration with defaults suitable for tests. No legacy instance is
    /// configured.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            http_timeout: Duration::from_secs(5),
            cache_capacity: 1_000,
            cache_ttl: Duration::from_secs(60),
            not_found_ttl: Duration::from_secs(60),
            flickr_api_key: "test-key".to_string(),
            legacy_api_url: None,
            legacy_service_allowlist: default_allowlist(),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                name: "CACHE_CAPACITY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.http_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "HTTP_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(legacy) = &self.legacy_api_url {
            if url::Url::parse(legacy).is_err() {
                return Err(ConfigError::InvalidValue {
                    name: "LEGACY_API_URL".to_string(),
                    message: format!("'{legacy}' is not an absolute URL"),
                });
            }
        }
        Ok(())
    }
}

fn default_allowlist() -> BTreeSet<String> {
    DEFAULT_LEGACY_SERVICES
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn parse_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
