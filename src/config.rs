//! Client configuration from the environment.
//!
//! | Variable           | Default                  |
//! |--------------------|--------------------------|
//! | `SMSAC_URL`        | `ws://127.0.0.1:35353/`  |
//! | `SMSAC_PROTOCOL`   | unset                    |
//! | `SMSAC_REFRESH_MS` | `33`                     |

use std::time::Duration;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::watch::DEFAULT_REFRESH_INTERVAL;

/// Default server endpoint (the memory server's default listen address).
pub const DEFAULT_URL: &str = "ws://127.0.0.1:35353/";

pub const URL_ENV: &str = "SMSAC_URL";
pub const PROTOCOL_ENV: &str = "SMSAC_PROTOCOL";
pub const REFRESH_ENV: &str = "SMSAC_REFRESH_MS";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid server URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Only plain `ws://` is supported; there is no TLS backend.
    #[error("Unsupported URL scheme {0:?} (expected \"ws\")")]
    UnsupportedScheme(String),
}

/// Settings for connecting to the memory server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub url: Url,
    pub protocol: Option<String>,
    pub refresh_interval: Duration,
}

impl ClientConfig {
    /// Build configuration from `SMSAC_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = parse_url(lookup(URL_ENV).as_deref().unwrap_or(DEFAULT_URL))?;

        let protocol = lookup(PROTOCOL_ENV).filter(|p| !p.trim().is_empty());

        let refresh_interval = match lookup(REFRESH_ENV) {
            None => DEFAULT_REFRESH_INTERVAL,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    warn!(
                        "Ignoring {}={:?}; using {}ms",
                        REFRESH_ENV,
                        raw,
                        DEFAULT_REFRESH_INTERVAL.as_millis()
                    );
                    DEFAULT_REFRESH_INTERVAL
                }
            },
        };

        Ok(Self {
            url,
            protocol,
            refresh_interval,
        })
    }
}

/// Parse and validate a server URL.
pub fn parse_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl {
        url: raw.to_string(),
        source,
    })?;
    if url.scheme() != "ws" {
        return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
    }
    Ok(url)
}
