//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tether_engine::{Backoff, RetryPolicy, SyncConfig};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the authority, e.g. `http://localhost:3000`
    pub remote_url: String,
    /// Location of the durable store document
    pub data_path: PathBuf,
    /// Bearer token forwarded to the authority
    pub auth_token: Option<String>,
    /// Per-request timeout for the HTTP remote
    pub request_timeout: Duration,
    /// Queue tunables
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let remote_url = lookup("TETHER_REMOTE_URL").ok_or(ConfigError::MissingRemoteUrl)?;

        let data_path = lookup("TETHER_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("tether-data.json"));

        let auth_token = lookup("TETHER_AUTH_TOKEN").filter(|t| !t.is_empty());

        let defaults = SyncConfig::default();
        let backoff = Backoff::new(
            parse(&lookup, "TETHER_BACKOFF_BASE_MS", defaults.backoff.base_ms)?,
            parse(&lookup, "TETHER_BACKOFF_CAP_MS", defaults.backoff.cap_ms)?,
            parse(&lookup, "TETHER_BACKOFF_JITTER_MS", defaults.backoff.jitter_ms)?,
        );

        let retry_policy = match lookup("TETHER_RETRY_POLICY").as_deref() {
            None | Some("uniform") => RetryPolicy::Uniform,
            Some("classified") => RetryPolicy::Classified,
            Some(_) => return Err(ConfigError::Invalid("TETHER_RETRY_POLICY")),
        };

        let sync = SyncConfig::default()
            .with_max_attempts(parse(&lookup, "TETHER_MAX_ATTEMPTS", defaults.max_attempts)?)
            .with_backoff(backoff)
            .with_display_limit(parse(&lookup, "TETHER_DISPLAY_LIMIT", defaults.display_limit)?)
            .with_retry_policy(retry_policy);
        sync.validate()?;

        let timeout_ms = parse(&lookup, "TETHER_REQUEST_TIMEOUT_MS", 10_000u64)?;

        Ok(Self {
            remote_url,
            data_path,
            auth_token,
            request_timeout: Duration::from_millis(timeout_ms),
            sync,
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("TETHER_REMOTE_URL environment variable is required")]
    MissingRemoteUrl,

    #[error("Invalid {0} value")]
    Invalid(&'static str),

    #[error(transparent)]
    Engine(#[from] tether_engine::Error),
}
