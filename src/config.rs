use std::time::Duration;

use crate::{ConfigError, RetryPolicy};

const BASE_URL_VAR: &str = "API_BASE_URL";
const TIMEOUT_VAR: &str = "API_TIMEOUT_MS";
const RETRY_COUNT_VAR: &str = "API_RETRY_COUNT";
const RETRY_DELAY_VAR: &str = "API_RETRY_DELAY_MS";

/// Settings for [`ApiClient`](crate::ApiClient).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ApiConfig {
    /// Prefix joined with every endpoint. May be empty.
    pub base_url: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Number of retries after the initial attempt.
    pub retry_count: u32,
    /// Fixed wait between attempts.
    pub retry_delay: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: Duration::from_millis(10_000),
            retry_count: 3,
            retry_delay: Duration::from_millis(1_000),
        }
    }
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Retry policy derived from this config: one initial attempt plus
    /// `retry_count` retries.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_count.saturating_add(1),
            self.retry_delay,
            self.timeout,
        )
    }

    /// Loads settings from environment variables.
    ///
    /// Reads:
    /// - `API_BASE_URL` (required)
    /// - `API_TIMEOUT_MS`, `API_RETRY_COUNT`, `API_RETRY_DELAY_MS`
    ///   (optional, defaults 10000 / 3 / 1000)
    ///
    /// Variables that are set but empty or unparsable are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ApiConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup(BASE_URL_VAR).ok_or(ConfigError::Missing(BASE_URL_VAR))?;
        if base_url.trim().is_empty() {
            return Err(ConfigError::Empty(BASE_URL_VAR));
        }

        let timeout = read_number(&lookup, TIMEOUT_VAR)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout);
        let retry_count = match read_number(&lookup, RETRY_COUNT_VAR)? {
            Some(value) => u32::try_from(value).map_err(|_| ConfigError::Invalid {
                name: RETRY_COUNT_VAR,
                value: value.to_string(),
            })?,
            None => defaults.retry_count,
        };
        let retry_delay = read_number(&lookup, RETRY_DELAY_VAR)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);

        Ok(Self {
            base_url: base_url.trim().to_owned(),
            timeout,
            retry_count,
            retry_delay,
        })
    }
}

fn read_number<F>(lookup: &F, name: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Empty(name));
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid { name, value: raw })
}
