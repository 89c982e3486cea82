use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    pub base_url: Url,
    pub symbols: Vec<String>,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySettings {
    /// Upper bound for a single delivery attempt.
    pub timeout: Duration,
    /// Extra attempts for transient failures; 0 removes on first failure.
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Deliveries in flight at once within one broadcast.
    pub concurrency: usize,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            retry_backoff: Duration::from_millis(500),
            concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    pub shutdown_timeout: Duration,
    pub delivery: DeliverySettings,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
            delivery: DeliverySettings::default(),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct Config {
    pub telegram_token: String,
    pub feed: FeedSettings,
    pub scan_interval: Duration,
    pub lifecycle: LifecycleSettings,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("telegram_token", &"<redacted>")
            .field("feed", &self.feed)
            .field("scan_interval", &self.scan_interval)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let telegram_token = required(&lookup, "TELEGRAM_BOT_TOKEN")?;

        let raw_url = required(&lookup, "SIGNAL_FEED_URL")?;
        let base_url = Url::parse(&raw_url).map_err(|e| ConfigError::Invalid {
            key: "SIGNAL_FEED_URL",
            value: raw_url.clone(),
            reason: e.to_string(),
        })?;

        let symbols: Vec<String> = lookup("SIGNAL_SYMBOLS")
            .unwrap_or_else(|| "XAUUSD,EURUSD,GBPUSD".to_string())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(ConfigError::Invalid {
                key: "SIGNAL_SYMBOLS",
                value: String::new(),
                reason: "at least one symbol is required".to_string(),
            });
        }

        let delivery = DeliverySettings {
            timeout: Duration::from_secs(positive(&lookup, "DELIVERY_TIMEOUT_SECS", 10)?),
            max_retries: parsed(&lookup, "DELIVERY_MAX_RETRIES", 0)?,
            retry_backoff: Duration::from_millis(parsed(&lookup, "DELIVERY_RETRY_BACKOFF_MS", 500)?),
            concurrency: positive(&lookup, "DELIVERY_CONCURRENCY", 8)?,
        };

        Ok(Self {
            telegram_token,
            feed: FeedSettings {
                base_url,
                symbols,
                request_timeout: Duration::from_secs(positive(&lookup, "FEED_TIMEOUT_SECS", 10)?),
            },
            scan_interval: Duration::from_secs(positive(&lookup, "SCAN_INTERVAL_SECS", 300)?),
            lifecycle: LifecycleSettings {
                shutdown_timeout: Duration::from_secs(positive(&lookup, "SHUTDOWN_TIMEOUT_SECS", 10)?),
                delivery,
            },
        })
    }
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parsed<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}

fn positive<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let value = parsed(lookup, key, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}
