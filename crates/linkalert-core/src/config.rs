use std::time::Duration;

use crate::error::AppError;

/// Longest bootstrap look-back accepted from configuration (about 100 years).
pub const MAX_BOOTSTRAP_DAYS: u32 = 36_500;

/// Tunables for one coordinator run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// How far back the first run looks when no checkpoint exists yet.
    pub bootstrap_days: u32,
    /// Maximum number of profiles discovered concurrently.
    pub max_concurrency: usize,
    /// Upper bound for a single profile's traffic fetch.
    pub fetch_timeout: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            bootstrap_days: 180,
            max_concurrency: 4,
            fetch_timeout: Duration::from_secs(120),
        }
    }
}

impl RunConfig {
    /// Read configuration from environment variables, falling back to defaults.
    ///
    /// - `LINKALERT_BOOTSTRAP_DAYS` (defaults to 180, at most 36 500)
    /// - `LINKALERT_MAX_CONCURRENCY` (defaults to 4, must be at least 1)
    /// - `LINKALERT_FETCH_TIMEOUT_SECS` (defaults to 120, must be at least 1)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let defaults = Self::default();

        let bootstrap_days = match lookup("LINKALERT_BOOTSTRAP_DAYS") {
            None => defaults.bootstrap_days,
            Some(raw) => {
                let days: u32 = parse_number(&raw, "LINKALERT_BOOTSTRAP_DAYS")?;
                if days > MAX_BOOTSTRAP_DAYS {
                    return Err(AppError::ConfigError(format!(
                        "LINKALERT_BOOTSTRAP_DAYS must be at most {MAX_BOOTSTRAP_DAYS}"
                    )));
                }
                days
            }
        };

        let max_concurrency = match lookup("LINKALERT_MAX_CONCURRENCY") {
            None => defaults.max_concurrency,
            Some(raw) => {
                let parsed: usize = parse_number(&raw, "LINKALERT_MAX_CONCURRENCY")?;
                if parsed == 0 {
                    return Err(AppError::ConfigError(
                        "LINKALERT_MAX_CONCURRENCY must be at least 1".into(),
                    ));
                }
                parsed
            }
        };

        let fetch_timeout = match lookup("LINKALERT_FETCH_TIMEOUT_SECS") {
            None => defaults.fetch_timeout,
            Some(raw) => {
                let secs: u64 = parse_number(&raw, "LINKALERT_FETCH_TIMEOUT_SECS")?;
                if secs == 0 {
                    return Err(AppError::ConfigError(
                        "LINKALERT_FETCH_TIMEOUT_SECS must be at least 1".into(),
                    ));
                }
                Duration::from_secs(secs)
            }
        };

        Ok(Self {
            bootstrap_days,
            max_concurrency,
            fetch_timeout,
        })
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

fn parse_number<T: std::str::FromStr>(raw: &str, key: &str) -> Result<T, AppError> {
    raw.trim().parse().map_err(|_| {
        AppError::ConfigError(format!(
            "Invalid {key} '{raw}': must be a non-negative integer"
        ))
    })
}
