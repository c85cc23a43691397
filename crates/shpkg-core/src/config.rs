use std::collections::HashMap;
use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const LOCK_TIMEOUT_ENV: &str = "SHPKG_LOCK_TIMEOUT";
pub const LOCK_POLL_ENV: &str = "SHPKG_LOCK_POLL_MS";
pub const STAGING_MAX_AGE_ENV: &str = "SHPKG_STAGING_MAX_AGE";

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_LOCK_POLL: Duration = Duration::from_millis(250);
const DEFAULT_STAGING_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_LOCK_POLL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub(crate) lock: LockConfig,
    pub(crate) staging_max_age: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock: LockConfig::default(),
            staging_max_age: DEFAULT_STAGING_MAX_AGE,
        }
    }
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if one of the `SHPKG_*` variables is not a valid number.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            lock: LockConfig {
                timeout: parse_duration(snapshot, LOCK_TIMEOUT_ENV, Duration::from_secs)?
                    .unwrap_or(defaults.lock.timeout),
                poll_interval: parse_duration(snapshot, LOCK_POLL_ENV, Duration::from_millis)?
                    .filter(|poll| !poll.is_zero())
                    .unwrap_or(defaults.lock.poll_interval),
            },
            staging_max_age: parse_duration(snapshot, STAGING_MAX_AGE_ENV, Duration::from_secs)?
                .unwrap_or(defaults.staging_max_age),
        })
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.lock.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn lock(&self) -> &LockConfig {
        &self.lock
    }

    #[must_use]
    pub fn staging_max_age(&self) -> Duration {
        self.staging_max_age
    }
}

fn parse_duration(
    snapshot: &EnvSnapshot,
    key: &str,
    unit: fn(u64) -> Duration,
) -> Result<Option<Duration>> {
    let Some(raw) = snapshot.var(key).map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    let value: u64 = raw
        .parse()
        .with_context(|| format!("{key} must be a non-negative integer (got {raw:?})"))?;
    Ok(Some(unit(value)))
}
