//! Kiosk settings.
//!
//! Defaults are overridden by environment variables, which the CLI in turn
//! overrides with flags:
//!
//! | Variable | Setting | Default |
//! |----------|---------|---------|
//! | `RACION_DATABASE` | SQLite file path | `racion.db` |
//! | `RACION_MATCH_THRESHOLD` | identification threshold (0-100) | `60` |
//! | `RACION_CAPTURE_TIMEOUT_MS` | enrollment capture timeout | `3000` |
//! | `RACION_COOLDOWN_MS` | pause after each finger read | `2000` |

use crate::error::{KioskError, Result};
use racion_core::ServiceSchedule;
use racion_core::constants::{
    DEFAULT_CAPTURE_TIMEOUT_MS, DEFAULT_COOLDOWN_MS, DEFAULT_MATCH_THRESHOLD,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECENT_LIMIT,
};
use racion_hardware::WorkerConfig;
use racion_storage::DatabaseConfig;
use std::time::Duration;

pub const ENV_DATABASE: &str = "RACION_DATABASE";
pub const ENV_MATCH_THRESHOLD: &str = "RACION_MATCH_THRESHOLD";
pub const ENV_CAPTURE_TIMEOUT_MS: &str = "RACION_CAPTURE_TIMEOUT_MS";
pub const ENV_COOLDOWN_MS: &str = "RACION_COOLDOWN_MS";

/// Capture slice of the idle loop; commands are read between slices.
const DEFAULT_SCAN_TIMEOUT_MS: u64 = 500;

/// Runtime settings for one kiosk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KioskSettings {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Minimum score for an identification to count
    pub match_threshold: i32,

    /// Timeout of the enrollment capture
    pub capture_timeout: Duration,

    /// Timeout of each idle-loop capture
    pub scan_timeout: Duration,

    /// Pause after a ticket or no-match so the same finger is not read twice
    pub cooldown: Duration,

    /// Sensor poll interval while waiting for a finger
    pub poll_interval: Duration,

    /// Rows returned by `get_recent`
    pub recent_limit: i64,

    pub schedule: ServiceSchedule,
}

impl Default for KioskSettings {
    fn default() -> Self {
        Self {
            database_path: "racion.db".to_string(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            capture_timeout: Duration::from_millis(DEFAULT_CAPTURE_TIMEOUT_MS),
            scan_timeout: Duration::from_millis(DEFAULT_SCAN_TIMEOUT_MS),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            recent_limit: DEFAULT_RECENT_LIMIT,
            schedule: ServiceSchedule::default(),
        }
    }
}

impl KioskSettings {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(path) = lookup(ENV_DATABASE) {
            if path.trim().is_empty() {
                return Err(KioskError::settings(ENV_DATABASE, "empty path"));
            }
            settings.database_path = path;
        }
        if let Some(raw) = lookup(ENV_MATCH_THRESHOLD) {
            settings = settings.match_threshold(parse_threshold(&raw)?);
        }
        if let Some(raw) = lookup(ENV_CAPTURE_TIMEOUT_MS) {
            settings.capture_timeout = parse_millis(ENV_CAPTURE_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_COOLDOWN_MS) {
            settings.cooldown = parse_millis(ENV_COOLDOWN_MS, &raw)?;
        }

        Ok(settings)
    }

    /// Set the database path.
    pub fn database_path(mut self, path: impl Into<String>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the identification threshold.
    pub fn match_threshold(mut self, threshold: i32) -> Self {
        self.match_threshold = threshold;
        self
    }

    /// Set the enrollment capture timeout.
    pub fn capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout = timeout;
        self
    }

    /// Set the idle-loop capture timeout.
    pub fn scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the sensor poll interval.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the post-read cooldown.
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Set the service schedule.
    pub fn schedule(mut self, schedule: ServiceSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    /// Database configuration for these settings.
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database_path.clone())
    }

    /// Device worker configuration for these settings.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
            .poll_interval(self.poll_interval)
            .capture_timeout(self.capture_timeout)
    }
}

fn parse_threshold(raw: &str) -> Result<i32> {
    let threshold: i32 = raw
        .trim()
        .parse()
        .map_err(|e| KioskError::settings(ENV_MATCH_THRESHOLD, format!("{raw:?}: {e}")))?;
    if !(0..=100).contains(&threshold) {
        return Err(KioskError::settings(
            ENV_MATCH_THRESHOLD,
            format!("{threshold} is outside 0..=100"),
        ));
    }
    Ok(threshold)
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| KioskError::settings(key, format!("{raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = KioskSettings::default();
        assert_eq!(settings.database_path, "racion.db");
        assert_eq!(settings.match_threshold, 60);
        assert_eq!(settings.capture_timeout, Duration::from_millis(3000));
        assert_eq!(settings.cooldown, Duration::from_millis(2000));
        assert_eq!(settings.recent_limit, 100);

        let worker = settings.worker_config();
        assert_eq!(worker.poll_interval, Duration::from_millis(100));
        assert_eq!(worker.capture_timeout, Duration::from_millis(3000));
    }

    #[test]
    fn test_environment_overrides() {
        let settings = KioskSettings::from_lookup(lookup(&[
            (ENV_DATABASE, "/var/lib/racion/kiosk.db"),
            (ENV_MATCH_THRESHOLD, "75"),
            (ENV_CAPTURE_TIMEOUT_MS, "5000"),
            (ENV_COOLDOWN_MS, " 1500 "),
        ]))
        .unwrap();

        assert_eq!(settings.database_path, "/var/lib/racion/kiosk.db");
        assert_eq!(settings.match_threshold, 75);
        assert_eq!(settings.capture_timeout, Duration::from_millis(5000));
        assert_eq!(settings.cooldown, Duration::from_millis(1500));
        assert_eq!(settings.database_config().database_path, "/var/lib/racion/kiosk.db");
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let settings = KioskSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, KioskSettings::default());
    }

    #[rstest]
    #[case(ENV_MATCH_THRESHOLD, "high")]
    #[case(ENV_MATCH_THRESHOLD, "101")]
    #[case(ENV_MATCH_THRESHOLD, "-1")]
    #[case(ENV_CAPTURE_TIMEOUT_MS, "3s")]
    #[case(ENV_COOLDOWN_MS, "-5")]
    #[case(ENV_DATABASE, "  ")]
    fn test_invalid_values_rejected(#[case] key: &str, #[case] value: &str) {
        let err = KioskSettings::from_lookup(lookup(&[(key, value)])).unwrap_err();
        assert!(
            matches!(err, KioskError::Settings { key: ref k, .. } if k == key),
            "{err}"
        );
    }
}
