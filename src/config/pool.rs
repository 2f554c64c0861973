//! Pool configuration: sizing, cadence, and budget knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Elastic pool configuration.
///
/// Read once at pool construction and never reloaded. All durations are
/// expressed in milliseconds so the structure serializes flat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Population floor; the pool starts with exactly this many workers.
    /// A floor of zero is permitted but means an idle pool can retire
    /// every worker and never grow again.
    pub min_workers: usize,
    /// Population ceiling for load-triggered fan-out.
    pub max_workers: usize,
    /// Maximum queued items before submitters block.
    pub queue_capacity: usize,
    /// Worker observation cadence in milliseconds.
    pub poll_interval_ms: u64,
    /// Cumulative usage, in milliseconds, at which a free caller is abandoned.
    pub budget_limit_ms: u64,
    /// Budget sampling cadence in milliseconds.
    pub sample_interval_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_workers: 2,
            max_workers: num_cpus::get().max(4),
            queue_capacity: 128,
            poll_interval_ms: 50,
            budget_limit_ms: 10_000,
            sample_interval_ms: 1_000,
        }
    }
}

impl PoolConfig {
    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        if self.min_workers > self.max_workers {
            return Err("min_workers must not exceed max_workers".into());
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be greater than 0".into());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".into());
        }
        if self.budget_limit_ms == 0 {
            return Err("budget_limit_ms must be greater than 0".into());
        }
        if self.sample_interval_ms == 0 {
            return Err("sample_interval_ms must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse pool configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a message describing the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load configuration from `TIDEPOOL_*` environment variables,
    /// falling back to defaults for variables that are unset.
    ///
    /// A `.env` file in the working directory is honored if present.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or the
    /// validation failure.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    /// Load configuration resolving the `TIDEPOOL_*` variable names through
    /// `lookup` instead of the process environment.
    ///
    /// [`PoolConfig::from_env`] delegates here; embedders with their own
    /// configuration source can use it directly.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or the
    /// validation failure.
    pub fn from_env_with<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let cfg = Self {
            min_workers: read_var(&lookup, "TIDEPOOL_MIN_WORKERS", defaults.min_workers)?,
            max_workers: read_var(&lookup, "TIDEPOOL_MAX_WORKERS", defaults.max_workers)?,
            queue_capacity: read_var(&lookup, "TIDEPOOL_QUEUE_CAPACITY", defaults.queue_capacity)?,
            poll_interval_ms: read_var(
                &lookup,
                "TIDEPOOL_POLL_INTERVAL_MS",
                defaults.poll_interval_ms,
            )?,
            budget_limit_ms: read_var(
                &lookup,
                "TIDEPOOL_BUDGET_LIMIT_MS",
                defaults.budget_limit_ms,
            )?,
            sample_interval_ms: read_var(
                &lookup,
                "TIDEPOOL_SAMPLE_INTERVAL_MS",
                defaults.sample_interval_ms,
            )?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Worker observation cadence as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Free-caller budget limit as a [`Duration`].
    #[must_use]
    pub fn budget_limit(&self) -> Duration {
        Duration::from_millis(self.budget_limit_ms)
    }

    /// Budget sampling cadence as a [`Duration`].
    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Parse one looked-up variable into the field's type.
fn read_var<T, F>(lookup: &F, name: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse().map_err(|e| format!("{name}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = PoolConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.max_workers >= cfg.min_workers);
    }

    #[test]
    fn test_validate_rejects_zero_max_workers() {
        let cfg = PoolConfig {
            max_workers: 0,
            ..PoolConfig::default()
        };
        assert_eq!(
            cfg.validate().unwrap_err(),
            "max_workers must be greater than 0"
        );
    }

    #[test]
    fn test_validate_rejects_min_above_max() {
        let cfg = PoolConfig {
            min_workers: 8,
            max_workers: 4,
            ..PoolConfig::default()
        };
        assert_eq!(
            cfg.validate().unwrap_err(),
            "min_workers must not exceed max_workers"
        );
    }

    #[test]
    fn test_validate_rejects_zero_durations() {
        let cfg = PoolConfig {
            poll_interval_ms: 0,
            ..PoolConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = PoolConfig {
            sample_interval_ms: 0,
            ..PoolConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_min_workers_is_permitted() {
        let cfg = PoolConfig {
            min_workers: 0,
            ..PoolConfig::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_from_json_str() {
        let cfg = PoolConfig::from_json_str(
            r#"{
                "min_workers": 3,
                "max_workers": 20,
                "queue_capacity": 64,
                "poll_interval_ms": 50,
                "budget_limit_ms": 10000,
                "sample_interval_ms": 1000
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.min_workers, 3);
        assert_eq!(cfg.max_workers, 20);
        assert_eq!(cfg.budget_limit(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_json_str_rejects_invalid() {
        let result = PoolConfig::from_json_str(
            r#"{
                "min_workers": 5,
                "max_workers": 2,
                "queue_capacity": 64,
                "poll_interval_ms": 50,
                "budget_limit_ms": 10000,
                "sample_interval_ms": 1000
            }"#,
        );
        assert_eq!(
            result.unwrap_err(),
            "min_workers must not exceed max_workers"
        );

        assert!(PoolConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
    }

    #[test]
    fn test_duration_accessors() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.poll_interval(), Duration::from_millis(50));
        assert_eq!(cfg.sample_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_env_with_applies_overrides_and_defaults() {
        let cfg = PoolConfig::from_env_with(|name| match name {
            "TIDEPOOL_MIN_WORKERS" => Some("1".into()),
            "TIDEPOOL_MAX_WORKERS" => Some("6".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.min_workers, 1);
        assert_eq!(cfg.max_workers, 6);
        assert_eq!(cfg.queue_capacity, PoolConfig::default().queue_capacity);
        assert_eq!(cfg.budget_limit_ms, PoolConfig::default().budget_limit_ms);
    }

    #[test]
    fn test_from_env_with_reports_parse_failure() {
        let err = PoolConfig::from_env_with(|name| {
            (name == "TIDEPOOL_MAX_WORKERS").then(|| "not-a-number".to_string())
        })
        .unwrap_err();
        assert!(err.starts_with("TIDEPOOL_MAX_WORKERS"));
    }

    #[test]
    fn test_from_env_with_validates_combination() {
        let result = PoolConfig::from_env_with(|name| match name {
            "TIDEPOOL_MIN_WORKERS" => Some("9".into()),
            "TIDEPOOL_MAX_WORKERS" => Some("2".into()),
            _ => None,
        });
        assert_eq!(
            result.unwrap_err(),
            "min_workers must not exceed max_workers"
        );
    }
}
