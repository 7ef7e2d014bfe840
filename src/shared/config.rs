use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::domain::alert::RearmPolicy;
use crate::shared::errors::AppError;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "Config.toml";

/// Price monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub price_check_interval_secs: u64,
    pub scraping_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub price_change_threshold: f64,
    /// Whether `price_change_threshold` gates alerts at all
    pub require_price_drop: bool,
    pub rearm_policy: RearmPolicy,
    pub worker_pool_size: usize,
    /// How long a sweep lease stays valid without renewal
    pub sweep_lease_secs: u64,
    /// SQLite database file
    pub database_path: PathBuf,
    pub notifier_webhook_url: Option<String>,
    pub log_level: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            price_check_interval_secs: 3600,
            scraping_delay_secs: 60,
            request_timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_cap_ms: 60_000,
            price_change_threshold: 0.05,
            require_price_drop: false,
            rearm_policy: RearmPolicy::RearmOnRecovery,
            worker_pool_size: 4,
            sweep_lease_secs: 900,
            database_path: PathBuf::from("price_tracker.db"),
            notifier_webhook_url: None,
            log_level: "info".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn price_check_interval(&self) -> Duration {
        Duration::from_secs(self.price_check_interval_secs)
    }

    pub fn scraping_delay(&self) -> Duration {
        Duration::from_secs(self.scraping_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sweep_lease(&self) -> Duration {
        Duration::from_secs(self.sweep_lease_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap_ms)
    }

    /// Apply environment-style overrides. `lookup` returns the raw value for a key.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "PRICE_CHECK_INTERVAL", &mut self.price_check_interval_secs)?;
        override_parsed(&lookup, "SCRAPING_DELAY", &mut self.scraping_delay_secs)?;
        override_parsed(&lookup, "REQUEST_TIMEOUT", &mut self.request_timeout_secs)?;
        override_parsed(&lookup, "MAX_RETRIES", &mut self.max_retries)?;
        override_parsed(&lookup, "BACKOFF_BASE_MS", &mut self.backoff_base_ms)?;
        override_parsed(&lookup, "BACKOFF_CAP_MS", &mut self.backoff_cap_ms)?;
        override_parsed(&lookup, "PRICE_CHANGE_THRESHOLD", &mut self.price_change_threshold)?;
        override_parsed(&lookup, "REQUIRE_PRICE_DROP", &mut self.require_price_drop)?;
        override_parsed(&lookup, "REARM_POLICY", &mut self.rearm_policy)?;
        override_parsed(&lookup, "WORKER_POOL_SIZE", &mut self.worker_pool_size)?;
        override_parsed(&lookup, "SWEEP_LEASE_SECS", &mut self.sweep_lease_secs)?;
        override_parsed(&lookup, "DATABASE_PATH", &mut self.database_path)?;
        override_parsed(&lookup, "LOG_LEVEL", &mut self.log_level)?;

        if let Some(url) = lookup("NOTIFIER_WEBHOOK_URL") {
            let url = url.trim();
            self.notifier_webhook_url = (!url.is_empty()).then(|| url.to_string());
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.price_check_interval_secs == 0 {
            return Err(AppError::ConfigError("PRICE_CHECK_INTERVAL must be positive".into()));
        }
        if self.sweep_lease_secs == 0 {
            return Err(AppError::ConfigError("SWEEP_LEASE_SECS must be positive".into()));
        }
        if self.worker_pool_size == 0 {
            return Err(AppError::ConfigError("WORKER_POOL_SIZE must be positive".into()));
        }
        if !(0.0..1.0).contains(&self.price_change_threshold) {
            return Err(AppError::ConfigError(format!(
                "PRICE_CHANGE_THRESHOLD must be in [0, 1), got {}",
                self.price_change_threshold
            )));
        }
        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(AppError::ConfigError("BACKOFF_CAP_MS must be >= BACKOFF_BASE_MS".into()));
        }
        Ok(())
    }
}

fn override_parsed<T, F>(lookup: &F, key: &str, target: &mut T) -> Result<(), AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(());
        }
        *target = raw
            .parse()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}={:?}: {}", key, raw, e)))?;
    }
    Ok(())
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then the TOML file, then `.env` and the process environment.
    ///
    /// An explicit `path` must exist; the default `Config.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<MonitorConfig, AppError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => MonitorConfig::default(),
        };

        dotenvy::dotenv().ok();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<MonitorConfig, AppError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<MonitorConfig, AppError> {
        toml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse config file: {}", e)))
    }
}
