use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::coordinator::AdmissionPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub cleaner: CleanerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Total pool size in MB
    pub capacity: u64,
    /// How uploads are admitted against the capacity
    pub admission: AdmissionPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            admission: AdmissionPolicy::CheckBeforeInsert,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Capacity sampling period in milliseconds
    pub tick_ms: u64,
    /// Consecutive over-capacity samples before cleaning mode starts
    pub overflow_strikes: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            overflow_strikes: 3,
        }
    }
}

impl MonitorConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-call reply timeout in milliseconds (0 = wait forever)
    pub call_timeout_ms: u64,
    /// Bounded depth of each bus queue
    pub queue_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
            queue_capacity: 256,
        }
    }
}

impl TransportConfig {
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanerConfig {
    pub poll_interval_ms: u64,
    /// Upper bound of the simulated cleanup work between claim and removal
    pub work_delay_max_ms: u64,
    pub backoff_ms: u64,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            work_delay_max_ms: 1500,
            backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub poll_base_ms: u64,
    pub poll_jitter_ms: u64,
    /// Smallest upload size (inclusive)
    pub min_file_size: u64,
    /// Largest upload size (exclusive)
    pub max_file_size: u64,
    pub backoff_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_base_ms: 2000,
            poll_jitter_ms: 1000,
            min_file_size: 20,
            max_file_size: 50,
            backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP + WebSocket listen address
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable JSON formatted logs
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration, layering an optional TOML file under the environment
    pub fn load_from<P: AsRef<Path>>(config_file: Option<P>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = config_file {
            builder = builder.add_source(File::from(path.as_ref()).required(true));
        }

        // Override with environment variables (POOLWARDEN_STORAGE__CAPACITY, etc.)
        let builder = builder.add_source(
            Environment::with_prefix("POOLWARDEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.storage.capacity == 0 {
            errors.push("storage.capacity must be positive".to_string());
        }

        if self.monitor.overflow_strikes == 0 {
            errors.push("monitor.overflow_strikes must be at least 1".to_string());
        }

        if self.monitor.tick_ms == 0 {
            errors.push("monitor.tick_ms must be positive".to_string());
        }

        if self.cleaner.poll_interval_ms == 0 {
            errors.push("cleaner.poll_interval_ms must be positive".to_string());
        }

        if self.client.min_file_size >= self.client.max_file_size {
            errors.push(format!(
                "client file size range is empty: {}..{}",
                self.client.min_file_size, self.client.max_file_size
            ));
        }

        if self.transport.queue_capacity == 0 {
            errors.push("transport.queue_capacity must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage.capacity, 100);
        assert_eq!(config.monitor.overflow_strikes, 3);
        assert_eq!(config.storage.admission, AdmissionPolicy::CheckBeforeInsert);
        assert_eq!(
            config.transport.call_timeout(),
            Some(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_zero_timeout_means_wait_forever() {
        let transport = TransportConfig {
            call_timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(transport.call_timeout(), None);
    }

    #[test]
    fn test_validate_collects_every_problem() {
        let mut config = AppConfig::default();
        config.storage.capacity = 0;
        config.monitor.overflow_strikes = 0;
        config.client.min_file_size = 50;
        config.client.max_file_size = 50;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("poolwarden-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("poolwarden.toml");
        std::fs::write(
            &path,
            "[storage]\ncapacity = 200\nadmission = \"insert_then_check\"\n\n[monitor]\ntick_ms = 250\n",
        )
        .unwrap();

        let config = AppConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.storage.capacity, 200);
        assert_eq!(config.storage.admission, AdmissionPolicy::InsertThenCheck);
        assert_eq!(config.monitor.tick_ms, 250);
        // untouched sections keep their defaults
        assert_eq!(config.monitor.overflow_strikes, 3);
        assert_eq!(config.client.max_file_size, 50);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_environment_overrides_file() {
        // only this test touches transport.queue_capacity through the environment
        let dir = std::env::temp_dir().join(format!("poolwarden-env-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("poolwarden.toml");
        std::fs::write(&path, "[transport]\nqueue_capacity = 32\ncall_timeout_ms = 500\n").unwrap();

        std::env::set_var("POOLWARDEN_TRANSPORT__QUEUE_CAPACITY", "64");
        let loaded = AppConfig::load_from(Some(&path));
        std::env::remove_var("POOLWARDEN_TRANSPORT__QUEUE_CAPACITY");

        let config = loaded.unwrap();
        assert_eq!(config.transport.queue_capacity, 64);
        // keys without an override still come from the file
        assert_eq!(config.transport.call_timeout_ms, 500);

        std::fs::remove_dir_all(&dir).ok();
    }
}
