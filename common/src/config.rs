// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub nats: NatsConfig,
    pub minio: MinioConfig,
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    pub url: String,
    /// Subject the object store publishes bucket notifications to
    pub subject: String,
    pub max_age_seconds: u64,
    pub max_deliver: i64,
    pub ack_wait_seconds: u64,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
}

fn default_connect_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinioConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Prometheus listener port, 0 disables the exporter
    pub metrics_port: u16,
    pub tracing_endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    /// Shut the process down when a worker task returns without being stopped
    pub exit_on_unexpected_exit: bool,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            exit_on_unexpected_exit: true,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Local overrides, not committed to git
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.nats.url.is_empty() {
            return Err("NATS URL cannot be empty".to_string());
        }
        if self.nats.subject.is_empty() {
            return Err("NATS subject cannot be empty".to_string());
        }
        if self.nats.max_deliver == 0 {
            return Err("NATS max_deliver must be greater than 0".to_string());
        }
        if self.nats.connect_attempts == 0 {
            return Err("NATS connect_attempts must be greater than 0".to_string());
        }

        if self.minio.endpoint.is_empty() {
            return Err("MinIO endpoint cannot be empty".to_string());
        }
        if self.minio.bucket.is_empty() {
            return Err("MinIO bucket cannot be empty".to_string());
        }

        if self.observability.log_level.is_empty() {
            return Err("Log level cannot be empty".to_string());
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                subject: "minio.events".to_string(),
                max_age_seconds: 86400,
                max_deliver: 10,
                ack_wait_seconds: 60,
                connect_attempts: default_connect_attempts(),
            },
            minio: MinioConfig {
                endpoint: "http://localhost:9000".to_string(),
                access_key: "minio".to_string(),
                secret_key: "minio123".to_string(),
                bucket: "skilly".to_string(),
                region: "us-east-1".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "debug".to_string(),
                log_format: LogFormat::Text,
                metrics_port: 0,
                tracing_endpoint: None,
            },
            workers: WorkersConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!(settings.workers.exit_on_unexpected_exit);
    }

    #[test]
    fn test_validation_catches_empty_bucket() {
        let mut settings = Settings::default();
        settings.minio.bucket = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_connect_attempts() {
        let mut settings = Settings::default();
        settings.nats.connect_attempts = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_max_deliver() {
        let mut settings = Settings::default();
        settings.nats.max_deliver = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_path_reads_default_toml() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
[nats]
url = "nats://nats:4222"
subject = "minio.events"
max_age_seconds = 3600
max_deliver = 5
ack_wait_seconds = 30

[minio]
endpoint = "http://minio:9000"
access_key = "minio"
secret_key = "minio123"
bucket = "skilly"
region = "us-east-1"

[observability]
log_level = "info"
log_format = "json"
metrics_port = 9090
"#
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.nats.url, "nats://nats:4222");
        assert_eq!(settings.nats.connect_attempts, 3);
        assert_eq!(settings.observability.log_format, LogFormat::Json);
        assert!(settings.observability.tracing_endpoint.is_none());
        assert!(settings.workers.exit_on_unexpected_exit);
        assert!(settings.validate().is_ok());
    }
}
