use std::env;
use std::str::FromStr;

use thiserror::Error;

#[derive(Error, Debug)]
#[error("{name} is invalid: {value:?}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub environment: String,
    /// Unset runs the service on in-memory repositories and data source.
    pub database_url: Option<String>,
    pub otel_service_name: String,
    pub otel_service_namespace: String,
    pub otel_exporter_endpoint: String,
    pub otel_export_timeout_secs: u64,
    /// Base level for this crate's own spans and events; `RUST_LOG` overrides.
    pub log_level: String,
    pub report_storage_dir: String,
    pub report_public_base_url: String,
    pub report_retention_days: i64,
    pub max_concurrent_generations: usize,
    pub generation_queue_capacity: usize,
    pub scheduler_tick_secs: u64,
    pub maintenance_interval_secs: u64,
    pub stale_generation_minutes: i64,
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError { name, value }),
        Err(_) => Ok(default),
    }
}

fn text(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: parsed("APP_PORT", 8080)?,
            environment: text("ENVIRONMENT", "development"),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            otel_service_name: text("OTEL_SERVICE_NAME", "risk-report-service"),
            otel_service_namespace: text("OTEL_SERVICE_NAMESPACE", "risk-platform"),
            otel_exporter_endpoint: text("OTEL_EXPORTER_OTLP_ENDPOINT", "http://localhost:4317"),
            otel_export_timeout_secs: parsed("OTEL_EXPORTER_OTLP_TIMEOUT_SECS", 10)?,
            log_level: text("LOG_LEVEL", "info"),
            report_storage_dir: text("REPORT_STORAGE_DIR", "./data/reports"),
            report_public_base_url: text(
                "REPORT_PUBLIC_BASE_URL",
                "http://localhost:8080/files/reports",
            ),
            report_retention_days: parsed("REPORT_RETENTION_DAYS", 30)?,
            max_concurrent_generations: parsed("MAX_CONCURRENT_GENERATIONS", 4)?,
            generation_queue_capacity: parsed("GENERATION_QUEUE_CAPACITY", 256)?,
            scheduler_tick_secs: parsed("SCHEDULER_TICK_SECS", 60)?,
            maintenance_interval_secs: parsed("MAINTENANCE_INTERVAL_SECS", 300)?,
            stale_generation_minutes: parsed("STALE_GENERATION_MINUTES", 30)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, bool, String); 6] = [
            (
                "REPORT_RETENTION_DAYS",
                self.report_retention_days > 0,
                self.report_retention_days.to_string(),
            ),
            (
                "MAX_CONCURRENT_GENERATIONS",
                self.max_concurrent_generations > 0,
                self.max_concurrent_generations.to_string(),
            ),
            (
                "GENERATION_QUEUE_CAPACITY",
                self.generation_queue_capacity > 0,
                self.generation_queue_capacity.to_string(),
            ),
            (
                "SCHEDULER_TICK_SECS",
                self.scheduler_tick_secs > 0,
                self.scheduler_tick_secs.to_string(),
            ),
            (
                "STALE_GENERATION_MINUTES",
                self.stale_generation_minutes > 0,
                self.stale_generation_minutes.to_string(),
            ),
            (
                "LOG_LEVEL",
                matches!(
                    self.log_level.as_str(),
                    "trace" | "debug" | "info" | "warn" | "error"
                ),
                self.log_level.clone(),
            ),
        ];
        for (name, ok, value) in checks {
            if !ok {
                return Err(ConfigError { name, value });
            }
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            environment: "development".to_string(),
            database_url: None,
            otel_service_name: "risk-report-service".to_string(),
            otel_service_namespace: "risk-platform".to_string(),
            otel_exporter_endpoint: "http://localhost:4317".to_string(),
            otel_export_timeout_secs: 10,
            log_level: "info".to_string(),
            report_storage_dir: "./data/reports".to_string(),
            report_public_base_url: "http://localhost:8080/files/reports".to_string(),
            report_retention_days: 30,
            max_concurrent_generations: 4,
            generation_queue_capacity: 256,
            scheduler_tick_secs: 60,
            maintenance_interval_secs: 300,
            stale_generation_minutes: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.is_production());
        assert_eq!(config.report_retention_days, 30);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = Config {
            max_concurrent_generations: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.name, "MAX_CONCURRENT_GENERATIONS");
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let config = Config {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.name, "LOG_LEVEL");
        assert_eq!(err.value, "verbose");
    }
}
