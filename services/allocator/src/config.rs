use std::time::Duration;

use anyhow::{Context, Result};

use crate::db::DbConfig;

/// Subscriber endpoint for the allocation checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensibilityConfig {
    pub url: String,
    pub blocking: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub dev_mode: bool,
    pub resource_api_url: String,
    pub request_timeout: Duration,
    pub resume_interval: Duration,
    pub extensibility: Option<ExtensibilityConfig>,
    pub database: DbConfig,
}

fn flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn secs(name: &str, default: u64) -> Result<Duration> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Duration::from_secs)
            .with_context(|| format!("{name} must be a number of seconds, got {raw:?}")),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let log_level = std::env::var("VMALLOC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("VMALLOC_DEV")
            .map(|v| flag(&v))
            .unwrap_or(false);

        let resource_api_url = std::env::var("VMALLOC_RESOURCE_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8282".to_string());

        let request_timeout = secs("VMALLOC_REQUEST_TIMEOUT_SECS", 30)?;
        let resume_interval = secs("VMALLOC_RESUME_INTERVAL_SECS", 5)?;

        let extensibility = std::env::var("VMALLOC_EXTENSIBILITY_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| ExtensibilityConfig {
                url,
                blocking: std::env::var("VMALLOC_EXTENSIBILITY_BLOCKING")
                    .map(|v| flag(&v))
                    .unwrap_or(true),
            });

        let database = DbConfig::from_env();

        Ok(Self {
            log_level,
            dev_mode,
            resource_api_url,
            request_timeout,
            resume_interval,
            extensibility,
            database,
        })
    }
}
