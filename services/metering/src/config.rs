use std::env;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct MeteringConfig {
    pub server_host: String,
    pub server_port: u16,
    pub store_backend: StoreBackend,
    pub redis_url: String,
    pub store_timeout_ms: u64,
    pub log_level: String,
}

impl Default for MeteringConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8184,
            store_backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            store_timeout_ms: 2_000,
            log_level: "info".to_string(),
        }
    }
}

impl MeteringConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("METERING_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("METERING_PORT") {
            cfg.server_port = port.parse().context("METERING_PORT must be a valid u16")?;
        }
        if let Ok(backend) = env::var("STORE_BACKEND") {
            cfg.store_backend = parse_backend(&backend)
                .with_context(|| format!("STORE_BACKEND is invalid: {backend}"))?;
        }
        if let Ok(url) = env::var("REDIS_URL") {
            cfg.redis_url = url;
        }
        if let Ok(timeout) = env::var("STORE_TIMEOUT_MS") {
            cfg.store_timeout_ms = timeout
                .parse()
                .context("STORE_TIMEOUT_MS must be a positive integer")?;
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be greater than zero");
        }
        if self.store_backend == StoreBackend::Redis && self.redis_url.trim().is_empty() {
            anyhow::bail!("REDIS_URL must be set when STORE_BACKEND is redis");
        }
        Ok(())
    }
}

fn parse_backend(value: &str) -> Result<StoreBackend> {
    match value.to_ascii_lowercase().as_str() {
        "memory" => Ok(StoreBackend::Memory),
        "redis" => Ok(StoreBackend::Redis),
        _ => anyhow::bail!("expected 'memory' or 'redis', got {value}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        MeteringConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cfg = MeteringConfig {
            store_timeout_ms: 0,
            ..MeteringConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn redis_backend_requires_url() {
        let cfg = MeteringConfig {
            store_backend: StoreBackend::Redis,
            redis_url: "  ".to_string(),
            ..MeteringConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backend_parsing_is_case_insensitive() {
        assert_eq!(parse_backend("Redis").unwrap(), StoreBackend::Redis);
        assert_eq!(parse_backend("MEMORY").unwrap(), StoreBackend::Memory);
        assert!(parse_backend("sqlite").is_err());
    }
}
