//! Configuration loading and representation.
//!
//! Everything comes from environment variables with development defaults.
//! Missing secrets are logged, never fatal; malformed values are.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use genflow_core::ProviderKind;
use genflow_providers::GenerationClientConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::RouterConfig;
use crate::transfer::TransferConfig;

/// Configuration error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
    #[error("{var} is required when {context}")]
    Missing {
        var: &'static str,
        context: &'static str,
    },
}

/// Provider connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub default_provider: ProviderKind,
}

/// Batch execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub inter_batch_delay_ms: u64,
    pub task_ttl_secs: u64,
}

/// Artifact transfer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSettings {
    pub cache_ttl_secs: u64,
    pub retry_count: u32,
    pub slow_hosts: Vec<String>,
}

/// Which object store backs artifacts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    S3,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in_memory" => Ok(StorageBackend::Memory),
            "s3" | "minio" => Ok(StorageBackend::S3),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

/// Object storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    #[serde(skip_serializing)]
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    pub public_base_url: String,
    pub main_port: u16,
    pub alternate_port: u16,
}

/// Full process configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind: SocketAddr,
    pub provider: ProviderSettings,
    pub batch: BatchSettings,
    pub transfer: TransferSettings,
    pub storage: StorageSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            provider: ProviderSettings {
                base_url: "https://api.kie.ai".to_string(),
                api_key: String::new(),
                default_provider: ProviderKind::Gpt4o,
            },
            batch: BatchSettings {
                batch_size: 5,
                inter_batch_delay_ms: 2000,
                task_ttl_secs: 3600,
            },
            transfer: TransferSettings {
                cache_ttl_secs: 1800,
                retry_count: 2,
                slow_hosts: vec!["aiquickdraw.com".to_string()],
            },
            storage: StorageSettings {
                backend: StorageBackend::Memory,
                bucket: None,
                endpoint: None,
                region: None,
                access_key: None,
                secret_key: None,
                public_base_url: "http://localhost:9000/genflow".to_string(),
                main_port: 9000,
                alternate_port: 9001,
            },
        }
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = AppConfig::default();

        if let Some(v) = get("GENFLOW_BIND") {
            cfg.bind = parse("GENFLOW_BIND", &v)?;
        }

        if let Some(v) = get("PROVIDER_BASE_URL") {
            cfg.provider.base_url = v;
        }
        match get("PROVIDER_API_KEY") {
            Some(v) => cfg.provider.api_key = v,
            None => warn!("PROVIDER_API_KEY not set; provider calls will be rejected"),
        }
        if let Some(v) = get("DEFAULT_PROVIDER") {
            cfg.provider.default_provider = parse("DEFAULT_PROVIDER", &v)?;
        }

        if let Some(v) = get("BATCH_SIZE") {
            cfg.batch.batch_size = parse("BATCH_SIZE", &v)?;
            if cfg.batch.batch_size == 0 {
                return Err(ConfigError::Invalid {
                    var: "BATCH_SIZE",
                    value: v,
                    reason: "must be at least 1".to_string(),
                });
            }
        }
        if let Some(v) = get("INTER_BATCH_DELAY_MS") {
            cfg.batch.inter_batch_delay_ms = parse("INTER_BATCH_DELAY_MS", &v)?;
        }
        if let Some(v) = get("TASK_TTL_SECS") {
            cfg.batch.task_ttl_secs = parse("TASK_TTL_SECS", &v)?;
        }

        if let Some(v) = get("TRANSFER_CACHE_TTL_SECS") {
            cfg.transfer.cache_ttl_secs = parse("TRANSFER_CACHE_TTL_SECS", &v)?;
        }
        if let Some(v) = get("TRANSFER_RETRY_COUNT") {
            cfg.transfer.retry_count = parse("TRANSFER_RETRY_COUNT", &v)?;
        }
        if let Some(v) = get("SLOW_HOSTS") {
            cfg.transfer.slow_hosts = v
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect();
        }

        if let Some(v) = get("STORAGE_BACKEND") {
            cfg.storage.backend = parse("STORAGE_BACKEND", &v)?;
        }
        cfg.storage.bucket = get("STORAGE_BUCKET");
        cfg.storage.endpoint = get("STORAGE_ENDPOINT");
        cfg.storage.region = get("STORAGE_REGION");
        cfg.storage.access_key = get("STORAGE_ACCESS_KEY");
        cfg.storage.secret_key = get("STORAGE_SECRET_KEY");
        if let Some(v) = get("STORAGE_PUBLIC_BASE_URL") {
            cfg.storage.public_base_url = v;
        }
        if let Some(v) = get("STORAGE_MAIN_PORT") {
            cfg.storage.main_port = parse("STORAGE_MAIN_PORT", &v)?;
        }
        if let Some(v) = get("STORAGE_ALTERNATE_PORT") {
            cfg.storage.alternate_port = parse("STORAGE_ALTERNATE_PORT", &v)?;
        }

        if cfg.storage.backend == StorageBackend::S3 {
            if cfg.storage.bucket.is_none() {
                return Err(ConfigError::Missing {
                    var: "STORAGE_BUCKET",
                    context: "STORAGE_BACKEND=s3",
                });
            }
            if cfg.storage.access_key.is_none() || cfg.storage.secret_key.is_none() {
                warn!("storage credentials not set; relying on ambient AWS configuration");
            }
        }

        Ok(cfg)
    }

    pub fn generation_client(&self) -> GenerationClientConfig {
        GenerationClientConfig::default()
            .with_base_url(&self.provider.base_url)
            .with_api_key(&self.provider.api_key)
    }

    pub fn transfer(&self) -> TransferConfig {
        TransferConfig {
            retry_count: self.transfer.retry_count,
            slow_hosts: self.transfer.slow_hosts.clone(),
            ..TransferConfig::default()
        }
    }

    pub fn router(&self) -> RouterConfig {
        RouterConfig {
            public_base_url: self.storage.public_base_url.clone(),
            main_port: self.storage.main_port,
            alternate_port: self.storage.alternate_port,
            ..RouterConfig::default()
        }
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch.inter_batch_delay_ms)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.batch.task_ttl_secs)
    }

    pub fn transfer_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.transfer.cache_ttl_secs)
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = load(&[]).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.batch.batch_size, 5);
        assert_eq!(cfg.transfer.retry_count, 2);
        assert_eq!(cfg.storage.main_port, 9000);
        assert_eq!(cfg.storage.alternate_port, 9001);
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = load(&[
            ("GENFLOW_BIND", "127.0.0.1:3000"),
            ("DEFAULT_PROVIDER", "flux_kontext"),
            ("BATCH_SIZE", "3"),
            ("SLOW_HOSTS", "Slow.example, other.example ,"),
            ("STORAGE_BACKEND", "s3"),
            ("STORAGE_BUCKET", "artifacts"),
        ])
        .unwrap();

        assert_eq!(cfg.bind.port(), 3000);
        assert_eq!(cfg.provider.default_provider, ProviderKind::FluxKontext);
        assert_eq!(cfg.batch.batch_size, 3);
        assert_eq!(cfg.transfer.slow_hosts, vec!["slow.example", "other.example"]);
        assert_eq!(cfg.storage.backend, StorageBackend::S3);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            load(&[("BATCH_SIZE", "five")]),
            Err(ConfigError::Invalid { var: "BATCH_SIZE", .. })
        ));
        assert!(matches!(
            load(&[("BATCH_SIZE", "0")]),
            Err(ConfigError::Invalid { var: "BATCH_SIZE", .. })
        ));
        assert!(matches!(
            load(&[("STORAGE_BACKEND", "s3")]),
            Err(ConfigError::Missing { var: "STORAGE_BUCKET", .. })
        ));
    }

    #[test]
    fn secrets_are_not_serialized() {
        let cfg = load(&[("PROVIDER_API_KEY", "sk-secret")]).unwrap();
        assert_eq!(cfg.provider.api_key, "sk-secret");
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
