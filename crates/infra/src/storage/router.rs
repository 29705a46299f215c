//! Category → path mapping and public URL resolution.

use std::time::Duration;

use genflow_core::ArtifactCategory;
use reqwest::Url;
use tracing::{debug, warn};

use super::StorageError;

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Public base URL artifacts are served from, e.g. `http://host:9000/bucket`.
    pub public_base_url: String,
    /// Port that triggers dual-port probing when present in the base URL.
    pub main_port: u16,
    pub alternate_port: u16,
    pub probe_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:9000/genflow".to_string(),
            main_port: 9000,
            alternate_port: 9001,
            probe_timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Probe {
    Reachable,
    Unreachable,
}

/// Maps artifacts to storage paths and reachable public URLs.
#[derive(Debug, Clone)]
pub struct StorageRouter {
    config: RouterConfig,
    main_base: Url,
    alternate_base: Option<Url>,
    http: reqwest::Client,
}

impl StorageRouter {
    pub fn new(config: RouterConfig) -> Result<Self, StorageError> {
        let main_base = Url::parse(&config.public_base_url)
            .map_err(|e| StorageError::InvalidBaseUrl(format!("{}: {e}", config.public_base_url)))?;

        let alternate_base = if main_base.port_or_known_default() == Some(config.main_port)
            && config.alternate_port != config.main_port
        {
            let mut alt = main_base.clone();
            alt.set_port(Some(config.alternate_port))
                .map_err(|_| StorageError::InvalidBaseUrl(config.public_base_url.clone()))?;
            Some(alt)
        } else {
            None
        };

        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()
            .map_err(|e| StorageError::Backend(format!("failed to build probe client: {e}")))?;

        Ok(Self {
            config,
            main_base,
            alternate_base,
            http,
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Storage prefix for a category.
    pub fn prefix(category: ArtifactCategory) -> &'static str {
        match category {
            ArtifactCategory::Generated => "images/generated",
            ArtifactCategory::Reference => "images/reference",
            ArtifactCategory::Thumbnail => "images/thumbnails",
        }
    }

    /// Deterministic storage path for `(category, filename)`.
    ///
    /// Directory components in `filename` are dropped so a caller can never
    /// escape the category prefix.
    pub fn resolve_path(category: ArtifactCategory, filename: &str) -> String {
        let name = filename
            .rsplit(['/', '\\'])
            .next()
            .map(str::trim)
            .filter(|n| !n.is_empty() && *n != "." && *n != "..")
            .unwrap_or("unnamed");
        format!("{}/{}", Self::prefix(category), name)
    }

    /// Public URL on the main endpoint, without probing.
    pub fn direct_url(&self, storage_path: &str) -> String {
        join(&self.main_base, storage_path)
    }

    /// Public URL on the alternate port, when dual-port routing applies.
    pub fn alternate_url(&self, storage_path: &str) -> Option<String> {
        self.alternate_base.as_ref().map(|base| join(base, storage_path))
    }

    /// Reachable public URL for `storage_path`.
    ///
    /// When the base URL uses the main port, both ports are probed; the
    /// alternate wins only if main is unreachable and alternate is reachable.
    pub async fn public_url(&self, storage_path: &str) -> String {
        let main = self.direct_url(storage_path);
        let Some(alternate) = self.alternate_url(storage_path) else {
            return main;
        };

        let (main_probe, alt_probe) = tokio::join!(self.probe(&main), self.probe(&alternate));
        debug!(?main_probe, ?alt_probe, storage_path, "dual-port probe");

        match (main_probe, alt_probe) {
            (Probe::Unreachable, Probe::Reachable) => {
                warn!(
                    main = %main,
                    alternate = %alternate,
                    "main storage port unreachable, using alternate"
                );
                alternate
            }
            _ => main,
        }
    }

    async fn probe(&self, url: &str) -> Probe {
        match self.http.head(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => Probe::Reachable,
            Ok(_) | Err(_) => Probe::Unreachable,
        }
    }
}

fn join(base: &Url, storage_path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        storage_path.trim_start_matches('/')
    )
}
