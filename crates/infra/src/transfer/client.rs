use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use genflow_core::{ArtifactCategory, ArtifactRef, Classify, ErrorClass, RetryPolicy, with_retry};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutMultipartOpts, WriteMultipart};
use reqwest::Url;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ArtifactStore;
use super::diagnostics::{HostDiagnostics, diagnose};
use super::error::{StrategyFailure, TransferError, TransferReport};
use super::sniff::ImageKind;
use super::strategy::{TransportStrategy, default_strategies};
use crate::storage::StorageRouter;

/// Multipart parts allowed in flight per upload.
const MAX_INFLIGHT_PARTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    /// Extra full cycles over all strategies after the first.
    pub retry_count: u32,
    /// Delay unit between cycles; cycle `n` waits `n * base_delay`.
    pub base_delay: Duration,
    /// Delay unit for hosts flagged slow.
    pub slow_host_delay: Duration,
    /// Host suffixes flagged slow.
    pub slow_hosts: Vec<String>,
    /// Per-attempt timeouts of the full, simple and fallback strategies.
    pub strategy_timeouts: [Duration; 3],
    pub diagnose_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            retry_count: 2,
            base_delay: Duration::from_secs(3),
            slow_host_delay: Duration::from_secs(8),
            slow_hosts: vec!["aiquickdraw.com".to_string()],
            strategy_timeouts: [
                Duration::from_secs(60),
                Duration::from_secs(30),
                Duration::from_secs(15),
            ],
            diagnose_timeout: Duration::from_secs(3),
        }
    }
}

impl TransferConfig {
    pub fn is_slow_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.slow_hosts.iter().any(|slow| {
            let slow = slow.trim_start_matches('.');
            host == slow || host.ends_with(&format!(".{slow}"))
        })
    }

    /// Retry policy across whole cycles.
    fn cycle_policy(&self, slow: bool, max_retries: u32) -> RetryPolicy {
        let unit = if slow {
            self.slow_host_delay
        } else {
            self.base_delay
        };
        RetryPolicy::linear(max_retries, unit, unit)
    }
}

/// A successful transfer plus what it took.
#[derive(Debug, Clone)]
pub struct Transferred {
    pub artifact: ArtifactRef,
    pub report: TransferReport,
}

/// Moves remote artifacts into the object store.
pub struct TransferClient {
    store: Arc<dyn ObjectStore>,
    router: Arc<StorageRouter>,
    strategies: Vec<Box<dyn TransportStrategy>>,
    config: TransferConfig,
    probe_http: reqwest::Client,
}

impl TransferClient {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        router: Arc<StorageRouter>,
        config: TransferConfig,
    ) -> Result<Self, TransferError> {
        let strategies = default_strategies(config.strategy_timeouts)?;
        Self::with_strategies(store, router, config, strategies)
    }

    pub fn with_strategies(
        store: Arc<dyn ObjectStore>,
        router: Arc<StorageRouter>,
        config: TransferConfig,
        strategies: Vec<Box<dyn TransportStrategy>>,
    ) -> Result<Self, TransferError> {
        let probe_http = reqwest::Client::builder()
            .timeout(config.diagnose_timeout)
            .build()
            .map_err(|e| TransferError::network("diagnostics", e))?;
        Ok(Self {
            store,
            router,
            strategies,
            config,
            probe_http,
        })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub fn router(&self) -> &StorageRouter {
        &self.router
    }

    /// Download `source_url` and stream it into storage under `category`.
    ///
    /// Without a `filename`, one is generated from a fresh id and the sniffed
    /// image type.
    pub async fn transfer(
        &self,
        source_url: &str,
        category: ArtifactCategory,
        filename: Option<&str>,
    ) -> Result<Transferred, TransferError> {
        let url = Url::parse(source_url)
            .map_err(|e| TransferError::InvalidSource(format!("{source_url}: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(TransferError::InvalidSource(source_url.to_string()));
        }

        let host = url.host_str().unwrap_or_default().to_string();
        let slow = self.config.is_slow_host(&host);
        let mut max_retries = self.config.retry_count;
        let mut diagnostics: Option<HostDiagnostics> = None;

        if slow {
            let diag = diagnose(&self.probe_http, &url).await;
            if diag.dns_failed() {
                warn!(host = %host, "slow host does not resolve, limiting to a single cycle");
                max_retries = 0;
            }
            diagnostics = Some(diag);
        }

        let policy = self.config.cycle_policy(slow, max_retries);
        let failures = Mutex::new(Vec::new());
        let cycles = AtomicU32::new(0);
        debug!(source_url, slow, max_cycles = max_retries + 1, "starting transfer");

        let url_ref = &url;
        let failures_ref = &failures;
        let cycles_ref = &cycles;
        let result = with_retry(&policy, "transfer.fetch_and_store", move |cycle| async move {
            cycles_ref.store(cycle, Ordering::SeqCst);
            self.run_cycle(cycle, url_ref, category, filename, failures_ref)
                .await
        })
        .await;

        let failures = failures
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let cycles_attempted = cycles.load(Ordering::SeqCst);

        match result {
            Ok(artifact) => Ok(Transferred {
                artifact,
                report: TransferReport {
                    source_url: source_url.to_string(),
                    cycles_attempted,
                    failures,
                    diagnostics,
                },
            }),
            Err(last) => {
                let diagnostics = match diagnostics {
                    Some(d) => Some(d),
                    None => Some(diagnose(&self.probe_http, &url).await),
                };
                let report = TransferReport {
                    source_url: source_url.to_string(),
                    cycles_attempted,
                    failures,
                    diagnostics,
                };
                error!(
                    source_url,
                    cycles = report.cycles_attempted,
                    failures = report.failures.len(),
                    strategies = ?report.strategies_attempted(),
                    last_error = %last,
                    "all transport strategies failed"
                );
                Err(TransferError::Exhausted(Box::new(report)))
            }
        }
    }

    async fn run_cycle(
        &self,
        cycle: u32,
        url: &Url,
        category: ArtifactCategory,
        filename: Option<&str>,
        failures: &Mutex<Vec<StrategyFailure>>,
    ) -> Result<ArtifactRef, CycleFailure> {
        let mut classes = Vec::with_capacity(self.strategies.len());
        let mut last = None;

        for strategy in &self.strategies {
            match self.attempt(strategy.as_ref(), url, category, filename).await {
                Ok(artifact) => {
                    info!(
                        source_url = %url,
                        strategy = strategy.name(),
                        cycle,
                        storage_path = %artifact.storage_path,
                        "artifact transferred"
                    );
                    return Ok(artifact);
                }
                Err(err) => {
                    let class = err.class();
                    warn!(
                        source_url = %url,
                        strategy = strategy.name(),
                        cycle,
                        class = ?class,
                        error = %err,
                        "transport strategy failed"
                    );
                    failures
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(StrategyFailure {
                            cycle,
                            strategy: strategy.name(),
                            class,
                            message: err.to_string(),
                        });
                    classes.push(class);
                    last = Some(err);
                }
            }
        }

        let class = if classes.iter().all(|c| *c == ErrorClass::Fatal) {
            ErrorClass::Fatal
        } else if classes.contains(&ErrorClass::RateLimited) {
            ErrorClass::RateLimited
        } else {
            ErrorClass::Transient
        };
        Err(CycleFailure {
            class,
            message: last
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no transport strategies configured".to_string()),
        })
    }

    /// One strategy: fetch, then stream into a multipart upload.
    async fn attempt(
        &self,
        strategy: &dyn TransportStrategy,
        url: &Url,
        category: ArtifactCategory,
        filename: Option<&str>,
    ) -> Result<ArtifactRef, TransferError> {
        let body = strategy.fetch(url.as_str()).await?;
        let mut chunks = body.chunks;

        let first = loop {
            match chunks.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => break chunk,
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(TransferError::EmptyBody {
                        strategy: strategy.name(),
                    });
                }
            }
        };

        let kind = ImageKind::detect(body.content_type.as_deref(), &first);
        let filename = match filename {
            Some(name) => name.to_string(),
            None => format!("{}.{}", Uuid::now_v7(), kind.extension()),
        };
        let storage_path = StorageRouter::resolve_path(category, &filename);
        let path = ObjectPath::from(storage_path.as_str());

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, kind.mime().into());
        let upload = self
            .store
            .put_multipart_opts(
                &path,
                PutMultipartOpts {
                    attributes,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| TransferError::Upload(e.to_string()))?;

        let mut writer = WriteMultipart::new(upload);
        let mut total = first.len() as u64;
        writer.write(&first);

        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    abort_upload(writer, &storage_path).await;
                    return Err(err);
                }
            };
            if let Err(err) = writer.wait_for_capacity(MAX_INFLIGHT_PARTS).await {
                abort_upload(writer, &storage_path).await;
                return Err(TransferError::Upload(err.to_string()));
            }
            total += chunk.len() as u64;
            writer.write(&chunk);
        }

        writer
            .finish()
            .await
            .map_err(|e| TransferError::Upload(e.to_string()))?;
        debug!(storage_path = %storage_path, bytes = total, mime = kind.mime(), "upload finished");

        let public_url = self.router.public_url(&storage_path).await;
        Ok(ArtifactRef {
            public_url,
            storage_path,
            category,
            filename: path.filename().unwrap_or(filename.as_str()).to_string(),
        })
    }
}

async fn abort_upload(writer: WriteMultipart, storage_path: &str) {
    if let Err(err) = writer.abort().await {
        warn!(storage_path, error = %err, "failed to abort partial upload");
    }
}

#[async_trait]
impl ArtifactStore for TransferClient {
    async fn fetch_and_store(
        &self,
        source_url: &str,
        category: ArtifactCategory,
        filename: Option<&str>,
    ) -> Result<ArtifactRef, TransferError> {
        self.transfer(source_url, category, filename)
            .await
            .map(|t| t.artifact)
    }
}

/// Outcome of one failed pass over every strategy.
#[derive(Debug)]
struct CycleFailure {
    class: ErrorClass,
    message: String,
}

impl std::fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl Classify for CycleFailure {
    fn class(&self) -> ErrorClass {
        self.class
    }
}
