//! One item, end to end: create job → poll → transfer → record.

use std::sync::Arc;

use genflow_core::{
    ArtifactCategory, Classify, ErrorClass, GenerationItem, ItemError, ItemErrorKind, TaskId,
};
use genflow_infra::ArtifactStore;
use genflow_providers::{GenerationApi, PollOutcome, PollerConfig, StatusPoller};
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::registry::TaskRegistry;

pub struct ItemPipeline {
    registry: Arc<TaskRegistry>,
    api: Arc<dyn GenerationApi>,
    store: Arc<dyn ArtifactStore>,
    /// Overrides the per-provider polling defaults.
    poller: Option<PollerConfig>,
}

impl ItemPipeline {
    pub fn new(
        registry: Arc<TaskRegistry>,
        api: Arc<dyn GenerationApi>,
        store: Arc<dyn ArtifactStore>,
        poller: Option<PollerConfig>,
    ) -> Self {
        Self {
            registry,
            api,
            store,
            poller,
        }
    }

    /// Drive `item` to a terminal status. Failures stay on the item.
    pub async fn run(&self, task_id: TaskId, item: GenerationItem) {
        if let Err(err) = self.run_inner(task_id, &item).await {
            // Only happens when the task was dropped mid-flight.
            warn!(task_id = %task_id, item_id = %item.id, error = %err, "item abandoned");
        }
    }

    async fn run_inner(&self, task_id: TaskId, item: &GenerationItem) -> Result<(), RegistryError> {
        let registry = &self.registry;
        registry.mark_generating(task_id, item.id, 1, "submitting to provider")?;

        let job = match self.api.create_job(item).await {
            Ok(job) => job,
            Err(err) => {
                let kind = match err.class() {
                    ErrorClass::Fatal => ItemErrorKind::Fatal,
                    ErrorClass::Transient | ErrorClass::RateLimited => ItemErrorKind::Network,
                };
                warn!(task_id = %task_id, item_id = %item.id, error = %err, "provider job creation failed");
                registry.fail_item(task_id, item.id, ItemError::new(kind, err.to_string()))?;
                return Ok(());
            }
        };
        registry.mark_generating(task_id, item.id, 5, "provider job created")?;

        let poller = match &self.poller {
            Some(config) => StatusPoller::new(config.clone()),
            None => StatusPoller::for_provider(item.provider),
        };
        let outcome = poller
            .run(self.api.as_ref(), &job, |progress, message| {
                // A vanished task surfaces on the next registry call below.
                let _ = registry.mark_generating(task_id, item.id, progress, message);
            })
            .await;

        match outcome {
            PollOutcome::Completed { artifact_url, .. } => {
                let cache = registry.transfer_cache(task_id)?;
                let stored = cache
                    .get_or_transfer(&job.provider_task_id, &artifact_url, || {
                        self.store
                            .fetch_and_store(&artifact_url, ArtifactCategory::Generated, None)
                    })
                    .await;

                match stored {
                    Ok(artifact) => {
                        info!(
                            task_id = %task_id,
                            item_id = %item.id,
                            public_url = %artifact.public_url,
                            "item completed"
                        );
                        registry.complete_item(task_id, item.id, artifact)?;
                    }
                    Err(err) => {
                        warn!(task_id = %task_id, item_id = %item.id, error = %err, "artifact transfer failed");
                        let error = ItemError::new(ItemErrorKind::TransferExhausted, err.to_string())
                            .with_fallback_url(artifact_url);
                        registry.fail_item(task_id, item.id, error)?;
                    }
                }
            }
            PollOutcome::Failed { kind, reason, .. } => {
                registry.fail_item(task_id, item.id, ItemError::new(kind, reason))?;
            }
            PollOutcome::TimedOut { polls } => {
                let message = format!("no terminal provider status after {polls} polls");
                registry.fail_item(
                    task_id,
                    item.id,
                    ItemError::new(ItemErrorKind::TimedOut, message),
                )?;
            }
        }
        Ok(())
    }
}
