//! Batch scheduler: fixed-size batches, full intra-batch concurrency,
//! cooperative pause at batch boundaries.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use genflow_core::{GenerationItem, GenerationRequest, ProviderKind, TaskId, TaskProgress};
use genflow_infra::ArtifactStore;
use genflow_providers::{GenerationApi, PollerConfig};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::batch::batch_count;
use crate::error::{RegistryError, SubmitError};
use crate::events::ProgressEvent;
use crate::pipeline::ItemPipeline;
use crate::registry::{BatchStep, TaskRegistry};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub batch_size: usize,
    /// Pause between consecutive batches of one task.
    pub inter_batch_delay: Duration,
    /// Provider for requests that do not name one.
    pub default_provider: ProviderKind,
    /// Polling override; `None` uses per-provider defaults.
    pub poller: Option<PollerConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            inter_batch_delay: Duration::from_secs(2),
            default_provider: ProviderKind::Gpt4o,
            poller: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }

    pub fn with_default_provider(mut self, provider: ProviderKind) -> Self {
        self.default_provider = provider;
        self
    }

    pub fn with_poller(mut self, poller: PollerConfig) -> Self {
        self.poller = Some(poller);
        self
    }
}

/// Inbound entry point: submit, inspect, pause and resume tasks.
#[derive(Clone)]
pub struct BatchScheduler {
    registry: Arc<TaskRegistry>,
    pipeline: Arc<ItemPipeline>,
    config: Arc<SchedulerConfig>,
}

impl BatchScheduler {
    pub fn new(
        registry: Arc<TaskRegistry>,
        api: Arc<dyn GenerationApi>,
        store: Arc<dyn ArtifactStore>,
        config: SchedulerConfig,
    ) -> Self {
        let pipeline = Arc::new(ItemPipeline::new(
            registry.clone(),
            api,
            store,
            config.poller.clone(),
        ));
        Self {
            registry,
            pipeline,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate, register and start a task.
    pub fn submit_batch(&self, requests: Vec<GenerationRequest>) -> Result<TaskId, SubmitError> {
        if requests.is_empty() {
            return Err(SubmitError::Empty);
        }
        for (index, request) in requests.iter().enumerate() {
            request.validate().map_err(|e| SubmitError::InvalidItem {
                index,
                reason: e.to_string(),
            })?;
        }

        let task_id = TaskId::new();
        let items: Vec<GenerationItem> = requests
            .into_iter()
            .map(|r| GenerationItem::from_request(task_id, r, self.config.default_provider))
            .collect();
        let total_items = items.len();

        self.registry
            .create_task(task_id, items, self.config.batch_size);
        info!(
            task_id = %task_id,
            items = total_items,
            batches = batch_count(total_items, self.config.batch_size),
            "task submitted"
        );

        self.spawn_runner(task_id);
        Ok(task_id)
    }

    pub fn progress(&self, task_id: TaskId) -> Result<TaskProgress, RegistryError> {
        self.registry.snapshot(task_id)
    }

    /// Stop before the next batch. In-flight items finish.
    pub fn pause(&self, task_id: TaskId) -> Result<TaskProgress, RegistryError> {
        self.registry.pause(task_id)
    }

    /// Continue from the first unprocessed batch.
    pub fn resume(&self, task_id: TaskId) -> Result<TaskProgress, RegistryError> {
        let (snapshot, start_runner) = self.registry.resume(task_id)?;
        if start_runner {
            self.spawn_runner(task_id);
        }
        Ok(snapshot)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.registry.subscribe()
    }

    fn spawn_runner(&self, task_id: TaskId) {
        let registry = self.registry.clone();
        let pipeline = self.pipeline.clone();
        let delay = self.config.inter_batch_delay;
        tokio::spawn(run_task(registry, pipeline, delay, task_id));
    }
}

/// Run batches until the task finishes or parks on a pause.
async fn run_task(
    registry: Arc<TaskRegistry>,
    pipeline: Arc<ItemPipeline>,
    inter_batch_delay: Duration,
    task_id: TaskId,
) {
    loop {
        let step = match registry.begin_batch(task_id) {
            Ok(step) => step,
            Err(err) => {
                warn!(task_id = %task_id, error = %err, "runner stopped");
                return;
            }
        };

        match step {
            BatchStep::Run { index, items } => {
                info!(task_id = %task_id, batch = index, items = items.len(), "batch started");
                join_all(items.into_iter().map(|item| pipeline.run(task_id, item))).await;

                match registry.finish_batch(task_id, index) {
                    Ok(true) => tokio::time::sleep(inter_batch_delay).await,
                    Ok(false) => {}
                    Err(err) => {
                        warn!(task_id = %task_id, error = %err, "runner stopped");
                        return;
                    }
                }
            }
            BatchStep::Parked => {
                info!(task_id = %task_id, "task paused at batch boundary");
                return;
            }
            BatchStep::Finished(_) => return,
        }
    }
}
