use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use genflow_core::{TaskId, TaskProgress};
use genflow_engine::{
    BatchScheduler, RegistryConfig, RegistryError, SchedulerConfig, TaskRegistry,
};
use genflow_infra::{
    AppConfig, StorageError, StorageRouter, TransferClient, TransferError, build_object_store,
};
use genflow_providers::{GenerationClient, ProviderError};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

/// Startup wiring failure.
#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("provider client: {0}")]
    Provider(#[from] ProviderError),
    #[error("transfer client: {0}")]
    Transfer(#[from] TransferError),
}

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppServices {
    scheduler: BatchScheduler,
}

impl AppServices {
    pub fn new(scheduler: BatchScheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }
}

/// Wire the production engine from configuration.
pub fn build_services(config: &AppConfig) -> Result<AppServices, ServicesError> {
    let registry = TaskRegistry::arc(RegistryConfig {
        task_ttl: config.task_ttl(),
        transfer_cache_ttl: config.transfer_cache_ttl(),
        ..RegistryConfig::default()
    });

    let object_store = build_object_store(&config.storage)?;
    let router = Arc::new(StorageRouter::new(config.router())?);
    let transfer = TransferClient::new(object_store, router, config.transfer())?;
    let generation = GenerationClient::new(config.generation_client())?;

    let scheduler = BatchScheduler::new(
        registry,
        Arc::new(generation),
        Arc::new(transfer),
        SchedulerConfig::default()
            .with_batch_size(config.batch.batch_size)
            .with_inter_batch_delay(config.inter_batch_delay())
            .with_default_provider(config.provider.default_provider),
    );

    tracing::info!(
        backend = ?config.storage.backend,
        default_provider = ?config.provider.default_provider,
        batch_size = config.batch.batch_size,
        "services wired"
    );
    Ok(AppServices::new(scheduler))
}

fn sse_event(kind: &'static str, payload: &impl serde::Serialize) -> SseEvent {
    let data = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default().event(kind).data(data)
}

/// Build the SSE stream for one task (used by `/tasks/:id/stream`).
///
/// Opens with a `snapshot` event, then forwards the task's progress events
/// and ends after the one that makes the task terminal.
pub fn task_sse_stream(
    services: Arc<AppServices>,
    task_id: TaskId,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>>, RegistryError> {
    // Subscribe before the snapshot so nothing falls in between.
    let rx = services.scheduler().subscribe();
    let snapshot: TaskProgress = services.scheduler().progress(task_id)?;
    let events = (!snapshot.is_finished()).then(|| BroadcastStream::new(rx));

    let updates = futures::stream::unfold(events, move |events| async move {
        let mut events = events?;
        while let Some(next) = events.next().await {
            match next {
                Ok(event) if event.task_id() == task_id => {
                    let sse = sse_event(event.kind(), &event);
                    let rest = (!event.is_final()).then_some(events);
                    return Some((Ok::<_, Infallible>(sse), rest));
                }
                Ok(_) => {}
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(task_id = %task_id, skipped, "progress stream lagged");
                }
            }
        }
        None
    });

    let stream = tokio_stream::once(Ok::<_, Infallible>(sse_event("snapshot", &snapshot))).chain(updates);
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
