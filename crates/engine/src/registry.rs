//! In-memory task registry.
//!
//! The registry is the single owner of task state. Each task sits behind its
//! own mutex; the outer map lock is only held to look entries up. Every
//! mutation goes through a registry method, which also publishes the
//! matching [`ProgressEvent`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use genflow_core::{
    ArtifactRef, GenerationItem, ItemError, ItemId, ItemProgress, ItemStatus, TaskId,
    TaskProgress, TaskStatus,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::batch::{batch_count, batch_range};
use crate::cache::TransferCache;
use crate::error::RegistryError;
use crate::events::ProgressEvent;

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// How long a finished task stays queryable.
    pub task_ttl: Duration,
    /// Transfer cache entry lifetime.
    pub transfer_cache_ttl: Duration,
    /// Broadcast buffer; slow subscribers lag past this.
    pub event_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            task_ttl: Duration::from_secs(3600),
            transfer_cache_ttl: Duration::from_secs(1800),
            event_capacity: 1024,
        }
    }
}

/// What the runner should do at a batch boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStep {
    Run {
        index: usize,
        items: Vec<GenerationItem>,
    },
    /// Paused; the runner exits and `resume` starts a new one.
    Parked,
    /// Every batch ran; the task is now terminal.
    Finished(TaskStatus),
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    paused: bool,
    runner_active: bool,
    batch_size: usize,
    current_batch_index: usize,
    items: Vec<GenerationItem>,
    progress: Vec<ItemProgress>,
    index: HashMap<ItemId, usize>,
    results: HashMap<ItemId, ArtifactRef>,
}

impl TaskState {
    fn total_batches(&self) -> usize {
        batch_count(self.items.len(), self.batch_size)
    }

    fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    fn snapshot(&self, task_id: TaskId) -> TaskProgress {
        let count = |status: ItemStatus| self.progress.iter().filter(|p| p.status == status).count();
        TaskProgress {
            task_id,
            status: self.status,
            paused: self.paused,
            total_batches: self.total_batches(),
            current_batch_index: self.current_batch_index,
            total_items: self.items.len(),
            pending: count(ItemStatus::Pending),
            generating: count(ItemStatus::Generating),
            completed: count(ItemStatus::Completed),
            failed: count(ItemStatus::Error),
            items: self.progress.clone(),
        }
    }

    fn task_event(&self, task_id: TaskId) -> ProgressEvent {
        ProgressEvent::Task {
            task_id,
            status: self.status,
            paused: self.paused,
            current_batch_index: self.current_batch_index,
        }
    }
}

struct TaskEntry {
    state: Mutex<TaskState>,
    transfers: Arc<TransferCache>,
}

impl TaskEntry {
    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-lifetime store of tasks, item progress and transfer caches.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Arc<TaskEntry>>>,
    events: broadcast::Sender<ProgressEvent>,
    config: RegistryConfig,
}

impl TaskRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            tasks: RwLock::new(HashMap::new()),
            events,
            config,
        }
    }

    pub fn arc(config: RegistryConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Subscribe to progress events of every task.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Register a new running task. The caller is expected to start its runner.
    pub fn create_task(&self, task_id: TaskId, items: Vec<GenerationItem>, batch_size: usize) {
        let progress: Vec<ItemProgress> = items.iter().map(|i| ItemProgress::pending(i.id)).collect();
        let index = items.iter().enumerate().map(|(n, i)| (i.id, n)).collect();

        let state = TaskState {
            status: TaskStatus::Running,
            paused: false,
            runner_active: true,
            batch_size: batch_size.max(1),
            current_batch_index: 0,
            items,
            progress,
            index,
            results: HashMap::new(),
        };
        let event = state.task_event(task_id);
        let entry = Arc::new(TaskEntry {
            state: Mutex::new(state),
            transfers: Arc::new(TransferCache::new(self.config.transfer_cache_ttl)),
        });

        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id, entry);
        self.publish(event);
    }

    fn entry(&self, task_id: TaskId) -> Result<Arc<TaskEntry>, RegistryError> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .cloned()
            .ok_or(RegistryError::NotFound(task_id))
    }

    fn publish(&self, event: ProgressEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.entry(task_id).is_ok()
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }

    pub fn snapshot(&self, task_id: TaskId) -> Result<TaskProgress, RegistryError> {
        let entry = self.entry(task_id)?;
        let state = entry.lock();
        Ok(state.snapshot(task_id))
    }

    /// Stored artifacts of completed items.
    pub fn results(&self, task_id: TaskId) -> Result<HashMap<ItemId, ArtifactRef>, RegistryError> {
        let entry = self.entry(task_id)?;
        let state = entry.lock();
        Ok(state.results.clone())
    }

    pub fn transfer_cache(&self, task_id: TaskId) -> Result<Arc<TransferCache>, RegistryError> {
        Ok(self.entry(task_id)?.transfers.clone())
    }

    /// Request a pause. Takes effect at the next batch boundary.
    pub fn pause(&self, task_id: TaskId) -> Result<TaskProgress, RegistryError> {
        let entry = self.entry(task_id)?;
        let (snapshot, event) = {
            let mut state = entry.lock();
            if state.is_finished() {
                return Err(RegistryError::Finished(task_id));
            }
            if state.paused {
                return Ok(state.snapshot(task_id));
            }
            state.paused = true;
            if !state.runner_active {
                state.status = TaskStatus::Paused;
            }
            (state.snapshot(task_id), state.task_event(task_id))
        };
        info!(task_id = %task_id, "pause requested");
        self.publish(event);
        Ok(snapshot)
    }

    /// Clear the pause flag. Returns `true` when the caller must start a runner.
    pub fn resume(&self, task_id: TaskId) -> Result<(TaskProgress, bool), RegistryError> {
        let entry = self.entry(task_id)?;
        let (snapshot, event, start_runner) = {
            let mut state = entry.lock();
            if state.is_finished() {
                return Err(RegistryError::Finished(task_id));
            }
            let start_runner = !state.runner_active;
            if !state.paused && !start_runner {
                return Ok((state.snapshot(task_id), false));
            }
            state.paused = false;
            state.status = TaskStatus::Running;
            if start_runner {
                state.runner_active = true;
            }
            (state.snapshot(task_id), state.task_event(task_id), start_runner)
        };
        info!(task_id = %task_id, start_runner, "task resumed");
        self.publish(event);
        Ok((snapshot, start_runner))
    }

    /// Decide the next step at a batch boundary.
    ///
    /// Pause is only observed here. Finishing schedules the task's removal
    /// after the configured TTL.
    pub fn begin_batch(self: &Arc<Self>, task_id: TaskId) -> Result<BatchStep, RegistryError> {
        let entry = self.entry(task_id)?;
        let (step, events) = {
            let mut state = entry.lock();
            if state.is_finished() {
                state.runner_active = false;
                return Ok(BatchStep::Finished(state.status));
            }

            let total = state.total_batches();
            let index = state.current_batch_index;
            match batch_range(state.items.len(), state.batch_size, index) {
                // Nothing left to run, so a pending pause has nothing to hold.
                None => {
                    let status = finalize(&mut state);
                    (BatchStep::Finished(status), vec![state.task_event(task_id)])
                }
                Some(_) if state.paused => {
                    state.runner_active = false;
                    state.status = TaskStatus::Paused;
                    (BatchStep::Parked, vec![state.task_event(task_id)])
                }
                Some(range) => {
                    let items = state.items[range].to_vec();
                    let event = ProgressEvent::Batch {
                        task_id,
                        batch_index: index,
                        total_batches: total,
                    };
                    (BatchStep::Run { index, items }, vec![event])
                }
            }
        };

        for event in events {
            self.publish(event);
        }
        if let BatchStep::Finished(status) = &step {
            info!(task_id = %task_id, status = ?status, "task finished");
            self.schedule_expiry(task_id);
        }
        Ok(step)
    }

    /// Record that batch `index` fully resolved. Returns whether batches remain.
    pub fn finish_batch(&self, task_id: TaskId, index: usize) -> Result<bool, RegistryError> {
        let entry = self.entry(task_id)?;
        let (more, event) = {
            let mut state = entry.lock();
            state.current_batch_index = state.current_batch_index.max(index + 1);
            let more = state.current_batch_index < state.total_batches();
            (more, state.task_event(task_id))
        };
        debug!(task_id = %task_id, batch = index, more, "batch finished");
        self.publish(event);
        Ok(more)
    }

    /// Apply `update` to one item; publishes when it reports a change.
    fn update_item<F>(&self, task_id: TaskId, item_id: ItemId, update: F) -> Result<bool, RegistryError>
    where
        F: FnOnce(&mut TaskState, usize) -> bool,
    {
        let entry = self.entry(task_id)?;
        let event = {
            let mut state = entry.lock();
            let Some(&pos) = state.index.get(&item_id) else {
                return Err(RegistryError::NotFound(task_id));
            };
            if !update(&mut *state, pos) {
                return Ok(false);
            }
            ProgressEvent::Item {
                task_id,
                item: state.progress[pos].clone(),
            }
        };
        self.publish(event);
        Ok(true)
    }

    pub fn mark_generating(
        &self,
        task_id: TaskId,
        item_id: ItemId,
        progress: u8,
        message: &str,
    ) -> Result<bool, RegistryError> {
        self.update_item(task_id, item_id, |state, pos| {
            let before = (state.progress[pos].status, state.progress[pos].progress);
            state.progress[pos].mark_generating(progress, message)
                && before != (state.progress[pos].status, state.progress[pos].progress)
        })
    }

    pub fn complete_item(
        &self,
        task_id: TaskId,
        item_id: ItemId,
        artifact: ArtifactRef,
    ) -> Result<bool, RegistryError> {
        self.update_item(task_id, item_id, |state, pos| {
            if !state.progress[pos].mark_completed(artifact.clone()) {
                return false;
            }
            state.results.insert(item_id, artifact);
            true
        })
    }

    pub fn fail_item(
        &self,
        task_id: TaskId,
        item_id: ItemId,
        error: ItemError,
    ) -> Result<bool, RegistryError> {
        self.update_item(task_id, item_id, |state, pos| {
            state.progress[pos].mark_error(error)
        })
    }

    /// Drop a task immediately.
    pub fn remove(&self, task_id: TaskId) -> bool {
        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&task_id)
            .is_some()
    }

    fn schedule_expiry(self: &Arc<Self>, task_id: TaskId) {
        let registry = Arc::downgrade(self);
        let ttl = self.config.task_ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(registry) = registry.upgrade() {
                if registry.remove(task_id) {
                    debug!(task_id = %task_id, "finished task expired");
                }
            }
        });
    }
}

/// Terminal status once every batch ran.
fn finalize(state: &mut TaskState) -> TaskStatus {
    for progress in state.progress.iter_mut() {
        if !progress.status.is_terminal() {
            progress.mark_error(ItemError::new(
                genflow_core::ItemErrorKind::Fatal,
                "item was not processed",
            ));
        }
    }
    let any_completed = state
        .progress
        .iter()
        .any(|p| p.status == ItemStatus::Completed);
    state.status = if any_completed || state.progress.is_empty() {
        TaskStatus::Completed
    } else {
        TaskStatus::Error
    };
    state.runner_active = false;
    state.paused = false;
    state.status
}
