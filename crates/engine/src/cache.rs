//! Per-task transfer cache keyed by `(provider_task_id, source_url)`.
//!
//! Lookup-then-populate is one step: concurrent callers for the same key
//! share a single in-flight transfer. A failed or abandoned transfer leaves
//! no slot behind, so the next caller retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use genflow_core::ArtifactRef;
use tokio::sync::OnceCell;
use tokio::time::Instant;

type CacheKey = (String, String);

#[derive(Debug)]
struct Slot {
    cell: OnceCell<(ArtifactRef, Instant)>,
}

impl Slot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.cell
            .get()
            .is_some_and(|(_, stored_at)| now.duration_since(*stored_at) >= ttl)
    }
}

#[derive(Debug)]
pub struct TransferCache {
    ttl: Duration,
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
}

impl TransferCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cached artifact for the key, if present and fresh.
    pub fn get(&self, provider_task_id: &str, source_url: &str) -> Option<ArtifactRef> {
        let now = Instant::now();
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&(provider_task_id.to_string(), source_url.to_string()))
            .filter(|slot| !slot.is_expired(self.ttl, now))
            .and_then(|slot| slot.cell.get())
            .map(|(artifact, _)| artifact.clone())
    }

    /// Return the cached artifact or run `transfer` exactly once for the key.
    pub async fn get_or_transfer<F, Fut, E>(
        &self,
        provider_task_id: &str,
        source_url: &str,
        transfer: F,
    ) -> Result<ArtifactRef, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ArtifactRef, E>>,
    {
        let key = (provider_task_id.to_string(), source_url.to_string());
        let slot = {
            let now = Instant::now();
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.retain(|_, slot| {
                if slot.cell.initialized() {
                    !slot.is_expired(self.ttl, now)
                } else {
                    // Empty and held by nobody else: its transfer was dropped.
                    Arc::strong_count(slot) > 1
                }
            });
            slots
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Slot::new()))
                .clone()
        };

        let outcome = slot
            .cell
            .get_or_try_init(|| async move {
                let artifact = transfer().await?;
                Ok::<_, E>((artifact, Instant::now()))
            })
            .await
            .map(|(artifact, _)| artifact.clone());
        if outcome.is_err() {
            self.discard_failed(&key, &slot);
        }
        outcome
    }

    /// Drop a slot whose transfer failed, unless another caller is still
    /// waiting on it and will retry the init itself.
    fn discard_failed(&self, key: &CacheKey, slot: &Arc<Slot>) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let same_slot = slots.get(key).is_some_and(|held| Arc::ptr_eq(held, slot));
        if same_slot && !slot.cell.initialized() && Arc::strong_count(slot) <= 2 {
            slots.remove(key);
        }
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|slot| slot.cell.initialized() && !slot.is_expired(self.ttl, now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genflow_core::ArtifactCategory;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn artifact(name: &str) -> ArtifactRef {
        ArtifactRef {
            public_url: format!("https://cdn.example/images/generated/{name}"),
            storage_path: format!("images/generated/{name}"),
            category: ArtifactCategory::Generated,
            filename: name.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_transfer() {
        let cache = TransferCache::new(Duration::from_secs(1800));
        let calls = AtomicU32::new(0);

        let transfer = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, String>(artifact("a.png"))
        };

        let (first, second) = tokio::join!(
            cache.get_or_transfer("job-1", "https://provider/a.png", transfer),
            cache.get_or_transfer("job-1", "https://provider/a.png", transfer),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_not_cached() {
        let cache = TransferCache::new(Duration::from_secs(1800));

        let err = cache
            .get_or_transfer("job-1", "https://provider/a.png", || async {
                Err::<ArtifactRef, _>("all strategies failed".to_string())
            })
            .await;
        assert!(err.is_err());
        assert!(cache.get("job-1", "https://provider/a.png").is_none());
        assert_eq!(cache.slot_count(), 0);

        let ok = cache
            .get_or_transfer("job-1", "https://provider/a.png", || async {
                Ok::<_, String>(artifact("a.png"))
            })
            .await
            .unwrap();
        assert_eq!(cache.get("job-1", "https://provider/a.png"), Some(ok));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_slot_survives_while_a_waiter_retries_it() {
        let cache = TransferCache::new(Duration::from_secs(1800));

        let failing = async {
            cache
                .get_or_transfer("job-1", "u", || async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Err::<ArtifactRef, _>("reset".to_string())
                })
                .await
        };
        let waiting = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache
                .get_or_transfer("job-1", "u", || async { Ok::<_, String>(artifact("a.png")) })
                .await
        };
        let (failed, waited) = tokio::join!(failing, waiting);

        assert!(failed.is_err());
        assert_eq!(waited.unwrap(), artifact("a.png"));
        assert_eq!(cache.slot_count(), 1);
        assert_eq!(cache.get("job-1", "u"), Some(artifact("a.png")));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_transfers_are_pruned() {
        let cache = TransferCache::new(Duration::from_secs(1800));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            cache.get_or_transfer("job-1", "slow", || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, String>(artifact("slow.png"))
            }),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cache.slot_count(), 1);

        cache
            .get_or_transfer("job-1", "other", || async { Ok::<_, String>(artifact("b.png")) })
            .await
            .unwrap();
        assert_eq!(cache.slot_count(), 1);
        assert!(cache.get("job-1", "slow").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = TransferCache::new(Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let transfer = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(artifact("a.png"))
        };

        cache.get_or_transfer("job-1", "u", transfer).await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.get_or_transfer("job-1", "u", transfer).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.get("job-1", "u").is_none());
        cache.get_or_transfer("job-1", "u", transfer).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keys_are_distinct_per_source() {
        let cache = TransferCache::new(Duration::from_secs(60));
        let a = cache
            .get_or_transfer("job-1", "u1", || async { Ok::<_, String>(artifact("a.png")) })
            .await
            .unwrap();
        let b = cache
            .get_or_transfer("job-1", "u2", || async { Ok::<_, String>(artifact("b.png")) })
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }
}
