//! Adaptive-interval status polling for a single provider job.
//!
//! State machine: `created → polling → {completed | failed | timed_out}`.
//! The poller never reports 100%: an item is only "done" once its artifact
//! is durably stored, which is the caller's step.

use std::time::Duration;

use genflow_core::{Classify, ItemErrorKind, ProviderKind};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::client::GenerationApi;
use crate::status::{ProviderJob, ProviderStatus};

/// Highest progress value the poller reports.
pub const MAX_POLL_PROGRESS: u8 = 95;

/// Staged polling intervals: short while a job is young, longer once it has
/// been running a while (providers cap status queries per second).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSchedule {
    /// `(last_attempt_inclusive, interval)` stages, in order.
    pub stages: Vec<(u32, Duration)>,
    /// Interval after the last stage.
    pub steady: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            stages: vec![(5, Duration::from_secs(3)), (20, Duration::from_secs(5))],
            steady: Duration::from_secs(8),
        }
    }
}

impl PollSchedule {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            stages: Vec::new(),
            steady: interval,
        }
    }

    /// Wait before poll number `attempt` (1-indexed).
    pub fn interval_for(&self, attempt: u32) -> Duration {
        self.stages
            .iter()
            .find(|(upto, _)| attempt <= *upto)
            .map(|(_, interval)| *interval)
            .unwrap_or(self.steady)
    }

    /// Number of polls that fit in a wall-clock budget.
    pub fn attempts_within(&self, budget: Duration) -> u32 {
        let mut elapsed = Duration::ZERO;
        let mut attempts = 0u32;
        loop {
            let next = self.interval_for(attempts + 1);
            if next.is_zero() || elapsed + next > budget {
                return attempts.max(1);
            }
            elapsed += next;
            attempts += 1;
        }
    }
}

/// Poller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub schedule: PollSchedule,
    /// Hard ceiling on polls; reaching it yields `TimedOut`.
    pub max_attempts: u32,
    /// Network-class query failures tolerated before giving up.
    pub max_network_failures: u32,
}

impl PollerConfig {
    /// Default budget per provider: ~5 minutes for GPT-4o-style jobs, ~3 for Flux.
    pub fn for_provider(provider: ProviderKind) -> Self {
        let budget = match provider {
            ProviderKind::Gpt4o => Duration::from_secs(300),
            ProviderKind::FluxKontext => Duration::from_secs(180),
        };
        Self::with_budget(PollSchedule::default(), budget)
    }

    pub fn with_budget(schedule: PollSchedule, budget: Duration) -> Self {
        let max_attempts = schedule.attempts_within(budget);
        Self::with_max_attempts(schedule, max_attempts)
    }

    pub fn with_max_attempts(schedule: PollSchedule, max_attempts: u32) -> Self {
        Self {
            schedule,
            max_attempts,
            max_network_failures: max_attempts / 2,
        }
    }
}

/// Poll loop state, exposed for logging and tests.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollState {
    Created,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

/// Terminal result of polling one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { artifact_url: String, polls: u32 },
    Failed { kind: ItemErrorKind, reason: String, polls: u32 },
    /// Ceiling reached without a terminal provider state. Kept distinct from
    /// `Failed`: the provider job may still finish out-of-band.
    TimedOut { polls: u32 },
}

impl PollOutcome {
    pub fn state(&self) -> PollState {
        match self {
            PollOutcome::Completed { .. } => PollState::Completed,
            PollOutcome::Failed { .. } => PollState::Failed,
            PollOutcome::TimedOut { .. } => PollState::TimedOut,
        }
    }

    pub fn polls(&self) -> u32 {
        match self {
            PollOutcome::Completed { polls, .. }
            | PollOutcome::Failed { polls, .. }
            | PollOutcome::TimedOut { polls } => *polls,
        }
    }
}

/// Drives one provider job to a terminal state.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    config: PollerConfig,
}

impl StatusPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn for_provider(provider: ProviderKind) -> Self {
        Self::new(PollerConfig::for_provider(provider))
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Poll `job` until it completes, fails, or the attempt ceiling is hit.
    ///
    /// `on_progress` is called after every successful poll with a 0-95 value.
    pub async fn run<A, F>(&self, api: &A, job: &ProviderJob, mut on_progress: F) -> PollOutcome
    where
        A: GenerationApi + ?Sized,
        F: FnMut(u8, &str) + Send,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut state = PollState::Created;
        let mut network_failures = 0u32;

        debug!(
            provider_task_id = %job.provider_task_id,
            provider = %job.provider,
            max_attempts,
            ?state,
            "status polling started"
        );

        for attempt in 1..=max_attempts {
            tokio::time::sleep(self.config.schedule.interval_for(attempt)).await;
            state = PollState::Polling;

            match api.query_status(&job.provider_task_id, job.provider).await {
                Ok(ProviderStatus::Processing { progress }) => {
                    let pct = self.estimate(progress, attempt, max_attempts);
                    on_progress(pct, "generating");
                }
                Ok(ProviderStatus::Completed { artifact_url }) => {
                    on_progress(MAX_POLL_PROGRESS, "generated, storing artifact");
                    info!(
                        provider_task_id = %job.provider_task_id,
                        polls = attempt,
                        "provider job completed"
                    );
                    return PollOutcome::Completed {
                        artifact_url,
                        polls: attempt,
                    };
                }
                Ok(ProviderStatus::Failed { reason }) => {
                    warn!(
                        provider_task_id = %job.provider_task_id,
                        polls = attempt,
                        reason = %reason,
                        "provider reported job failure"
                    );
                    return PollOutcome::Failed {
                        kind: ItemErrorKind::ProviderFailed,
                        reason,
                        polls: attempt,
                    };
                }
                Err(err) if err.class().is_retryable() => {
                    network_failures += 1;
                    warn!(
                        provider_task_id = %job.provider_task_id,
                        attempt,
                        network_failures,
                        error = %err,
                        "status query failed, retrying on next tick"
                    );
                    if network_failures > self.config.max_network_failures {
                        return PollOutcome::Failed {
                            kind: ItemErrorKind::Network,
                            reason: format!(
                                "status queries failed {network_failures} times: {err}"
                            ),
                            polls: attempt,
                        };
                    }
                }
                Err(err) => {
                    warn!(
                        provider_task_id = %job.provider_task_id,
                        attempt,
                        error = %err,
                        "status query failed fatally"
                    );
                    return PollOutcome::Failed {
                        kind: ItemErrorKind::Fatal,
                        reason: err.to_string(),
                        polls: attempt,
                    };
                }
            }
        }

        warn!(
            provider_task_id = %job.provider_task_id,
            polls = max_attempts,
            ?state,
            "status polling timed out"
        );
        PollOutcome::TimedOut {
            polls: max_attempts,
        }
    }

    fn estimate(&self, reported: Option<u8>, attempt: u32, max_attempts: u32) -> u8 {
        let span = u32::from(MAX_POLL_PROGRESS - 10);
        let pct = match reported {
            Some(p) => 10 + u32::from(p.min(100)) * span / 100,
            None => 10 + attempt * span / max_attempts,
        };
        pct.min(u32::from(MAX_POLL_PROGRESS)) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use async_trait::async_trait;
    use genflow_core::GenerationItem;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted status responses; `Processing` once the script runs out.
    struct ScriptedApi {
        script: Mutex<VecDeque<Result<ProviderStatus, ProviderError>>>,
        queries: AtomicU32,
    }

    impl ScriptedApi {
        fn new(script: Vec<Result<ProviderStatus, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                queries: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationApi for ScriptedApi {
        async fn create_job(&self, item: &GenerationItem) -> Result<ProviderJob, ProviderError> {
            Ok(ProviderJob::new("job", item.provider))
        }

        async fn query_status(
            &self,
            _provider_task_id: &str,
            _provider: ProviderKind,
        ) -> Result<ProviderStatus, ProviderError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(ProviderStatus::Processing { progress: None }))
        }
    }

    fn job() -> ProviderJob {
        ProviderJob::new("task_1", ProviderKind::Gpt4o)
    }

    fn processing() -> Result<ProviderStatus, ProviderError> {
        Ok(ProviderStatus::Processing { progress: None })
    }

    #[test]
    fn schedule_widens_over_time() {
        let schedule = PollSchedule::default();
        assert_eq!(schedule.interval_for(1), Duration::from_secs(3));
        assert_eq!(schedule.interval_for(5), Duration::from_secs(3));
        assert_eq!(schedule.interval_for(6), Duration::from_secs(5));
        assert_eq!(schedule.interval_for(20), Duration::from_secs(5));
        assert_eq!(schedule.interval_for(21), Duration::from_secs(8));
    }

    #[test]
    fn provider_budgets_translate_to_attempt_ceilings() {
        // 5x3s + 15x5s = 90s, then 8s steps.
        assert_eq!(PollerConfig::for_provider(ProviderKind::Gpt4o).max_attempts, 46);
        assert_eq!(PollerConfig::for_provider(ProviderKind::FluxKontext).max_attempts, 31);
    }

    #[tokio::test(start_paused = true)]
    async fn never_terminating_job_times_out_after_ceiling() {
        let api = ScriptedApi::new(vec![]);
        let poller = StatusPoller::new(PollerConfig::with_max_attempts(PollSchedule::default(), 3));

        let outcome = poller.run(&api, &job(), |_, _| {}).await;

        assert_eq!(outcome, PollOutcome::TimedOut { polls: 3 });
        assert_eq!(outcome.state(), PollState::TimedOut);
        assert_eq!(api.queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_is_reported_with_capped_progress() {
        let api = ScriptedApi::new(vec![
            processing(),
            Ok(ProviderStatus::Completed {
                artifact_url: "https://cdn.example/a.png".to_string(),
            }),
        ]);
        let poller = StatusPoller::for_provider(ProviderKind::Gpt4o);
        let mut seen = Vec::new();

        let outcome = poller.run(&api, &job(), |pct, _| seen.push(pct)).await;

        assert_eq!(
            outcome,
            PollOutcome::Completed {
                artifact_url: "https://cdn.example/a.png".to_string(),
                polls: 2
            }
        );
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| *p <= MAX_POLL_PROGRESS));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_do_not_fail_the_job() {
        let api = ScriptedApi::new(vec![
            Err(ProviderError::Network("connection reset".into())),
            Err(ProviderError::from_code(502, "bad gateway")),
            Ok(ProviderStatus::Completed {
                artifact_url: "https://cdn.example/a.png".to_string(),
            }),
        ]);
        let poller = StatusPoller::new(PollerConfig::with_max_attempts(PollSchedule::default(), 10));

        let outcome = poller.run(&api, &job(), |_, _| {}).await;

        assert_eq!(outcome.state(), PollState::Completed);
        assert_eq!(outcome.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn network_budget_exhaustion_fails() {
        let api = ScriptedApi::new(
            (0..10)
                .map(|_| Err(ProviderError::Network("down".into())))
                .collect(),
        );
        let poller = StatusPoller::new(PollerConfig::with_max_attempts(PollSchedule::default(), 10));

        let outcome = poller.run(&api, &job(), |_, _| {}).await;

        match outcome {
            PollOutcome::Failed { kind, polls, .. } => {
                assert_eq!(kind, ItemErrorKind::Network);
                // Half of 10 tolerated; the sixth failure gives up.
                assert_eq!(polls, 6);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_query_errors_fail_immediately() {
        let api = ScriptedApi::new(vec![Err(ProviderError::from_code(401, "bad key"))]);
        let poller = StatusPoller::for_provider(ProviderKind::FluxKontext);

        let outcome = poller.run(&api, &job(), |_, _| {}).await;

        assert!(matches!(
            outcome,
            PollOutcome::Failed {
                kind: ItemErrorKind::Fatal,
                polls: 1,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_failure_is_not_a_timeout() {
        let api = ScriptedApi::new(vec![Ok(ProviderStatus::Failed {
            reason: "generation failed".to_string(),
        })]);
        let poller = StatusPoller::for_provider(ProviderKind::FluxKontext);

        let outcome = poller.run(&api, &job(), |_, _| {}).await;

        assert_eq!(outcome.state(), PollState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_waits_the_staged_intervals() {
        let api = ScriptedApi::new(vec![]);
        let poller = StatusPoller::new(PollerConfig::with_max_attempts(PollSchedule::default(), 7));
        let started = tokio::time::Instant::now();

        poller.run(&api, &job(), |_, _| {}).await;

        // 5x3s + 2x5s
        assert_eq!(started.elapsed().as_secs(), 25);
    }
}
