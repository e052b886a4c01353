//! Job monitor
//!
//! One tick re-queries every registered job and moves it through the
//! monitor's per-job state machine:
//!
//! ```text
//! Unmonitored -> Monitored(non-terminal) -> ... -> terminal: notify -> Unmonitored
//! ```
//!
//! Terminal states are absorbing. An entry leaves the registry only after
//! its completion notification was accepted by the push channel; failed
//! queries and failed deliveries leave it in place for the next tick.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::repository::{PushChannel, SchedulerRepository};
use crate::service::notification::completion_message;
use crate::service::registry::JobRegistry;
use greenboy_core::domain::job::{JobRecord, JobState};
use greenboy_core::domain::monitor::MonitorEntry;

/// What a tick decides for one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The scheduler could not be asked; try again next tick
    Skip,
    /// Same state as last observed
    Unchanged,
    /// Moved to another non-terminal state
    Advance(JobState),
    /// Reached a terminal state; notify and stop monitoring
    Notify(JobState),
}

impl Transition {
    /// Transition for an entry last seen in `last`, now observed as `current`
    ///
    /// `None` means the query failed.
    pub fn classify(last: JobState, current: Option<JobState>) -> Self {
        match current {
            None => Transition::Skip,
            Some(state) if state.is_terminal() => Transition::Notify(state),
            Some(state) if state == last => Transition::Unchanged,
            Some(state) => Transition::Advance(state),
        }
    }
}

/// Counts of what happened during one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub visited: usize,
    pub skipped: usize,
    pub advanced: usize,
    pub notified: usize,
    pub delivery_failures: usize,
}

/// Polls monitored jobs and pushes completion notifications
pub struct JobMonitor {
    scheduler: Arc<dyn SchedulerRepository>,
    push: Arc<dyn PushChannel>,
    failure_threshold: u32,
    delivery_failures: HashMap<String, u32>,
}

impl JobMonitor {
    pub fn new(
        scheduler: Arc<dyn SchedulerRepository>,
        push: Arc<dyn PushChannel>,
        failure_threshold: u32,
    ) -> Self {
        Self {
            scheduler,
            push,
            failure_threshold,
            delivery_failures: HashMap::new(),
        }
    }

    /// Runs one pass over a snapshot of the registry
    pub async fn tick(&mut self, registry: &mut JobRegistry) -> TickReport {
        let mut report = TickReport::default();
        let entries = registry.snapshot();

        if !entries.is_empty() {
            debug!("Checking {} monitored job(s)", entries.len());
        }

        for entry in entries {
            report.visited += 1;

            let record = match self.scheduler.job_details(&entry.job_id).await {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(job_id = %entry.job_id, "Skipping job this tick: {}", e);
                    None
                }
            };

            let transition =
                Transition::classify(entry.last_observed_state, record.as_ref().map(|r| r.state));

            match (transition, record) {
                (Transition::Skip, _) => report.skipped += 1,
                (Transition::Unchanged, _) => {}
                (Transition::Advance(state), _) => {
                    info!(
                        job_id = %entry.job_id,
                        "Job moved from {} to {}",
                        entry.last_observed_state,
                        state
                    );
                    if let Err(e) = registry.update_state(&entry.job_id, state) {
                        error!(job_id = %entry.job_id, "Failed to persist job state: {}", e);
                    }
                    report.advanced += 1;
                }
                (Transition::Notify(_), Some(record)) => {
                    if self.notify(registry, &entry, &record).await {
                        report.notified += 1;
                    } else {
                        report.delivery_failures += 1;
                    }
                }
                (Transition::Notify(_), None) => report.skipped += 1,
            }
        }

        // Counters of jobs unsubscribed while failing
        self.delivery_failures
            .retain(|job_id, _| registry.get(job_id).is_some());

        report
    }

    /// Delivers the completion message; `true` once the entry is gone
    async fn notify(
        &mut self,
        registry: &mut JobRegistry,
        entry: &MonitorEntry,
        record: &JobRecord,
    ) -> bool {
        let usage = self.scheduler.resource_usage(record).await;
        let message = completion_message(record, usage.as_ref());

        if let Err(e) = self.push.send(entry.delivery_target, &message).await {
            let failures = self
                .delivery_failures
                .entry(entry.job_id.clone())
                .or_insert(0);
            *failures += 1;

            if *failures >= self.failure_threshold {
                error!(
                    job_id = %entry.job_id,
                    chat_id = entry.delivery_target,
                    failures = *failures,
                    "Completion notification keeps failing: {}",
                    e
                );
            } else {
                warn!(
                    job_id = %entry.job_id,
                    chat_id = entry.delivery_target,
                    "Failed to send completion notification, will retry: {}",
                    e
                );
            }
            return false;
        }

        self.delivery_failures.remove(&entry.job_id);
        info!(
            job_id = %entry.job_id,
            user_id = entry.subscriber_id,
            "Notified completion ({})",
            record.display_state()
        );

        if let Err(e) = registry.remove(&entry.job_id) {
            error!(job_id = %entry.job_id, "Failed to persist removal: {}", e);
        }
        true
    }

    /// Consecutive failed deliveries for a job
    pub fn delivery_failures(&self, job_id: &str) -> u32 {
        self.delivery_failures.get(job_id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::{FakeScheduler, Pushed, RecordingChannel};
    use crate::service::{Authorizer, SubscribeOutcome, SubscriptionService};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        registry: JobRegistry,
        scheduler: Arc<FakeScheduler>,
        channel: Arc<RecordingChannel>,
        monitor: JobMonitor,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let registry = JobRegistry::load(dir.path().join("jobs.json")).unwrap();
        let scheduler = Arc::new(FakeScheduler::new());
        let channel = Arc::new(RecordingChannel::new());
        let monitor = JobMonitor::new(scheduler.clone(), channel.clone(), 3);
        Harness {
            _dir: dir,
            registry,
            scheduler,
            channel,
            monitor,
        }
    }

    #[test]
    fn test_classify() {
        use JobState::*;

        assert_eq!(Transition::classify(Running, None), Transition::Skip);
        assert_eq!(
            Transition::classify(Running, Some(Running)),
            Transition::Unchanged
        );
        assert_eq!(
            Transition::classify(Pending, Some(Running)),
            Transition::Advance(Running)
        );
        assert_eq!(
            Transition::classify(Running, Some(Timeout)),
            Transition::Notify(Timeout)
        );
        assert_eq!(
            Transition::classify(Running, Some(Unknown)),
            Transition::Advance(Unknown)
        );
    }

    #[tokio::test]
    async fn test_pending_running_completed() {
        let mut h = harness();
        h.scheduler.set_state("111", "train", "PENDING");
        let subscriptions = SubscriptionService::new(h.scheduler.clone(), Authorizer::default());
        let outcome = subscriptions
            .subscribe(&mut h.registry, "111", 7, 70)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SubscribeOutcome::Accepted {
                job_id: "111".to_string(),
                state: "PENDING".to_string(),
            }
        );
        assert_eq!(
            h.registry.get("111").unwrap().last_observed_state,
            JobState::Pending
        );

        h.scheduler.set_state("111", "train", "RUNNING");
        let report = h.monitor.tick(&mut h.registry).await;
        assert_eq!(report.advanced, 1);
        assert_eq!(
            h.registry.get("111").unwrap().last_observed_state,
            JobState::Running
        );
        assert!(h.channel.pushed().is_empty());

        h.scheduler.set_state("111", "train", "COMPLETED");
        h.scheduler.set_usage("111", &[("ExitCode", "0:0")]);
        let report = h.monitor.tick(&mut h.registry).await;
        assert_eq!(report.notified, 1);
        assert!(h.registry.is_empty());

        let pushed = h.channel.pushed();
        assert_eq!(pushed.len(), 1);
        let Pushed::Sent { target, message } = &pushed[0] else {
            panic!("expected a sent message, got {:?}", pushed[0]);
        };
        assert_eq!(*target, 70);
        assert!(message.text.contains("*Job ID:* 111"));
        assert!(message.text.contains("✅ *Job completed successfully*"));
    }

    #[tokio::test]
    async fn test_failed_delivery_keeps_entry() {
        let mut h = harness();
        h.scheduler.set_state("222", "eval", "FAILED");
        h.registry
            .upsert(MonitorEntry::new("222", 7, 70, JobState::Running))
            .unwrap();

        h.channel.set_failing(true);
        for _ in 0..3 {
            let report = h.monitor.tick(&mut h.registry).await;
            assert_eq!(report.delivery_failures, 1);
        }
        assert!(h.registry.get("222").is_some());
        assert_eq!(h.monitor.delivery_failures("222"), 3);

        h.channel.set_failing(false);
        let report = h.monitor.tick(&mut h.registry).await;
        assert_eq!(report.notified, 1);
        assert!(h.registry.get("222").is_none());
        assert_eq!(h.monitor.delivery_failures("222"), 0);
    }

    #[tokio::test]
    async fn test_query_failure_skips_entry() {
        let mut h = harness();
        h.scheduler
            .fail("333", "slurm_load_jobs error: Socket timed out");
        h.registry
            .upsert(MonitorEntry::new("333", 7, 70, JobState::Running))
            .unwrap();

        let report = h.monitor.tick(&mut h.registry).await;

        assert_eq!(report.skipped, 1);
        assert_eq!(
            h.registry.get("333").unwrap().last_observed_state,
            JobState::Running
        );
        assert!(h.channel.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_unchanged_state_is_quiet() {
        let mut h = harness();
        h.scheduler.set_state("444", "sim", "RUNNING");
        h.registry
            .upsert(MonitorEntry::new("444", 7, 70, JobState::Running))
            .unwrap();

        let report = h.monitor.tick(&mut h.registry).await;

        assert_eq!(
            report,
            TickReport {
                visited: 1,
                ..Default::default()
            }
        );
        assert!(h.channel.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribed_job_drops_failure_count() {
        let mut h = harness();
        h.scheduler.set_state("555", "tune", "COMPLETED");
        h.registry
            .upsert(MonitorEntry::new("555", 7, 70, JobState::Running))
            .unwrap();

        h.channel.set_failing(true);
        h.monitor.tick(&mut h.registry).await;
        assert_eq!(h.monitor.delivery_failures("555"), 1);

        h.registry.remove("555").unwrap();
        let report = h.monitor.tick(&mut h.registry).await;

        assert_eq!(report.visited, 0);
        assert_eq!(h.monitor.delivery_failures("555"), 0);
    }
}
