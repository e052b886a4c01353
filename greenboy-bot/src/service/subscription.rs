//! Subscription service
//!
//! Adds, removes and lists monitor entries on behalf of chat users.
//! Subscribing always asks the scheduler for the job's current state;
//! cached registry state is never trusted for that decision.

use std::sync::Arc;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::repository::SchedulerRepository;
use crate::service::auth::Authorizer;
use crate::service::registry::JobRegistry;
use greenboy_core::domain::job::normalize_job_id;
use greenboy_core::domain::monitor::{DeliveryTarget, MonitorEntry, SubscriberId};

/// Result of a subscribe request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Accepted { job_id: String, state: String },
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Input does not start with a job number
    InvalidJobId(String),
    /// The scheduler does not know the job or could not be asked
    NotFound { job_id: String, message: String },
    /// The job already reached a terminal state
    AlreadyFinished { job_id: String, state: String },
}

/// Result of an unsubscribe request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsubscribeOutcome {
    Removed(String),
    NotFound(String),
    Forbidden(String),
}

pub struct SubscriptionService {
    scheduler: Arc<dyn SchedulerRepository>,
    authorizer: Authorizer,
}

impl SubscriptionService {
    pub fn new(scheduler: Arc<dyn SchedulerRepository>, authorizer: Authorizer) -> Self {
        Self {
            scheduler,
            authorizer,
        }
    }

    /// Starts monitoring a job for `subscriber`, notifying `target`
    ///
    /// Re-subscribing a monitored job replaces its entry.
    pub async fn subscribe(
        &self,
        registry: &mut JobRegistry,
        raw_job_id: &str,
        subscriber: SubscriberId,
        target: DeliveryTarget,
    ) -> Result<SubscribeOutcome, RegistryError> {
        let Some(job_id) = normalize_job_id(raw_job_id) else {
            return Ok(SubscribeOutcome::Rejected(RejectReason::InvalidJobId(
                raw_job_id.to_string(),
            )));
        };

        let record = match self.scheduler.job_details(&job_id).await {
            Ok(record) => record,
            Err(e) => {
                return Ok(SubscribeOutcome::Rejected(RejectReason::NotFound {
                    job_id,
                    message: e.user_message(),
                }));
            }
        };

        if record.state.is_terminal() {
            return Ok(SubscribeOutcome::Rejected(RejectReason::AlreadyFinished {
                job_id,
                state: record.display_state().to_string(),
            }));
        }

        registry.upsert(MonitorEntry::new(
            job_id.clone(),
            subscriber,
            target,
            record.state,
        ))?;
        info!(job_id = %job_id, user_id = subscriber, "Now monitoring job");

        Ok(SubscribeOutcome::Accepted {
            job_id,
            state: record.display_state().to_string(),
        })
    }

    /// Stops monitoring a job
    ///
    /// Only the original subscriber or an authorized operator may do this.
    pub fn unsubscribe(
        &self,
        registry: &mut JobRegistry,
        raw_job_id: &str,
        requester: SubscriberId,
    ) -> Result<UnsubscribeOutcome, RegistryError> {
        let job_id = normalize_job_id(raw_job_id).unwrap_or_else(|| raw_job_id.to_string());

        let Some(entry) = registry.get(&job_id) else {
            return Ok(UnsubscribeOutcome::NotFound(job_id));
        };

        if entry.subscriber_id != requester && !self.authorizer.is_authorized(requester) {
            warn!(job_id = %job_id, user_id = requester, "Unauthorized unmonitor attempt");
            return Ok(UnsubscribeOutcome::Forbidden(job_id));
        }

        registry.remove(&job_id)?;
        info!(job_id = %job_id, user_id = requester, "Stopped monitoring job");
        Ok(UnsubscribeOutcome::Removed(job_id))
    }

    /// Entries visible to `requester`: their own, or all for operators
    pub fn list(&self, registry: &JobRegistry, requester: SubscriberId) -> Vec<MonitorEntry> {
        let sees_all = self.authorizer.is_authorized(requester);
        registry
            .entries()
            .filter(|entry| sees_all || entry.subscriber_id == requester)
            .cloned()
            .collect()
    }
}
