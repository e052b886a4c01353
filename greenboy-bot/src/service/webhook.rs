//! Webhook hygiene
//!
//! Long polling is refused by the gateway while a webhook is set, and a
//! previous instance may have left updates queued. The janitor clears both
//! before the event loop starts polling.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use greenboy_client::{BotClient, ClientError};

const DELETE_ATTEMPTS: u32 = 5;

/// The webhook operations the janitor needs from the gateway
#[async_trait]
pub trait WebhookGateway: Send + Sync {
    /// URL of the configured webhook; empty when none is set
    async fn webhook_url(&self) -> Result<String, ClientError>;

    async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool, ClientError>;

    /// Discards queued updates, returning how many were dropped
    async fn drain_pending_updates(&self) -> Result<usize, ClientError>;
}

#[async_trait]
impl WebhookGateway for BotClient {
    async fn webhook_url(&self) -> Result<String, ClientError> {
        Ok(self.get_webhook_info().await?.url)
    }

    async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool, ClientError> {
        BotClient::delete_webhook(self, drop_pending_updates).await
    }

    async fn drain_pending_updates(&self) -> Result<usize, ClientError> {
        BotClient::drain_pending_updates(self).await
    }
}

/// Clears webhooks and pending updates with bounded retries
#[derive(Debug, Clone)]
pub struct WebhookJanitor {
    backoff_unit: Duration,
    verify_delay: Duration,
    settle_delay: Duration,
}

impl WebhookJanitor {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            backoff_unit: Duration::from_secs(5),
            verify_delay: Duration::from_secs(3),
            settle_delay,
        }
    }

    /// Delay before retrying after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }

    /// Runs the cleanup; returns whether the webhook is confirmed gone
    ///
    /// Never fails: every step is best effort and the caller decides what a
    /// `false` means.
    pub async fn clean(&self, gateway: &dyn WebhookGateway) -> bool {
        match gateway.webhook_url().await {
            Ok(url) if url.is_empty() => debug!("No webhook currently set"),
            Ok(url) => info!("Found existing webhook: {}", url),
            Err(e) => warn!("Could not read webhook info: {}", e),
        }

        let mut cleared = false;
        for attempt in 1..=DELETE_ATTEMPTS {
            if self.delete_and_verify(gateway, attempt).await {
                cleared = true;
                break;
            }
            if attempt < DELETE_ATTEMPTS {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        if !cleared {
            warn!(
                "Failed to clean up webhook after {} attempts",
                DELETE_ATTEMPTS
            );
            return false;
        }

        match gateway.drain_pending_updates().await {
            Ok(0) => {}
            Ok(dropped) => info!("Dropped {} pending update(s)", dropped),
            Err(e) => warn!("Could not drain pending updates: {}", e),
        }

        info!(
            "Webhook cleaned up, waiting {:?} for the gateway to settle",
            self.settle_delay
        );
        tokio::time::sleep(self.settle_delay).await;
        true
    }

    async fn delete_and_verify(&self, gateway: &dyn WebhookGateway, attempt: u32) -> bool {
        debug!("Webhook deletion attempt {}/{}", attempt, DELETE_ATTEMPTS);

        match gateway.delete_webhook(true).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Webhook deletion was not acknowledged (attempt {})", attempt);
                return false;
            }
            Err(e) => {
                warn!("Webhook deletion attempt {} failed: {}", attempt, e);
                return false;
            }
        }

        tokio::time::sleep(self.verify_delay).await;

        match gateway.webhook_url().await {
            Ok(url) if url.is_empty() => {
                info!("Webhook deletion verified on attempt {}", attempt);
                true
            }
            Ok(url) => {
                warn!("Webhook {} still set after deletion, retrying", url);
                false
            }
            Err(e) => {
                warn!("Could not verify webhook deletion: {}", e);
                false
            }
        }
    }
}
