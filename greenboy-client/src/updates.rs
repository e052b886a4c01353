//! Update polling and webhook endpoints

use std::time::Duration;

use crate::BotClient;
use crate::error::Result;
use greenboy_core::dto::telegram::{DeleteWebhook, GetUpdates, Update, User, WebhookInfo};

/// Extra time on top of the long-poll timeout before the HTTP call gives up
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

impl BotClient {
    // =============================================================================
    // Identity
    // =============================================================================

    /// Get the bot's own account
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({}), None).await
    }

    // =============================================================================
    // Updates
    // =============================================================================

    /// Long-poll for incoming updates
    ///
    /// Blocks on the gateway for up to `req.timeout` seconds. A 409 error
    /// here means another process is polling with the same token.
    pub async fn get_updates(&self, req: &GetUpdates) -> Result<Vec<Update>> {
        let timeout = Duration::from_secs(req.timeout) + LONG_POLL_GRACE;
        self.call("getUpdates", req, Some(timeout)).await
    }

    /// Acknowledge and discard everything queued so far
    ///
    /// Returns the number of updates that were dropped.
    pub async fn drain_pending_updates(&self) -> Result<usize> {
        let last = self
            .get_updates(&GetUpdates {
                offset: Some(-1),
                limit: Some(1),
                timeout: 0,
                allowed_updates: Vec::new(),
            })
            .await?;

        let Some(update) = last.last() else {
            return Ok(0);
        };

        self.get_updates(&GetUpdates {
            offset: Some(update.update_id + 1),
            limit: Some(1),
            timeout: 0,
            allowed_updates: Vec::new(),
        })
        .await?;

        Ok(last.len())
    }

    // =============================================================================
    // Webhooks
    // =============================================================================

    /// Remove any webhook so that long polling is allowed
    ///
    /// # Arguments
    /// * `drop_pending_updates` - also discard updates queued on the gateway
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool> {
        self.call(
            "deleteWebhook",
            &DeleteWebhook {
                drop_pending_updates,
            },
            None,
        )
        .await
    }

    /// Get the currently configured webhook, if any
    pub async fn get_webhook_info(&self) -> Result<WebhookInfo> {
        self.call("getWebhookInfo", &serde_json::json!({}), None)
            .await
    }
}
