//! Update poller
//!
//! Long-polls the chat gateway and forwards every update to the event loop
//! over a channel. The poller never touches the registry; it only feeds
//! the single event path that does.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use greenboy_client::{BotClient, ClientError};
use greenboy_core::dto::telegram::{GetUpdates, Update};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// What the poller hands to the event loop
#[derive(Debug)]
pub enum PollEvent {
    Update(Box<Update>),
    /// Another process is polling with the same bot token; the poller stopped
    Conflict(ClientError),
}

/// Long-poll loop for incoming updates
pub struct UpdatePoller {
    client: BotClient,
    poll_timeout: Duration,
    events: mpsc::Sender<PollEvent>,
    shutdown: CancellationToken,
}

impl UpdatePoller {
    pub fn new(
        client: BotClient,
        poll_timeout: Duration,
        events: mpsc::Sender<PollEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            poll_timeout,
            events,
            shutdown,
        }
    }

    /// Polls until cancelled, until the receiver goes away, or until a
    /// conflict is reported
    pub async fn run(self) {
        info!("Starting update poller (timeout: {:?})", self.poll_timeout);

        let mut offset: Option<i64> = None;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            let request = GetUpdates {
                offset,
                limit: None,
                timeout: self.poll_timeout.as_secs(),
                allowed_updates: vec!["message".to_string(), "callback_query".to_string()],
            };

            let result = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("Update poller cancelled");
                    return;
                }
                result = self.client.get_updates(&request) => result,
            };

            match result {
                Ok(updates) => {
                    backoff = INITIAL_BACKOFF;
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        if self
                            .events
                            .send(PollEvent::Update(Box::new(update)))
                            .await
                            .is_err()
                        {
                            debug!("Event loop gone, stopping update poller");
                            return;
                        }
                    }
                }
                Err(e) if e.is_conflict() => {
                    error!("Update polling conflict: {}", e);
                    let _ = self.events.send(PollEvent::Conflict(e)).await;
                    return;
                }
                Err(e) => {
                    if e.is_not_found() {
                        error!("Gateway does not know this bot, check the token: {}", e);
                    } else if e.is_client_error() {
                        error!("Update request rejected: {}", e);
                    } else if e.is_network() {
                        warn!("Failed to fetch updates: {}", e);
                    } else {
                        error!("Unexpected answer while fetching updates: {}", e);
                    }
                    warn!("Retrying in {} ms...", backoff.as_millis());

                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(backoff) => {}
                    }

                    // Exponential backoff with cap
                    backoff = next_backoff(backoff);
                }
            }
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(MAX_BACKOFF)
}
