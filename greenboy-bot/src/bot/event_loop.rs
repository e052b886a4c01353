//! The bot's single event loop
//!
//! Incoming updates and monitor ticks are serialized here. The loop is the
//! only place holding `&mut JobRegistry`, so handlers and the monitor never
//! see the registry change underneath them.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handlers::Handlers;
use crate::config::Config;
use crate::scheduler::{JobMonitor, PollEvent, UpdatePoller};
use crate::service::JobRegistry;
use greenboy_client::{BotClient, ClientError};

/// Updates buffered between the poller and the loop
const EVENT_BUFFER: usize = 64;

/// Why the event loop returned
#[derive(Debug)]
pub enum LoopExit {
    /// Shutdown was requested by a signal or by `/shutdown`
    Shutdown,
    /// Another instance is polling with the same token
    Conflict(ClientError),
    /// The poller ended without reporting why
    PollerStopped,
}

pub struct EventLoop {
    handlers: Handlers,
    monitor: JobMonitor,
    client: BotClient,
    poll_timeout: Duration,
    monitor_interval: Duration,
    monitor_initial_delay: Duration,
    shutdown: CancellationToken,
}

impl EventLoop {
    pub fn new(
        handlers: Handlers,
        monitor: JobMonitor,
        client: BotClient,
        config: &Config,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            handlers,
            monitor,
            client,
            poll_timeout: config.poll_timeout,
            monitor_interval: config.monitor_interval,
            monitor_initial_delay: config.monitor_initial_delay,
            shutdown,
        }
    }

    /// Runs until shutdown, a polling conflict, or the poller stopping
    ///
    /// The poller is started fresh on every call and stopped before
    /// returning, so the loop can be re-entered after a conflict.
    pub async fn run(&mut self, registry: &mut JobRegistry) -> LoopExit {
        let poller_token = self.shutdown.child_token();
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let poller = UpdatePoller::new(
            self.client.clone(),
            self.poll_timeout,
            tx,
            poller_token.clone(),
        );
        let poller_handle = tokio::spawn(poller.run());

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.monitor_initial_delay,
            self.monitor_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Event loop running (monitor every {:?}, first check in {:?})",
            self.monitor_interval, self.monitor_initial_delay
        );

        let exit = loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, leaving event loop");
                    break LoopExit::Shutdown;
                }

                _ = ticker.tick() => {
                    let report = self.monitor.tick(registry).await;
                    if report.visited > 0 {
                        debug!(?report, "Monitor tick finished");
                    }
                }

                event = rx.recv() => match event {
                    Some(PollEvent::Update(update)) => {
                        self.handlers.dispatch(registry, *update).await;
                    }
                    Some(PollEvent::Conflict(e)) => {
                        warn!("Polling conflict: {}", e);
                        break LoopExit::Conflict(e);
                    }
                    None => {
                        warn!("Update poller stopped");
                        break LoopExit::PollerStopped;
                    }
                },
            }
        };

        poller_token.cancel();
        if let Err(e) = poller_handle.await {
            warn!("Update poller task failed: {}", e);
        }

        exit
    }
}
