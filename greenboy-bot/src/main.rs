//! Green-Boy
//!
//! A chat bot that fronts the Slurm command line for one operator and
//! notifies subscribers when their jobs finish.
//!
//! Architecture:
//! - Configuration: flags and environment, scoped by operator identity
//! - Guard: one instance per operator (lock file + loopback port)
//! - Repositories: Slurm commands and the chat gateway's push side
//! - Services: registry, subscriptions, notifications, webhook hygiene
//! - Scheduler: update poller and job monitor
//! - Bot: command handlers and the event loop that serializes them
//!
//! The event loop owns the job registry. Chat updates and monitor ticks are
//! handled one at a time on it, so no registry state is shared.

mod bot;
mod config;
mod error;
mod guard;
mod repository;
mod scheduler;
mod service;
mod shutdown;
mod slurm;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::{EventLoop, Handlers, LoopExit};
use crate::config::{Cli, Config};
use crate::guard::{InstanceGuard, Reclaimer};
use crate::repository::{PushChannel, SchedulerRepository, SlurmRepository, TelegramPushChannel};
use crate::scheduler::JobMonitor;
use crate::service::{Authorizer, JobRegistry, WebhookJanitor};
use crate::shutdown::install_shutdown_handler;
use crate::slurm::ProcessExecutor;
use greenboy_client::BotClient;

/// Process name other instances are recognized by
const PROGRAM_NAME: &str = "green-boy";

/// Bound on the final webhook cleanup during shutdown
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "green_boy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Green-Boy");

    let config = Config::from_cli(Cli::parse())?;
    config.validate().context("Invalid configuration")?;
    info!(
        "Loaded configuration: operator={}, lock_file={}, registry={}, guard_port={}",
        config.operator,
        config.lock_file.display(),
        config.registry_file.display(),
        config.guard_port
    );

    // Long polls hold the request open for poll_timeout on top of the
    // regular request budget
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout + config.poll_timeout)
        .build()
        .context("Failed to build HTTP client")?;
    let client = BotClient::with_client(&config.api_url, &config.bot_token, http);

    let reclaimer = Reclaimer::new(
        PROGRAM_NAME,
        &config.operator,
        &config.lock_file,
        config.guard_port,
    );
    reclaim(&reclaimer).await;

    let mut guard = InstanceGuard::new(&config.lock_file, config.guard_port);
    if !guard.acquire() {
        anyhow::bail!(
            "Another instance is already running for operator {} (lock {}, port {})",
            config.operator,
            guard.lock_path().display(),
            guard.port()
        );
    }
    info!("Instance guard acquired");

    let shutdown = install_shutdown_handler().context("Failed to install signal handlers")?;

    let mut registry = JobRegistry::load(&config.registry_file)
        .context("Failed to load the monitored jobs registry")?;

    // Initialize repositories and services
    let executor = Arc::new(ProcessExecutor::new(config.command_timeout));
    let scheduler: Arc<dyn SchedulerRepository> = Arc::new(SlurmRepository::new(executor));
    let push: Arc<dyn PushChannel> = Arc::new(TelegramPushChannel::new(client.clone()));

    let authorizer = Authorizer::new(config.authorized_users.iter().copied());
    if authorizer.allows_everyone() {
        warn!("No authorized users configured, every chat user may operate the bot");
    } else {
        info!("{} authorized user(s)", config.authorized_users.len());
    }

    let handlers = Handlers::new(
        scheduler.clone(),
        push.clone(),
        authorizer,
        shutdown.clone(),
    );
    let monitor = JobMonitor::new(scheduler, push, config.notify_failure_threshold);
    let mut event_loop = EventLoop::new(
        handlers,
        monitor,
        client.clone(),
        &config,
        shutdown.clone(),
    );

    let startup = Startup {
        max_attempts: config.max_startup_attempts,
        client: &client,
        janitor: WebhookJanitor::new(config.webhook_settle),
        reclaimer: &reclaimer,
        shutdown: &shutdown,
    };
    let result = startup
        .run(&mut event_loop, &mut registry, &mut guard)
        .await;

    info!("Shutting down");
    guard.release();
    match tokio::time::timeout(CLEANUP_TIMEOUT, client.delete_webhook(true)).await {
        Ok(Ok(_)) => info!("Webhook cleanup done"),
        Ok(Err(e)) => warn!("Webhook cleanup failed: {}", e),
        Err(_) => warn!("Webhook cleanup timed out"),
    }

    if let Err(e) = &result {
        error!("Green-Boy stopped with an error: {:#}", e);
    } else {
        info!("Green-Boy stopped");
    }
    result
}

/// Runs the forced reclaim off the async runtime
async fn reclaim(reclaimer: &Reclaimer) {
    let reclaimer = reclaimer.clone();
    match tokio::task::spawn_blocking(move || reclaimer.force_reclaim()).await {
        Ok(report) => info!(
            terminated = report.terminated.len(),
            killed = report.killed.len(),
            port_freed = report.port_freed,
            lock_removed = report.lock_removed,
            "Reclaim finished"
        ),
        Err(e) => warn!("Reclaim task failed: {}", e),
    }
}

/// Wait before the next startup attempt
///
/// Conflicts back off longer to give the other poller time to die.
fn retry_delay(conflict: bool, attempt: u32) -> Duration {
    if conflict {
        Duration::from_secs(120 + 60 * u64::from(attempt))
    } else {
        Duration::from_secs(30 + 30 * u64::from(attempt))
    }
}

/// Bounded retry around webhook cleanup, identity check and the event loop
struct Startup<'a> {
    max_attempts: u32,
    client: &'a BotClient,
    janitor: WebhookJanitor,
    reclaimer: &'a Reclaimer,
    shutdown: &'a CancellationToken,
}

impl Startup<'_> {
    async fn run(
        &self,
        event_loop: &mut EventLoop,
        registry: &mut JobRegistry,
        guard: &mut InstanceGuard,
    ) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }
            info!("Startup attempt {}/{}", attempt, self.max_attempts);

            if !self.janitor.clean(self.client).await {
                warn!("Webhook could not be verified as removed, polling anyway");
            }

            let (conflict, reason) = match self.client.get_me().await {
                Ok(me) => {
                    info!("Connected as {}", me.display_name());
                    match event_loop.run(registry).await {
                        LoopExit::Shutdown => return Ok(()),
                        LoopExit::Conflict(e) => (true, e.to_string()),
                        LoopExit::PollerStopped => (false, "update poller stopped".to_string()),
                    }
                }
                Err(e) => (e.is_conflict(), e.to_string()),
            };

            if attempt == self.max_attempts {
                anyhow::bail!(
                    "Giving up after {} startup attempts: {}",
                    self.max_attempts,
                    reason
                );
            }

            if conflict {
                warn!("Another poller is using this bot token: {}", reason);
                guard.release();
                reclaim(self.reclaimer).await;
                guard
                    .try_acquire()
                    .context("Could not re-acquire the instance guard after reclaim")?;
            } else {
                warn!("Startup attempt {} failed: {}", attempt, reason);
            }

            let delay = retry_delay(conflict, attempt);
            info!("Retrying in {:?}", delay);
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        Ok(())
    }
}
