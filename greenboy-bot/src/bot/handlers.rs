//! Command and button handlers
//!
//! Every update is handled to completion on the event loop, which owns the
//! registry and lends it here as `&mut`. Replies to commands are new
//! messages; replies to button presses edit the message that carried the
//! button, and any overflow pages are sent as new messages.

use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::command::{Callback, Command};
use super::format::{self, MAX_MESSAGE_LENGTH, pre};
use super::keyboard;
use crate::repository::{OutgoingMessage, PushChannel, SchedulerRepository, escape_markdown};
use crate::service::registry::JobRegistry;
use crate::service::{
    Authorizer, RejectReason, SubscribeOutcome, SubscriptionService, UnsubscribeOutcome,
};
use crate::slurm::parser::{parse_sinfo, parse_squeue, parse_submitted_job_id};
use greenboy_client::ClientError;
use greenboy_core::domain::job::{JobState, normalize_job_id};
use greenboy_core::dto::telegram::{CallbackQuery, InlineKeyboardMarkup, Message, Update, User};

/// Read-only commands `/custom` may run
const CUSTOM_ALLOWED: [&str; 5] = ["sacct", "sinfo", "squeue", "sstat", "sprio"];

/// Default `/squeue` filter: running jobs only
const DEFAULT_QUEUE_FLAGS: [&str; 2] = ["-t", "R"];

/// Destination of the replies to one update
struct Responder<'a> {
    push: &'a dyn PushChannel,
    chat_id: i64,
    /// Message to replace with the first reply
    edit: Option<i64>,
}

impl<'a> Responder<'a> {
    fn send(push: &'a dyn PushChannel, chat_id: i64) -> Self {
        Self {
            push,
            chat_id,
            edit: None,
        }
    }

    fn edit(push: &'a dyn PushChannel, chat_id: i64, message_id: i64) -> Self {
        Self {
            push,
            chat_id,
            edit: Some(message_id),
        }
    }

    fn is_button(&self) -> bool {
        self.edit.is_some()
    }

    async fn reply(&mut self, message: OutgoingMessage) -> Result<(), ClientError> {
        match self.edit.take() {
            Some(message_id) => self.push.edit(self.chat_id, message_id, &message).await,
            None => self.push.send(self.chat_id, &message).await,
        }
    }

    /// Sends raw tool output as `<pre>` pages
    ///
    /// `header` goes before the first page and `keyboard` is attached to it.
    async fn reply_pages(
        &mut self,
        header: &str,
        raw: &str,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<(), ClientError> {
        let mut pages = format::paginate(raw, MAX_MESSAGE_LENGTH).into_iter();
        let first = pages.next().unwrap_or_default();

        let mut message = OutgoingMessage::html(format!("{}{}", header, pre(&first)));
        if let Some(keyboard) = keyboard {
            message = message.with_keyboard(keyboard);
        }
        self.reply(message).await?;

        for page in pages {
            self.reply(OutgoingMessage::html(pre(&page))).await?;
        }
        Ok(())
    }
}

/// Everything the handlers need besides the registry
pub struct Handlers {
    scheduler: Arc<dyn SchedulerRepository>,
    push: Arc<dyn PushChannel>,
    subscriptions: SubscriptionService,
    authorizer: Authorizer,
    shutdown: CancellationToken,
}

impl Handlers {
    pub fn new(
        scheduler: Arc<dyn SchedulerRepository>,
        push: Arc<dyn PushChannel>,
        authorizer: Authorizer,
        shutdown: CancellationToken,
    ) -> Self {
        let subscriptions = SubscriptionService::new(scheduler.clone(), authorizer.clone());
        Self {
            scheduler,
            push,
            subscriptions,
            authorizer,
            shutdown,
        }
    }

    /// Handles one update; errors stop at this boundary
    ///
    /// A failed handler is logged with the triggering user and answered
    /// with a generic error message.
    pub async fn dispatch(&self, registry: &mut JobRegistry, update: Update) {
        let chat_id = reply_chat(&update);
        let user_id = sender(&update).map(|u| u.id);

        if let Err(e) = self.handle_update(registry, update).await {
            error!(user_id, "Error while handling an update: {:#}", e);

            if let Some(chat_id) = chat_id {
                if let Err(e) = self
                    .push
                    .send(chat_id, &OutgoingMessage::plain(format::ERROR_TEXT))
                    .await
                {
                    warn!("Could not report the error to chat {}: {}", chat_id, e);
                }
            }
        }
    }

    pub async fn handle_update(&self, registry: &mut JobRegistry, update: Update) -> Result<()> {
        if let Some(message) = update.message {
            self.handle_message(registry, message).await
        } else if let Some(query) = update.callback_query {
            self.handle_callback(registry, query).await
        } else {
            debug!(update_id = update.update_id, "Ignoring update without message");
            Ok(())
        }
    }

    async fn handle_message(&self, registry: &mut JobRegistry, message: Message) -> Result<()> {
        let Some(command) = message.text.as_deref().and_then(Command::parse) else {
            return Ok(());
        };
        let Some(user) = message.from.as_ref() else {
            return Ok(());
        };
        let chat_id = message.chat.id;
        let mut out = Responder::send(self.push.as_ref(), chat_id);

        if !command.is_public() && !self.authorizer.is_authorized(user.id) {
            warn!(user_id = user.id, "Unauthorized access attempt");
            out.reply(OutgoingMessage::plain(format::UNAUTHORIZED_TEXT))
                .await?;
            return Ok(());
        }

        debug!(user_id = user.id, ?command, "Handling command");

        match command {
            Command::Start => out.reply(OutgoingMessage::plain(format::START_TEXT)).await?,
            Command::Help => {
                let mut reply = OutgoingMessage::markdown(format::HELP_TEXT);
                if self.authorizer.is_authorized(user.id) {
                    reply = reply.with_keyboard(keyboard::shutdown_offer());
                }
                out.reply(reply).await?;
            }
            Command::Squeue(flags) => {
                let flags = if flags.is_empty() {
                    DEFAULT_QUEUE_FLAGS.iter().map(|f| f.to_string()).collect()
                } else {
                    flags
                };
                self.show_queue(&mut out, &flags).await?;
            }
            Command::Cancel(Some(job_id)) => self.cancel(&mut out, &job_id, user).await?,
            Command::JobInfo(Some(job_id)) => {
                self.job_info(&mut out, registry, &job_id, user.id).await?
            }
            Command::Monitor(Some(job_id)) => {
                self.monitor(&mut out, registry, &job_id, user.id, chat_id)
                    .await?
            }
            Command::Unmonitor(Some(job_id)) => {
                self.unmonitor(&mut out, registry, &job_id, user.id).await?
            }
            Command::Submit(Some(script)) => self.submit(&mut out, &script, user).await?,
            Command::Cancel(None) => usage(&mut out, "Usage: /cancel <JOBID>").await?,
            Command::JobInfo(None) => usage(&mut out, "Usage: /jobinfo <JOBID>").await?,
            Command::Monitor(None) => usage(&mut out, "Usage: /monitor <JOBID>").await?,
            Command::Unmonitor(None) => usage(&mut out, "Usage: /unmonitor <JOBID>").await?,
            Command::Submit(None) => {
                usage(
                    &mut out,
                    "Usage: /submit <script_path>\n\nExample: `/submit /path/to/my_job.sh`",
                )
                .await?
            }
            Command::Status => self.status(&mut out, user.id).await?,
            Command::MonitorList => self.monitor_list(&mut out, registry, user.id).await?,
            Command::Custom(args) => self.custom(&mut out, &args).await?,
            Command::Shutdown => self.shutdown_confirm(&mut out, user).await?,
            Command::Unknown(name) => debug!("Ignoring unknown command /{}", name),
        }

        Ok(())
    }

    async fn handle_callback(&self, registry: &mut JobRegistry, query: CallbackQuery) -> Result<()> {
        if let Err(e) = self.push.answer_callback(&query.id, None).await {
            warn!("Could not answer callback query: {}", e);
        }

        let Some(message) = query.message.as_ref() else {
            debug!("Ignoring callback without message");
            return Ok(());
        };
        let user = &query.from;
        let chat_id = message.chat.id;
        let mut out = Responder::edit(self.push.as_ref(), chat_id, message.message_id);

        if !self.authorizer.is_authorized(user.id) {
            warn!(user_id = user.id, "Unauthorized button press");
            out.reply(OutgoingMessage::plain(
                "⛔ You are not authorized to use this bot.",
            ))
            .await?;
            return Ok(());
        }

        let Some(callback) = query.data.as_deref().and_then(Callback::parse) else {
            debug!(data = ?query.data, "Ignoring unknown callback");
            return Ok(());
        };

        debug!(user_id = user.id, ?callback, "Handling button");

        match callback {
            Callback::Queue(filter) => self.show_queue(&mut out, &filter.flags()).await?,
            Callback::Cancel(job_id) => self.cancel(&mut out, &job_id, user).await?,
            Callback::Monitor(job_id) => {
                self.monitor(&mut out, registry, &job_id, user.id, chat_id)
                    .await?
            }
            Callback::Unmonitor(job_id) => {
                self.unmonitor(&mut out, registry, &job_id, user.id).await?
            }
            Callback::JobInfo(job_id) => {
                self.job_info(&mut out, registry, &job_id, user.id).await?
            }
            Callback::CpuMem(job_id) => self.cpu_mem(&mut out, &job_id).await?,
            Callback::ShutdownConfirm => self.shutdown_confirm(&mut out, user).await?,
            Callback::ShutdownExecute => self.shutdown_execute(&mut out, user).await?,
            Callback::ShutdownCancel => {
                out.reply(OutgoingMessage::markdown(
                    "✅ *Shutdown Cancelled*\n\nThe bot will continue running normally.",
                ))
                .await?
            }
        }

        Ok(())
    }

    async fn show_queue(&self, out: &mut Responder<'_>, flags: &[String]) -> Result<()> {
        let output = self.scheduler.queue(flags).await;
        if !output.ok {
            out.reply_pages(
                "❌ Error listing jobs:\n",
                &output.text,
                Some(keyboard::queue(&[])),
            )
            .await?;
            return Ok(());
        }

        let jobs = parse_squeue(&output.text);
        let job_ids: Vec<String> = jobs.iter().map(|j| j.job_id.clone()).collect();
        let markup = keyboard::queue(&job_ids);
        let pretty = format::job_list(&jobs);

        if pretty.chars().count() <= MAX_MESSAGE_LENGTH {
            out.reply(OutgoingMessage::markdown(pretty).with_keyboard(markup))
                .await?;
        } else {
            out.reply_pages("", &output.text, Some(markup)).await?;
        }
        Ok(())
    }

    async fn cancel(&self, out: &mut Responder<'_>, raw: &str, user: &User) -> Result<()> {
        let Some(job_id) = normalize_job_id(raw) else {
            return Ok(out
                .reply(OutgoingMessage::plain(format!(
                    "❌ Invalid job ID format: {}",
                    raw
                )))
                .await?);
        };

        let record = match self.scheduler.job_details(&job_id).await {
            Ok(record) => record,
            Err(e) => {
                debug!(job_id = %job_id, "Job lookup before cancel failed: {}", e);
                return Ok(out
                    .reply(OutgoingMessage::plain(format!(
                        "❌ Job {} not found or access denied.",
                        raw
                    )))
                    .await?);
            }
        };

        let text = match self.scheduler.cancel(&job_id).await {
            Ok(()) => {
                info!(job_id = %job_id, user_id = user.id, "Cancelled job");
                format!(
                    "✅ Job {} ({}) cancelled successfully.",
                    raw,
                    record.display_name()
                )
            }
            Err(e) => {
                error!(job_id = %job_id, "Failed to cancel job: {}", e);
                let mut text = format!(
                    "❌ Error cancelling job {}:\n{}\n\nJob State: {}\n",
                    raw,
                    e.user_message(),
                    record.display_state()
                );
                if record.state.is_terminal() {
                    text.push_str("ℹ️ Note: This job has already finished and cannot be cancelled.");
                } else if record.state == JobState::Pending {
                    text.push_str(
                        "ℹ️ Note: If cancellation failed, the job might have already started running.",
                    );
                }
                text
            }
        };

        out.reply(OutgoingMessage::plain(text)).await?;
        Ok(())
    }

    async fn job_info(
        &self,
        out: &mut Responder<'_>,
        registry: &JobRegistry,
        raw: &str,
        requester: i64,
    ) -> Result<()> {
        let Some(job_id) = normalize_job_id(raw) else {
            return Ok(out
                .reply(OutgoingMessage::plain(format!(
                    "❌ Invalid job ID format: {}",
                    raw
                )))
                .await?);
        };

        let record = match self.scheduler.job_details(&job_id).await {
            Ok(record) => record,
            Err(e) => {
                return Ok(out
                    .reply(OutgoingMessage::plain(format!(
                        "❌ Error retrieving job info: {}",
                        e.user_message()
                    )))
                    .await?);
            }
        };

        let usage = self.scheduler.resource_usage(&record).await;
        let monitored = registry
            .get(&job_id)
            .is_some_and(|entry| entry.subscriber_id == requester);

        out.reply(
            OutgoingMessage::markdown(format::job_info(&record, usage.as_ref()))
                .with_keyboard(keyboard::job_info(&job_id, record.state, monitored)),
        )
        .await?;
        Ok(())
    }

    async fn monitor(
        &self,
        out: &mut Responder<'_>,
        registry: &mut JobRegistry,
        raw: &str,
        subscriber: i64,
        chat_id: i64,
    ) -> Result<()> {
        let outcome = self
            .subscriptions
            .subscribe(registry, raw, subscriber, chat_id)
            .await?;

        let reply = match outcome {
            SubscribeOutcome::Accepted { job_id, state } => {
                let reply = OutgoingMessage::plain(format!(
                    "✅ Now monitoring job {}. You'll be notified when it completes.\nCurrent state: {}",
                    job_id, state
                ));
                if out.is_button() {
                    reply.with_keyboard(keyboard::job_details(&job_id))
                } else {
                    reply
                }
            }
            SubscribeOutcome::Rejected(RejectReason::InvalidJobId(raw)) => {
                OutgoingMessage::plain(format!("❌ Invalid job ID format: {}", raw))
            }
            SubscribeOutcome::Rejected(RejectReason::NotFound { job_id, message }) => {
                OutgoingMessage::plain(format!("❌ Cannot monitor job {}: {}", job_id, message))
            }
            SubscribeOutcome::Rejected(RejectReason::AlreadyFinished { job_id, state }) => {
                OutgoingMessage::plain(format!(
                    "⚠️ Job {} has already finished (state: {}). Cannot monitor.",
                    job_id, state
                ))
            }
        };

        out.reply(reply).await?;
        Ok(())
    }

    async fn unmonitor(
        &self,
        out: &mut Responder<'_>,
        registry: &mut JobRegistry,
        raw: &str,
        requester: i64,
    ) -> Result<()> {
        let text = match self.subscriptions.unsubscribe(registry, raw, requester)? {
            UnsubscribeOutcome::Removed(job_id) => {
                format!("✅ Stopped monitoring job {}.", job_id)
            }
            UnsubscribeOutcome::NotFound(job_id) => {
                format!("❌ Job {} is not being monitored.", job_id)
            }
            UnsubscribeOutcome::Forbidden(job_id) => {
                format!("⛔ You are not authorized to stop monitoring job {}.", job_id)
            }
        };

        out.reply(OutgoingMessage::plain(text)).await?;
        Ok(())
    }

    async fn monitor_list(
        &self,
        out: &mut Responder<'_>,
        registry: &JobRegistry,
        requester: i64,
    ) -> Result<()> {
        let entries = self.subscriptions.list(registry, requester);
        if entries.is_empty() {
            out.reply(OutgoingMessage::plain(format::monitor_list(&[])))
                .await?;
            return Ok(());
        }

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = self.scheduler.job_details(&entry.job_id).await.ok();
            rows.push((entry, record));
        }
        let job_ids: Vec<String> = rows.iter().map(|(e, _)| e.job_id.clone()).collect();

        out.reply(
            OutgoingMessage::markdown(format::monitor_list(&rows))
                .with_keyboard(keyboard::monitor_list(&job_ids)),
        )
        .await?;
        Ok(())
    }

    async fn status(&self, out: &mut Responder<'_>, requester: i64) -> Result<()> {
        let raw = match self.scheduler.cluster_status().await {
            Ok(raw) => raw,
            Err(e) => {
                return Ok(out
                    .reply(OutgoingMessage::plain(format!(
                        "❌ Error getting cluster status: {}",
                        e.user_message()
                    )))
                    .await?);
            }
        };

        let mut reply = OutgoingMessage::markdown(format::cluster_status(&parse_sinfo(&raw)));
        if self.authorizer.is_authorized(requester) {
            reply = reply.with_keyboard(keyboard::shutdown_offer());
        }
        out.reply(reply).await?;
        Ok(())
    }

    async fn submit(&self, out: &mut Responder<'_>, script: &str, user: &User) -> Result<()> {
        let reply = match self.scheduler.submit(script).await {
            Ok(output) => {
                info!(user_id = user.id, script, "Submitted job script");
                let reply =
                    OutgoingMessage::plain(format!("✅ Job submitted successfully!\n{}", output));
                match parse_submitted_job_id(&output) {
                    Some(job_id) => reply.with_keyboard(keyboard::submitted(&job_id)),
                    None => reply,
                }
            }
            Err(e) => {
                OutgoingMessage::plain(format!("❌ Error submitting job:\n{}", e.user_message()))
            }
        };

        out.reply(reply).await?;
        Ok(())
    }

    async fn custom(&self, out: &mut Responder<'_>, args: &[String]) -> Result<()> {
        let Some((command, rest)) = args.split_first() else {
            return Ok(usage(
                out,
                "Usage: /custom <command> [args]\n\n\
                 Allowed commands: sacct, sinfo, squeue, sstat, sprio\n\
                 Example: `/custom sacct --jobs=12345 --format=JobID,State,ExitCode -P`",
            )
            .await?);
        };

        let command = command.to_ascii_lowercase();
        if !CUSTOM_ALLOWED.contains(&command.as_str()) {
            return Ok(out
                .reply(OutgoingMessage::plain(format!(
                    "❌ Command '{}' is not allowed.\nAllowed commands: {}",
                    command,
                    CUSTOM_ALLOWED.join(", ")
                )))
                .await?);
        }

        let output = self.scheduler.run_custom(&command, rest).await;
        out.reply_pages("", &output.text, None).await?;
        Ok(())
    }

    async fn cpu_mem(&self, out: &mut Responder<'_>, raw: &str) -> Result<()> {
        let Some(job_id) = normalize_job_id(raw) else {
            return Ok(out
                .reply(OutgoingMessage::plain(format!(
                    "❌ Invalid job ID format: {}",
                    raw
                )))
                .await?);
        };

        let stats = self.scheduler.process_stats(&job_id).await;
        let header = format!(
            "📊 <b>Detailed CPU and Memory Usage for Job {}</b>\n\n",
            job_id
        );
        out.reply_pages(&header, &stats, Some(keyboard::back_to_job(&job_id)))
            .await?;
        Ok(())
    }

    async fn shutdown_confirm(&self, out: &mut Responder<'_>, user: &User) -> Result<()> {
        out.reply(
            OutgoingMessage::markdown(format!(
                "🔴 *Bot Shutdown Confirmation*\n\n\
                 User: @{}\n\
                 PID: {}\n\n\
                 Are you sure you want to shutdown the Green-Boy bot?\n\n\
                 ⚠️ *Warning*: This will stop the bot completely. \
                 You'll need to restart it manually on the cluster.",
                escape_markdown(&user.display_name()),
                std::process::id()
            ))
            .with_keyboard(keyboard::shutdown_confirm()),
        )
        .await?;
        Ok(())
    }

    async fn shutdown_execute(&self, out: &mut Responder<'_>, user: &User) -> Result<()> {
        let name = user.display_name();
        warn!(user_id = user.id, "Bot shutdown initiated by {}", name);

        let farewell = OutgoingMessage::markdown(format!(
            "🔴 *Bot Shutdown Initiated*\n\n\
             Shutting down Green-Boy bot...\n\
             Initiated by: @{}\n\
             Time: {}\n\n\
             ✅ Bot will terminate in a moment.\n\
             🔄 To restart, run the bot on the cluster again.",
            escape_markdown(&name),
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        if let Err(e) = out.reply(farewell).await {
            warn!("Could not send shutdown message: {}", e);
        }

        self.shutdown.cancel();
        Ok(())
    }
}

async fn usage(out: &mut Responder<'_>, text: &str) -> Result<(), ClientError> {
    out.reply(OutgoingMessage::plain(text)).await
}

/// Chat that should hear about a failed update
fn reply_chat(update: &Update) -> Option<i64> {
    update
        .message
        .as_ref()
        .or_else(|| {
            update
                .callback_query
                .as_ref()
                .and_then(|q| q.message.as_ref())
        })
        .map(|m| m.chat.id)
}

fn sender(update: &Update) -> Option<&User> {
    update
        .message
        .as_ref()
        .and_then(|m| m.from.as_ref())
        .or_else(|| update.callback_query.as_ref().map(|q| &q.from))
}
