//! In-memory repositories for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::SchedulerError;
use crate::repository::push::{OutgoingMessage, PushChannel};
use crate::repository::scheduler::SchedulerRepository;
use crate::slurm::{CommandExecutor, CommandOutput};
use greenboy_client::ClientError;
use greenboy_core::domain::job::{JobRecord, JobState};
use greenboy_core::domain::monitor::DeliveryTarget;
use greenboy_core::domain::usage::ResourceUsage;

/// Executor answering from a table of command-line prefixes
///
/// The longest registered prefix of `"<command> <args...>"` wins; unknown
/// commands fail.
#[derive(Default)]
pub struct ScriptedExecutor {
    responses: Mutex<Vec<(String, CommandOutput)>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        self.responses
            .lock()
            .unwrap()
            .push((prefix.to_string(), output));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, command: &str, args: &[String]) -> CommandOutput {
        let line = std::iter::once(command.to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        self.calls.lock().unwrap().push(line.clone());

        self.responses
            .lock()
            .unwrap()
            .iter()
            .filter(|(prefix, _)| line.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::failure(format!("{}: not scripted", command)))
    }
}

/// Scheduler whose job states are set by the test
#[derive(Default)]
pub struct FakeScheduler {
    jobs: Mutex<HashMap<String, Result<JobRecord, String>>>,
    usage: Mutex<HashMap<String, ResourceUsage>>,
    cancelled: Mutex<Vec<String>>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state the next queries for `job_id` report
    pub fn set_state(&self, job_id: &str, name: &str, state: &str) {
        let fields = [
            ("JobId".to_string(), job_id.to_string()),
            ("JobName".to_string(), name.to_string()),
            ("JobState".to_string(), state.to_string()),
            ("RunTime".to_string(), "00:01:00".to_string()),
        ]
        .into();
        self.jobs
            .lock()
            .unwrap()
            .insert(job_id.to_string(), Ok(JobRecord::from_fields(job_id, fields)));
    }

    /// Makes queries for `job_id` fail like a flaky `scontrol`
    pub fn fail(&self, job_id: &str, message: &str) {
        self.jobs
            .lock()
            .unwrap()
            .insert(job_id.to_string(), Err(message.to_string()));
    }

    pub fn set_usage(&self, job_id: &str, metrics: &[(&str, &str)]) {
        let usage = ResourceUsage {
            job_id: job_id.to_string(),
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        };
        self.usage.lock().unwrap().insert(job_id.to_string(), usage);
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchedulerRepository for FakeScheduler {
    async fn job_details(&self, job_id: &str) -> Result<JobRecord, SchedulerError> {
        match self.jobs.lock().unwrap().get(job_id) {
            Some(Ok(record)) => Ok(record.clone()),
            Some(Err(message)) => Err(SchedulerError::command_failed("scontrol", message.clone())),
            None => Err(SchedulerError::command_failed(
                "scontrol",
                "slurm_load_jobs error: Invalid job id specified",
            )),
        }
    }

    async fn resource_usage(&self, record: &JobRecord) -> Option<ResourceUsage> {
        if matches!(record.state, JobState::Pending | JobState::Unknown) {
            return None;
        }
        self.usage.lock().unwrap().get(&record.job_id).cloned()
    }

    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        self.cancelled.lock().unwrap().push(job_id.to_string());
        Ok(())
    }

    async fn submit(&self, _script: &str) -> Result<String, SchedulerError> {
        Ok("Submitted batch job 4242\n".to_string())
    }

    async fn queue(&self, _flags: &[String]) -> CommandOutput {
        CommandOutput::success(
            "JOBID PARTITION NAME USER ST TIME NODES NODELIST(REASON)\n 111 gpu train alice R 10:00 1 node01\n",
        )
    }

    async fn cluster_status(&self) -> Result<String, SchedulerError> {
        Ok("PARTITION AVAIL NODES(A/I/O/T) S:C:T STATE NODELIST\ngpu up 1/1/0/2 2:16:2 mixed node[01-02]\n".to_string())
    }

    async fn run_custom(&self, command: &str, args: &[String]) -> CommandOutput {
        CommandOutput::success(format!("{} {}", command, args.join(" ")))
    }

    async fn process_stats(&self, job_id: &str) -> String {
        format!("stats for {}", job_id)
    }
}

/// One call made on the push channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pushed {
    Sent {
        target: DeliveryTarget,
        message: OutgoingMessage,
    },
    Edited {
        target: DeliveryTarget,
        message_id: i64,
        message: OutgoingMessage,
    },
    Answered {
        callback_id: String,
        text: Option<String>,
    },
}

/// Push channel that records calls and can be switched to failing
#[derive(Default)]
pub struct RecordingChannel {
    pushed: Mutex<Vec<Pushed>>,
    failing: Mutex<bool>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn pushed(&self) -> Vec<Pushed> {
        self.pushed.lock().unwrap().clone()
    }

    /// Texts of sent and edited messages, in order
    pub fn texts(&self) -> Vec<String> {
        self.pushed()
            .into_iter()
            .filter_map(|p| match p {
                Pushed::Sent { message, .. } | Pushed::Edited { message, .. } => {
                    Some(message.text)
                }
                Pushed::Answered { .. } => None,
            })
            .collect()
    }

    fn check(&self) -> Result<(), ClientError> {
        if *self.failing.lock().unwrap() {
            Err(ClientError::api_error(502, "Bad Gateway"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PushChannel for RecordingChannel {
    async fn send(
        &self,
        target: DeliveryTarget,
        message: &OutgoingMessage,
    ) -> Result<(), ClientError> {
        self.check()?;
        self.pushed.lock().unwrap().push(Pushed::Sent {
            target,
            message: message.clone(),
        });
        Ok(())
    }

    async fn edit(
        &self,
        target: DeliveryTarget,
        message_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), ClientError> {
        self.check()?;
        self.pushed.lock().unwrap().push(Pushed::Edited {
            target,
            message_id,
            message: message.clone(),
        });
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), ClientError> {
        self.check()?;
        self.pushed.lock().unwrap().push(Pushed::Answered {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
        });
        Ok(())
    }
}
