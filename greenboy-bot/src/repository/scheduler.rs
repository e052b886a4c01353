//! Scheduler repository
//!
//! Knows which Slurm tool answers which question:
//! - Job details from `scontrol show job`
//! - Live statistics from `sstat`, accounting from `sacct`
//! - Queue and partitions from `squeue` and `sinfo`
//! - Cancel and submit through `scancel` / `sbatch`
//!
//! No retries happen here; the monitor simply asks again next tick.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::error::SchedulerError;
use crate::slurm::parser::{parse_job_details, parse_pipe_record, parse_pipe_table};
use crate::slurm::{CommandExecutor, CommandOutput};
use greenboy_core::domain::job::{JobRecord, JobState};
use greenboy_core::domain::usage::{ResourceUsage, TaskUsage};

/// Live per-job statistics of a running job
const SSTAT_SUMMARY_FORMAT: &str =
    "--format=JobID,AveCPU,MaxRSS,AveRSS,MaxVMSize,AveVMSize,AveCPUFreq,ConsumedEnergy";

/// Live per-task statistics of a running job
const SSTAT_TASKS_FORMAT: &str = "--format=JobID,AveCPU,AveRSS,MaxRSS,TaskID,CPUTime,TresUsageInTot";

/// Accounting record of a finished job
const SACCT_FORMAT: &str = "--format=JobID,State,ExitCode,AveCPU,MaxRSS,AveRSS,MaxVMSize,AveVMSize,CPUTime,ConsumedEnergy,Elapsed";

/// Partition overview shown by `/status`
pub const SINFO_FORMAT: &str = "%20P %5a %14F %8z %10T %N";

/// Repository trait for everything the bot asks the scheduler
#[async_trait]
pub trait SchedulerRepository: Send + Sync {
    /// Fetches the current record of a job
    ///
    /// # Arguments
    /// * `job_id` - Base numeric job id
    async fn job_details(&self, job_id: &str) -> Result<JobRecord, SchedulerError>;

    /// Fetches resource usage for a job in the state `record` reports
    ///
    /// Returns `None` for pending or unknown jobs: usage is simply not
    /// available yet. Missing metrics are left out of the map.
    async fn resource_usage(&self, record: &JobRecord) -> Option<ResourceUsage>;

    /// Cancels a job, falling back to `scontrol cancel` when `scancel` fails
    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError>;

    /// Submits a batch script and returns the tool's output
    async fn submit(&self, script: &str) -> Result<String, SchedulerError>;

    /// Lists the operator's jobs (`squeue --me <flags>`)
    async fn queue(&self, flags: &[String]) -> CommandOutput;

    /// Raw partition overview
    async fn cluster_status(&self) -> Result<String, SchedulerError>;

    /// Runs an arbitrary scheduler command; callers restrict which ones
    async fn run_custom(&self, command: &str, args: &[String]) -> CommandOutput;

    /// Best available CPU and memory breakdown of a running job
    async fn process_stats(&self, job_id: &str) -> String;
}

/// Slurm implementation of SchedulerRepository
pub struct SlurmRepository {
    executor: Arc<dyn CommandExecutor>,
}

impl SlurmRepository {
    /// Creates a new Slurm repository
    ///
    /// # Arguments
    /// * `executor` - Runs the CLI tools
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    async fn run(&self, command: &str, args: &[&str]) -> CommandOutput {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        self.executor.run(command, &args).await
    }

    async fn live_usage(&self, usage: &mut ResourceUsage) {
        let jobs = format!("--jobs={}", usage.job_id);

        let summary = self
            .run("sstat", &[&jobs, SSTAT_SUMMARY_FORMAT, "-P"])
            .await;
        debug!("sstat output for job {}: {}", usage.job_id, summary.text);
        if summary.has_data() {
            if let Some(metrics) = parse_pipe_record(&summary.text) {
                usage.metrics.extend(metrics);
            }
        }

        let tasks = self.run("sstat", &[&jobs, SSTAT_TASKS_FORMAT, "-P"]).await;
        debug!("sstat task output for job {}: {}", usage.job_id, tasks.text);
        if tasks.has_data() {
            usage.tasks = parse_pipe_table(&tasks.text)
                .into_iter()
                .map(TaskUsage::from)
                .collect();
        }
    }

    async fn accounted_usage(&self, usage: &mut ResourceUsage) {
        let jobs = format!("--jobs={}", usage.job_id);

        let output = self.run("sacct", &[&jobs, SACCT_FORMAT, "-P"]).await;
        debug!("sacct output for job {}: {}", usage.job_id, output.text);
        if output.has_data() {
            if let Some(metrics) = parse_pipe_record(&output.text) {
                usage.metrics.extend(metrics);
            }
        }
    }
}

#[async_trait]
impl SchedulerRepository for SlurmRepository {
    async fn job_details(&self, job_id: &str) -> Result<JobRecord, SchedulerError> {
        let output = self.run("scontrol", &["show", "job", job_id]).await;
        if !output.ok {
            return Err(SchedulerError::command_failed("scontrol", output.text));
        }

        let fields = parse_job_details(&output.text);
        if fields.is_empty() {
            return Err(SchedulerError::NotFound(job_id.to_string()));
        }

        Ok(JobRecord::from_fields(job_id, fields))
    }

    async fn resource_usage(&self, record: &JobRecord) -> Option<ResourceUsage> {
        let mut usage = ResourceUsage {
            job_id: record.job_id.clone(),
            state: Some(record.state),
            allocated_cpus: record.allocated_cpus().unwrap_or(0),
            allocated_nodes: record.get("NumNodes").map(str::to_string),
            node_list: record.get("NodeList").map(str::to_string),
            ..Default::default()
        };

        match record.state {
            JobState::Running => self.live_usage(&mut usage).await,
            state if state.is_terminal() => self.accounted_usage(&mut usage).await,
            _ => return None,
        }

        Some(usage)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        let output = self.run("scancel", &[job_id]).await;
        if output.ok {
            return Ok(());
        }

        debug!("scancel failed for job {}, trying scontrol cancel", job_id);
        let fallback = self.run("scontrol", &["cancel", job_id]).await;
        if fallback.ok {
            Ok(())
        } else {
            Err(SchedulerError::command_failed("scontrol cancel", fallback.text))
        }
    }

    async fn submit(&self, script: &str) -> Result<String, SchedulerError> {
        let output = self.run("sbatch", &[script]).await;
        if output.ok {
            Ok(output.text)
        } else {
            Err(SchedulerError::command_failed("sbatch", output.text))
        }
    }

    async fn queue(&self, flags: &[String]) -> CommandOutput {
        let mut args = vec!["--me".to_string()];
        args.extend(flags.iter().cloned());
        self.executor.run("squeue", &args).await
    }

    async fn cluster_status(&self) -> Result<String, SchedulerError> {
        let output = self.run("sinfo", &["-o", SINFO_FORMAT]).await;
        if output.ok {
            Ok(output.text)
        } else {
            Err(SchedulerError::command_failed("sinfo", output.text))
        }
    }

    async fn run_custom(&self, command: &str, args: &[String]) -> CommandOutput {
        self.executor.run(command, args).await
    }

    async fn process_stats(&self, job_id: &str) -> String {
        let record = match self.job_details(job_id).await {
            Ok(record) => record,
            Err(e) => return format!("Could not read job {}: {}", job_id, e.user_message()),
        };

        if record.state != JobState::Running {
            return format!(
                "Job {} is not running (current state: {}). CPU and memory details are only available for running jobs.",
                job_id,
                record.display_state()
            );
        }

        let jobs = format!("--jobs={}", job_id);

        let detailed = self
            .run(
                "sstat",
                &[
                    &jobs,
                    "--format=JobID,Node,AveCPU,MinCPU,TotalCPU,AveRSS,MaxRSS,AveVMSize,MaxVMSize",
                    "-P",
                ],
            )
            .await;
        if detailed.has_data() && detailed.text.trim().lines().count() >= 2 {
            return format!("SLURM Resource Usage Statistics:\n\n{}", detailed.text.trim());
        }

        let steps = self
            .run(
                "sstat",
                &[
                    &jobs,
                    "--format=JobID,StepID,Node,Task,AveCPU,MaxRSS,AveRSS,MaxVMSize",
                    "-P",
                ],
            )
            .await;
        if steps.has_data() && steps.text.trim().lines().count() >= 2 {
            return format!("SLURM Job Step Statistics:\n\n{}", steps.text.trim());
        }

        let control = self.run("scontrol", &["show", "-d", "job", job_id]).await;
        if control.ok {
            let lines: Vec<&str> = control
                .text
                .lines()
                .filter(|line| {
                    ["CPU", "Memory", "Mem", "Nodes", "Task", "%"]
                        .iter()
                        .any(|keyword| line.contains(keyword))
                })
                .map(str::trim)
                .collect();
            if !lines.is_empty() {
                return format!("SLURM Job Control Information:\n\n{}", lines.join("\n"));
            }
        }

        let queue = self
            .run(
                "squeue",
                &[
                    "-j",
                    job_id,
                    "--format=%i %u %P %j %t %M %l %D %S %C %m %b %N %L %T",
                ],
            )
            .await;
        if queue.ok && queue.text.contains("JOBID") {
            return format!("SLURM Queue Information:\n\n{}", queue.text.trim());
        }

        let custom = self
            .run(
                "sstat",
                &[
                    &jobs,
                    "--format=JobID,MaxVMSize,MaxVMSizeNode,MaxVMSizeTask,AveCPU,ConsumedEnergy,MaxDiskRead,MaxDiskWrite,MaxRSS,MaxRSSNode,MaxRSSTask",
                    "-P",
                ],
            )
            .await;
        if custom.has_data() {
            if let Some(table) = format_summary_table(&custom.text) {
                return format!("Resource Usage Summary:\n\n{}", table);
            }
        }

        format!(
            "Process information not available. Job is running on nodes: {}\n\nDetailed CPU and memory information cannot be accessed directly from the login node.",
            record.get("NodeList").unwrap_or("")
        )
    }
}

/// Renders the first row of a pipe table as aligned `name value` lines
fn format_summary_table(text: &str) -> Option<String> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let headers: Vec<&str> = lines.next()?.split('|').collect();
    let values: Vec<&str> = lines.next()?.split('|').collect();

    let width = headers.iter().map(|h| h.len()).max().unwrap_or(0) + 2;
    Some(
        headers
            .iter()
            .zip(values.iter())
            .map(|(header, value)| format!("{:<width$} {}", header, value, width = width))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::mock::ScriptedExecutor;

    fn repository(executor: &Arc<ScriptedExecutor>) -> SlurmRepository {
        SlurmRepository::new(executor.clone())
    }

    #[tokio::test]
    async fn test_job_details_parses_dump() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            "scontrol show job 111",
            CommandOutput::success("JobId=111 JobName=train\n   JobState=PENDING Reason=Priority\n"),
        );

        let record = repository(&executor).job_details("111").await.unwrap();
        assert_eq!(record.state, JobState::Pending);
        assert_eq!(record.display_name(), "train");
    }

    #[tokio::test]
    async fn test_job_details_command_failure() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            "scontrol show job 9",
            CommandOutput::failure("slurm_load_jobs error: Invalid job id specified"),
        );

        let err = repository(&executor).job_details("9").await.unwrap_err();
        assert!(matches!(err, SchedulerError::CommandFailed { .. }));
        assert!(err.user_message().contains("Invalid job id"));
    }

    #[tokio::test]
    async fn test_usage_of_pending_job_is_absent() {
        let executor = Arc::new(ScriptedExecutor::new());
        let record = JobRecord::from_fields(
            "5",
            [("JobState".to_string(), "PENDING".to_string())].into(),
        );

        assert!(repository(&executor).resource_usage(&record).await.is_none());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_usage_of_running_job_uses_sstat() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            &format!("sstat --jobs=7 {}", SSTAT_SUMMARY_FORMAT),
            CommandOutput::success("JobID|AveCPU|MaxRSS\n7.0|00:01:02|4096K\n"),
        );
        executor.respond(
            &format!("sstat --jobs=7 {}", SSTAT_TASKS_FORMAT),
            CommandOutput::success("JobID|AveCPU|AveRSS|TaskID\n7.0|00:00:30|1G|0\n7.0|00:00:32|1G|1\n"),
        );
        let record = JobRecord::from_fields(
            "7",
            [
                ("JobState".to_string(), "RUNNING".to_string()),
                ("NumCPUs".to_string(), "4".to_string()),
            ]
            .into(),
        );

        let usage = repository(&executor).resource_usage(&record).await.unwrap();
        assert_eq!(usage.allocated_cpus, 4);
        assert_eq!(usage.ave_cpu(), Some("00:01:02"));
        assert_eq!(usage.max_rss(), Some("4096K"));
        assert_eq!(usage.tasks.len(), 2);
        assert_eq!(usage.tasks[1].task_id(), "1");
        assert_eq!(usage.exit_code(), None);
    }

    #[tokio::test]
    async fn test_usage_of_finished_job_uses_sacct() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            "sacct --jobs=8",
            CommandOutput::success("JobID|State|ExitCode|Elapsed\n8|COMPLETED|0:0|00:05:00\n8.batch|COMPLETED|0:0|00:05:00\n"),
        );
        let record = JobRecord::from_fields(
            "8",
            [("JobState".to_string(), "COMPLETED".to_string())].into(),
        );

        let usage = repository(&executor).resource_usage(&record).await.unwrap();
        assert_eq!(usage.exit_code(), Some("0:0"));
        assert_eq!(usage.elapsed(), Some("00:05:00"));
        assert_eq!(usage.metric("JobID"), Some("8"));
    }

    #[tokio::test]
    async fn test_cancel_falls_back_to_scontrol() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("scancel 3", CommandOutput::failure("scancel: error"));
        executor.respond("scontrol cancel 3", CommandOutput::success(""));

        repository(&executor).cancel("3").await.unwrap();
        assert_eq!(executor.calls(), vec!["scancel 3", "scontrol cancel 3"]);
    }

    #[tokio::test]
    async fn test_queue_is_scoped_to_operator() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond("squeue --me -t R", CommandOutput::success("JOBID\n"));

        let output = repository(&executor)
            .queue(&["-t".to_string(), "R".to_string()])
            .await;
        assert!(output.ok);
    }

    #[tokio::test]
    async fn test_process_stats_for_idle_job() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            "scontrol show job 4",
            CommandOutput::success("JobId=4 JobState=PENDING"),
        );

        let stats = repository(&executor).process_stats("4").await;
        assert!(stats.contains("is not running (current state: PENDING)"));
    }

    #[tokio::test]
    async fn test_process_stats_falls_through_to_control_lines() {
        let executor = Arc::new(ScriptedExecutor::new());
        executor.respond(
            "scontrol show job 6",
            CommandOutput::success("JobId=6 JobState=RUNNING NodeList=node01"),
        );
        executor.respond("sstat", CommandOutput::success("sstat: No job(s) found"));
        executor.respond(
            "scontrol show -d job 6",
            CommandOutput::success("JobId=6\n   NumCPUs=4 NumTasks=1\n   Partition=gpu\n"),
        );

        let stats = repository(&executor).process_stats("6").await;
        assert!(stats.starts_with("SLURM Job Control Information:"));
        assert!(stats.contains("NumCPUs=4"));
        assert!(!stats.contains("Partition=gpu"));
    }

    #[test]
    fn test_summary_table_alignment() {
        let table = format_summary_table("JobID|MaxRSS\n6.0|2G\n").unwrap();
        assert_eq!(table, "JobID    6.0\nMaxRSS   2G");
    }
}
