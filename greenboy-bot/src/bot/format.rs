//! Message texts
//!
//! Everything here is pure string building. Fields the scheduler did not
//! report are left out, never shown as blanks.

use crate::repository::escape_markdown;
use greenboy_core::domain::cluster::{PartitionStatus, QueueEntry};
use greenboy_core::domain::job::{ExitOutcome, JobRecord, JobState};
use greenboy_core::domain::monitor::MonitorEntry;
use greenboy_core::domain::usage::ResourceUsage;

/// Longest text sent in one message
pub const MAX_MESSAGE_LENGTH: usize = 3500;

/// Per-task rows shown before summarizing the rest
const MAX_TASKS_SHOWN: usize = 5;

const NODELIST_WIDTH: usize = 50;

pub const START_TEXT: &str = "👋 Hello! I'm Green-Boy, your SLURM job monitoring assistant.\n\n\
Use /squeue to list your jobs or /help for more commands.";

pub const HELP_TEXT: &str = "📖 *Available commands:*\n\
/start - say hello\n\
/help - show this message\n\
/squeue [FLAGS] - list your jobs\n\
  • default: only running (`-t R`)\n\
  • e.g. `/squeue -p gpu -n vasp`\n\
/cancel <JOBID> - cancel that job\n\
/jobinfo <JOBID> - show detailed job information with resource usage\n\
/status - show overall cluster status\n\
/submit <script> - submit a job script\n\
/monitor <JOBID> - monitor a job for completion notifications\n\
/unmonitor <JOBID> - stop monitoring a job\n\
/monitorlist - list all jobs being monitored\n\
/custom <command> [args] - run a custom SLURM command\n\
/shutdown - safely shutdown the bot 🔒\n\n\
Examples:\n\
• `/squeue -p gpu` - jobs on the gpu partition\n\
• `/squeue -t PD` - pending jobs\n\
• `/cancel 60489632` - cancel job 60489632\n\
• `/jobinfo 60489632` - show details and resource usage for job 60489632\n\
• `/monitor 60489632` - get notification when job completes\n\
• `/custom sacct --jobs=60489632 --format=JobID,State,ExitCode -P` - custom SLURM command\n";

pub const UNAUTHORIZED_TEXT: &str =
    "⛔ You are not authorized to use this bot. Contact the administrator.";

pub const ERROR_TEXT: &str = "⚠️ An error occurred\nThe bot administrator has been notified.";

/// Emoji for a state code as `squeue` or `scontrol` prints it
pub fn state_emoji(state: &str) -> &'static str {
    match state.to_ascii_uppercase().as_str() {
        "R" | "RUNNING" => "🟢",
        "PD" | "PENDING" => "🟡",
        "CG" | "COMPLETING" => "🔵",
        "F" | "FAILED" => "🔴",
        "CA" | "CANCELLED" => "⚫",
        "CD" | "COMPLETED" => "✅",
        "TO" | "TIMEOUT" => "⏱️",
        _ => "❓",
    }
}

fn partition_emoji(state: &str) -> &'static str {
    match state.to_ascii_lowercase().as_str() {
        "idle" => "🟢",
        "down" | "drain" => "🔴",
        "alloc" => "🟡",
        _ => "🔄",
    }
}

/// Markdown job list for `/squeue`
pub fn job_list(jobs: &[QueueEntry]) -> String {
    if jobs.is_empty() {
        return "*No jobs found*".to_string();
    }

    let mut out = String::from("*Your SLURM Jobs*\n\n");
    for job in jobs {
        out.push_str(&format!(
            "{} *Job {}*: `{}`\n",
            state_emoji(&job.state),
            job.job_id,
            job.name
        ));
        out.push_str(&format!("    • Partition: `{}`\n", job.partition));
        out.push_str(&format!("    • Runtime: `{}`\n", job.time));
        out.push_str(&format!("    • Nodes: `{}`\n", job.nodes));
        if let Some(reason) = job.reason() {
            out.push_str(&format!("    • Reason: `({})`\n", reason));
        }
        out.push('\n');
    }
    out
}

/// Markdown partition overview for `/status`
pub fn cluster_status(partitions: &[PartitionStatus]) -> String {
    if partitions.is_empty() {
        return "*No cluster information available*".to_string();
    }

    let mut out = String::from("🖥️ *Cluster Status*\n\n");
    for p in partitions {
        out.push_str(&format!(
            "{} *Partition {}*\n",
            partition_emoji(&p.state),
            p.partition
        ));
        out.push_str(&format!("    • Availability: `{}`\n", p.avail));
        out.push_str(&format!("    • Nodes: `{}`\n", p.nodes));
        out.push_str(&format!("    • State: `{}`\n", p.state));
        out.push_str(&format!("    • Nodes: `{}`\n", truncate_nodelist(&p.nodelist)));
        out.push('\n');
    }
    out
}

fn truncate_nodelist(nodelist: &str) -> String {
    if nodelist.chars().count() < NODELIST_WIDTH {
        nodelist.to_string()
    } else {
        let head: String = nodelist.chars().take(NODELIST_WIDTH - 3).collect();
        format!("{}...", head)
    }
}

/// Markdown details for `/jobinfo`
pub fn job_info(record: &JobRecord, usage: Option<&ResourceUsage>) -> String {
    const KEY_FIELDS: [(&str, &str); 10] = [
        ("JobId", "Job ID"),
        ("JobName", "Name"),
        ("UserId", "User"),
        ("JobState", "State"),
        ("Partition", "Partition"),
        ("TimeLimit", "Time Limit"),
        ("RunTime", "Runtime"),
        ("NumNodes", "Nodes"),
        ("NumCPUs", "CPUs"),
        ("NodeList", "Node List"),
    ];

    let mut out = format!("📋 *Job Information for {}*\n\n", record.job_id);
    for (key, label) in KEY_FIELDS {
        push_field(&mut out, label, record.get(key));
    }

    match usage {
        Some(usage) => out.push_str(&usage_section(record.state, usage)),
        None if record.state == JobState::Running => out.push_str(
            "\n*Resource Usage:*\n_Resource usage information not available. The job may have just started._\n",
        ),
        None if record.state == JobState::Pending => out.push_str(
            "\n*Resource Usage:*\n_Resource usage information not available for pending jobs._\n",
        ),
        None => {}
    }

    out
}

fn push_field(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push_str(&format!("*{}:* {}\n", label, escape_markdown(value)));
    }
}

fn usage_section(state: JobState, usage: &ResourceUsage) -> String {
    let mut out = String::from("\n*Resource Usage:*\n");
    push_field(&mut out, "Average CPU Usage", usage.ave_cpu());
    push_field(&mut out, "CPU Time", usage.cpu_time());

    if usage.allocated_cpus > 0 {
        out.push_str(&format!("*Allocated CPUs:* {}\n", usage.allocated_cpus));

        if !usage.tasks.is_empty() {
            out.push_str("\n*Per-Task CPU Usage:*\n");
            for task in usage.tasks.iter().take(MAX_TASKS_SHOWN) {
                out.push_str(&format!(
                    "*Task {}:* CPU: {}, Memory: {}\n",
                    task.task_id(),
                    task.ave_cpu(),
                    task.ave_rss()
                ));
            }
            if usage.tasks.len() > MAX_TASKS_SHOWN {
                out.push_str(&format!(
                    "_...and {} more tasks..._\n",
                    usage.tasks.len() - MAX_TASKS_SHOWN
                ));
            }
        }
    }

    push_field(&mut out, "Average Memory (RSS)", usage.ave_rss());
    push_field(&mut out, "Peak Memory (RSS)", usage.max_rss());
    push_field(&mut out, "Average Virtual Memory", usage.ave_vm_size());
    push_field(&mut out, "Peak Virtual Memory", usage.max_vm_size());
    push_field(&mut out, "Average CPU Frequency", usage.ave_cpu_freq());
    push_field(&mut out, "Energy Consumption", usage.consumed_energy());

    if state.is_terminal() {
        if let Some(exit_code) = usage.exit_code() {
            out.push_str(&format!("*Exit Code:* {}\n", exit_code));
            if ExitOutcome::from_exit_code(exit_code).is_success() {
                out.push_str("✅ *Job completed successfully*\n");
            } else {
                out.push_str("❌ *Job failed or had errors*\n");
            }
        }
    }

    out
}

/// Markdown list for `/monitorlist`
///
/// Each entry comes with its current record, or `None` when the scheduler
/// could not be asked.
pub fn monitor_list(entries: &[(MonitorEntry, Option<JobRecord>)]) -> String {
    if entries.is_empty() {
        return "No jobs are currently being monitored.".to_string();
    }

    let mut out = String::from("📋 *Monitored Jobs:*\n\n");
    for (entry, record) in entries {
        let (state, name) = match record {
            Some(record) => (record.display_state(), record.display_name()),
            None => ("Error", "Unknown"),
        };
        out.push_str(&format!(
            "{} *Job {}*: `{}`\n",
            state_emoji(state),
            entry.job_id,
            name
        ));
        out.push_str(&format!("    • State: `{}`\n", state));
        out.push_str(&format!(
            "    • Since: `{}`\n\n",
            entry.created_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    out
}

/// Splits text on line boundaries into chunks of at most `max_chars`
///
/// A single line longer than `max_chars` becomes its own chunk.
pub fn paginate(text: &str, max_chars: usize) -> Vec<String> {
    let mut pages = Vec::new();
    let mut page: Vec<&str> = Vec::new();
    let mut size = 0;

    for line in text.lines() {
        let len = line.chars().count() + 1;
        if size + len > max_chars && !page.is_empty() {
            pages.push(page.join("\n"));
            page.clear();
            size = 0;
        }
        page.push(line);
        size += len;
    }
    if !page.is_empty() {
        pages.push(page.join("\n"));
    }
    pages
}

pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// HTML `<pre>` block around raw tool output
pub fn pre(text: &str) -> String {
    format!("<pre>{}</pre>", escape_html(text))
}
