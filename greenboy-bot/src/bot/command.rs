//! Chat commands and button payloads

use std::fmt;

/// A slash command sent as a chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Squeue(Vec<String>),
    Cancel(Option<String>),
    JobInfo(Option<String>),
    Status,
    Submit(Option<String>),
    Monitor(Option<String>),
    Unmonitor(Option<String>),
    MonitorList,
    Custom(Vec<String>),
    Shutdown,
    Unknown(String),
}

impl Command {
    /// Parses `/name[@bot] args...`; `None` for text that is not a command
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?.strip_prefix('/')?;
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let args: Vec<String> = words.map(str::to_string).collect();
        let first = args.first().cloned();

        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "squeue" => Command::Squeue(args),
            "cancel" => Command::Cancel(first),
            "jobinfo" => Command::JobInfo(first),
            "status" => Command::Status,
            "submit" => Command::Submit(first),
            "monitor" => Command::Monitor(first),
            "unmonitor" => Command::Unmonitor(first),
            "monitorlist" => Command::MonitorList,
            "custom" => Command::Custom(args),
            "shutdown" => Command::Shutdown,
            _ => Command::Unknown(name),
        })
    }

    /// Commands anyone may use, authorized or not
    pub fn is_public(&self) -> bool {
        matches!(self, Command::Start | Command::Help | Command::Unknown(_))
    }
}

/// Preset filters behind the queue buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueFilter {
    All,
    Pending,
    Running,
    Gpu,
}

impl QueueFilter {
    pub fn flags(&self) -> Vec<String> {
        let flags: &[&str] = match self {
            QueueFilter::All => &[],
            QueueFilter::Pending => &["-t", "PD"],
            QueueFilter::Running => &["-t", "R"],
            QueueFilter::Gpu => &["-p", "gpu"],
        };
        flags.iter().map(|f| f.to_string()).collect()
    }

    fn as_str(&self) -> &'static str {
        match self {
            QueueFilter::All => "all",
            QueueFilter::Pending => "pending",
            QueueFilter::Running => "running",
            QueueFilter::Gpu => "gpu",
        }
    }
}

/// Payload of an inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Queue(QueueFilter),
    Cancel(String),
    Monitor(String),
    Unmonitor(String),
    JobInfo(String),
    CpuMem(String),
    ShutdownConfirm,
    ShutdownExecute,
    ShutdownCancel,
}

impl Callback {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "shutdown_confirm" => return Some(Callback::ShutdownConfirm),
            "shutdown_execute" => return Some(Callback::ShutdownExecute),
            "shutdown_cancel" => return Some(Callback::ShutdownCancel),
            _ => {}
        }

        if let Some(filter) = data.strip_prefix("squeue_") {
            return match filter {
                "all" => Some(Callback::Queue(QueueFilter::All)),
                "pending" => Some(Callback::Queue(QueueFilter::Pending)),
                "running" => Some(Callback::Queue(QueueFilter::Running)),
                "gpu" => Some(Callback::Queue(QueueFilter::Gpu)),
                _ => None,
            };
        }

        let (kind, job_id) = [
            "cpu_mem_",
            "cancel_",
            "unmonitor_",
            "monitor_",
            "jobinfo_",
        ]
        .into_iter()
        .find_map(|prefix| data.strip_prefix(prefix).map(|rest| (prefix, rest)))?;

        if job_id.is_empty() {
            return None;
        }
        let job_id = job_id.to_string();

        Some(match kind {
            "cpu_mem_" => Callback::CpuMem(job_id),
            "cancel_" => Callback::Cancel(job_id),
            "unmonitor_" => Callback::Unmonitor(job_id),
            "monitor_" => Callback::Monitor(job_id),
            _ => Callback::JobInfo(job_id),
        })
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callback::Queue(filter) => write!(f, "squeue_{}", filter.as_str()),
            Callback::Cancel(id) => write!(f, "cancel_{}", id),
            Callback::Monitor(id) => write!(f, "monitor_{}", id),
            Callback::Unmonitor(id) => write!(f, "unmonitor_{}", id),
            Callback::JobInfo(id) => write!(f, "jobinfo_{}", id),
            Callback::CpuMem(id) => write!(f, "cpu_mem_{}", id),
            Callback::ShutdownConfirm => f.write_str("shutdown_confirm"),
            Callback::ShutdownExecute => f.write_str("shutdown_execute"),
            Callback::ShutdownCancel => f.write_str("shutdown_cancel"),
        }
    }
}
