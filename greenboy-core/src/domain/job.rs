//! Job domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Job state as reported by the scheduler
///
/// Slurm knows many more states than these; [`JobState::from_slurm`] folds
/// them onto this set. Serialized in Slurm spelling (`RUNNING`, `TIMEOUT`...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
    Timeout,
    Unknown,
}

impl JobState {
    /// Maps a raw Slurm state string onto a [`JobState`]
    ///
    /// Accepts both `scontrol` spelling (`CANCELLED`) and `sacct` spelling
    /// (`CANCELLED by 1000`), and the short `squeue` codes (`R`, `PD`, ...).
    pub fn from_slurm(raw: &str) -> Self {
        let word = raw
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_end_matches('+')
            .to_ascii_uppercase();

        match word.as_str() {
            "PENDING" | "PD" | "REQUEUED" | "RQ" | "REQUEUE_HOLD" | "RH" | "REQUEUE_FED" | "RF"
            | "RESV_DEL_HOLD" | "RD" => JobState::Pending,
            "RUNNING" | "R" | "CONFIGURING" | "CF" | "COMPLETING" | "CG" => JobState::Running,
            "COMPLETED" | "CD" => JobState::Completed,
            "CANCELLED" | "CA" => JobState::Cancelled,
            "FAILED" | "F" | "OUT_OF_MEMORY" | "OOM" | "NODE_FAIL" | "NF" | "BOOT_FAIL" | "BF" => {
                JobState::Failed
            }
            "TIMEOUT" | "TO" | "DEADLINE" | "DL" => JobState::Timeout,
            _ => JobState::Unknown,
        }
    }

    /// Terminal states are absorbing: no further transitions are expected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Failed | JobState::Timeout
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Cancelled => "CANCELLED",
            JobState::Failed => "FAILED",
            JobState::Timeout => "TIMEOUT",
            JobState::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for JobState {
    fn from(raw: String) -> Self {
        JobState::from_slurm(&raw)
    }
}

impl From<JobState> for String {
    fn from(state: JobState) -> Self {
        state.as_str().to_string()
    }
}

/// Reduces a scheduler job id to its base numeric id
///
/// Array and step suffixes are dropped: `60489632_0` and `60489632.batch`
/// both become `60489632`. Returns `None` when the input does not start
/// with a digit.
pub fn normalize_job_id(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let end = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());

    if end == 0 {
        None
    } else {
        Some(raw[..end].to_string())
    }
}

/// Interpretation of a Slurm `ExitCode` field (`<exit>:<signal>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    Failure,
}

impl ExitOutcome {
    /// Only `0:0` counts as success, as in Slurm's own accounting
    pub fn from_exit_code(code: &str) -> Self {
        if code.trim() == "0:0" {
            ExitOutcome::Success
        } else {
            ExitOutcome::Failure
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }
}

/// A job as described by one `scontrol show job` dump
///
/// Read-only snapshot taken at query time. `fields` carries every
/// `key=value` pair of the dump; the typed fields are the ones the bot
/// makes decisions on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    pub name: Option<String>,
    pub state: JobState,
    /// State string exactly as Slurm printed it (e.g. `OUT_OF_MEMORY`)
    pub raw_state: Option<String>,
    pub fields: BTreeMap<String, String>,
}

impl JobRecord {
    /// Builds a record from parsed `key=value` fields
    ///
    /// `requested_id` is used when the dump carries no `JobId` field.
    pub fn from_fields(requested_id: &str, fields: BTreeMap<String, String>) -> Self {
        let job_id = fields
            .get("JobId")
            .cloned()
            .unwrap_or_else(|| requested_id.to_string());
        let name = fields.get("JobName").cloned();
        let raw_state = fields.get("JobState").cloned();
        let state = raw_state
            .as_deref()
            .map(JobState::from_slurm)
            .unwrap_or(JobState::Unknown);

        Self {
            job_id,
            name,
            state,
            raw_state,
            fields,
        }
    }

    /// Returns a field from the dump, treating empty values as absent
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Display name, falling back to "Unknown"
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    /// State to show to humans: the raw Slurm spelling when present
    pub fn display_state(&self) -> &str {
        self.raw_state.as_deref().unwrap_or(self.state.as_str())
    }

    pub fn allocated_cpus(&self) -> Option<u32> {
        self.get("NumCPUs").and_then(|v| v.parse().ok())
    }
}
