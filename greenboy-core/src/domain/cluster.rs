//! Queue and partition rows
//!
//! Rows of `squeue` and `sinfo` tables as shown in the chat. These are
//! display-only and carry no invariants.

/// One job line of `squeue` default output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueEntry {
    pub job_id: String,
    pub partition: String,
    pub name: String,
    pub user: String,
    /// Short state code (`R`, `PD`, `CG`, ...)
    pub state: String,
    pub time: String,
    pub nodes: String,
    /// Node list, or the pending reason in parentheses
    pub nodelist_reason: String,
}

impl QueueEntry {
    /// Pending reason without parentheses, e.g. `Priority`
    pub fn reason(&self) -> Option<&str> {
        let start = self.nodelist_reason.find('(')?;
        let end = self.nodelist_reason[start..].find(')')? + start;
        let reason = &self.nodelist_reason[start + 1..end];
        (!reason.is_empty()).then_some(reason)
    }
}

/// One partition line of `sinfo -o "%20P %5a %14F %8z %10T %N"`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionStatus {
    pub partition: String,
    pub avail: String,
    /// Node counts as `allocated/idle/other/total`
    pub nodes: String,
    /// Sockets:cores:threads
    pub cpus: String,
    pub state: String,
    pub nodelist: String,
}
