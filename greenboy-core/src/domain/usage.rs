//! Resource usage types

use std::collections::BTreeMap;

use crate::domain::job::JobState;

/// Resource usage of a single job
///
/// Running jobs get their `metrics` from live statistics (`sstat`),
/// finished jobs from accounting (`sacct`), which additionally carries
/// `ExitCode` and `Elapsed`. Every metric is optional: Slurm only reports
/// what it has for the job's state and the cluster's plugins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    pub job_id: String,
    pub state: Option<JobState>,
    pub allocated_cpus: u32,
    pub allocated_nodes: Option<String>,
    pub node_list: Option<String>,
    pub metrics: BTreeMap<String, String>,
    pub tasks: Vec<TaskUsage>,
}

impl ResourceUsage {
    /// Returns a metric by its Slurm column name, treating blanks as absent
    pub fn metric(&self, key: &str) -> Option<&str> {
        self.metrics
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn ave_cpu(&self) -> Option<&str> {
        self.metric("AveCPU")
    }

    pub fn cpu_time(&self) -> Option<&str> {
        self.metric("CPUTime")
    }

    pub fn ave_rss(&self) -> Option<&str> {
        self.metric("AveRSS")
    }

    pub fn max_rss(&self) -> Option<&str> {
        self.metric("MaxRSS")
    }

    pub fn ave_vm_size(&self) -> Option<&str> {
        self.metric("AveVMSize")
    }

    pub fn max_vm_size(&self) -> Option<&str> {
        self.metric("MaxVMSize")
    }

    pub fn ave_cpu_freq(&self) -> Option<&str> {
        self.metric("AveCPUFreq")
    }

    pub fn consumed_energy(&self) -> Option<&str> {
        self.metric("ConsumedEnergy")
    }

    pub fn exit_code(&self) -> Option<&str> {
        self.metric("ExitCode")
    }

    pub fn elapsed(&self) -> Option<&str> {
        self.metric("Elapsed")
    }
}

/// One row of the per-task breakdown of a running job
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUsage {
    pub fields: BTreeMap<String, String>,
}

impl TaskUsage {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn task_id(&self) -> &str {
        self.get("TaskID").unwrap_or("Unknown")
    }

    pub fn ave_cpu(&self) -> &str {
        self.get("AveCPU").unwrap_or("Unknown")
    }

    pub fn ave_rss(&self) -> &str {
        self.get("AveRSS").unwrap_or("Unknown")
    }
}

impl From<BTreeMap<String, String>> for TaskUsage {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_metrics_are_absent() {
        let mut usage = ResourceUsage::default();
        usage.metrics.insert("AveCPU".into(), String::new());
        usage.metrics.insert("MaxRSS".into(), "4096K".into());

        assert_eq!(usage.ave_cpu(), None);
        assert_eq!(usage.max_rss(), Some("4096K"));
        assert_eq!(usage.exit_code(), None);
    }

    #[test]
    fn test_task_defaults() {
        let task = TaskUsage::default();
        assert_eq!(task.task_id(), "Unknown");
        assert_eq!(task.ave_cpu(), "Unknown");
    }
}
