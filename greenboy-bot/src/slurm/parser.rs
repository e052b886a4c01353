//! Parsers for Slurm CLI output
//!
//! Two shapes come back from the tools the bot uses: `key=value` dumps
//! (`scontrol show job`) and tables, either pipe-delimited with a header
//! (`sstat -P`, `sacct -P`) or whitespace-aligned (`squeue`, `sinfo`).

use std::collections::BTreeMap;

use greenboy_core::domain::cluster::{PartitionStatus, QueueEntry};
use greenboy_core::domain::job::normalize_job_id;

/// Marker that starts a record in a `scontrol show job` dump
const RECORD_MARKER: &str = "JobId=";

/// Parses a `scontrol show job` dump into `key=value` pairs
///
/// Physical lines are joined with a single space until the next line that
/// starts a record. Each whitespace token is split on its first `=`;
/// tokens without `=` are dropped. Values containing spaces are therefore
/// cut at the space, e.g. `Command=/bin/run a b` keeps only `/bin/run`.
///
/// When the dump holds several records (array tasks), each new record
/// replaces the previous one and the last record is returned.
pub fn parse_job_details(text: &str) -> BTreeMap<String, String> {
    let mut record = String::new();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with(RECORD_MARKER) {
            record.clear();
        } else if !record.is_empty() {
            record.push(' ');
        }
        record.push_str(line);
    }

    parse_key_values(&record)
}

fn parse_key_values(line: &str) -> BTreeMap<String, String> {
    line.split_whitespace()
        .filter_map(|token| token.split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Parses a pipe-delimited table with a header row
///
/// Each data row is zipped positionally with the header; when the counts
/// differ the extra header names or values are dropped.
pub fn parse_pipe_table(text: &str) -> Vec<BTreeMap<String, String>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<&str> = header.split('|').map(str::trim).collect();

    lines
        .map(|line| {
            headers
                .iter()
                .zip(line.split('|').map(str::trim))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect()
        })
        .collect()
}

/// First data row of a pipe-delimited table
pub fn parse_pipe_record(text: &str) -> Option<BTreeMap<String, String>> {
    parse_pipe_table(text).into_iter().next()
}

/// Parses default `squeue` output
///
/// Rows with fewer than eight columns are skipped. Everything from the
/// eighth column on is kept as the node list / pending reason.
pub fn parse_squeue(text: &str) -> Vec<QueueEntry> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 8 {
                return None;
            }
            Some(QueueEntry {
                job_id: parts[0].to_string(),
                partition: parts[1].to_string(),
                name: parts[2].to_string(),
                user: parts[3].to_string(),
                state: parts[4].to_string(),
                time: parts[5].to_string(),
                nodes: parts[6].to_string(),
                nodelist_reason: parts[7..].join(" "),
            })
        })
        .collect()
}

/// Parses `sinfo -o "%20P %5a %14F %8z %10T %N"` output
pub fn parse_sinfo(text: &str) -> Vec<PartitionStatus> {
    text.lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 6 {
                return None;
            }
            Some(PartitionStatus {
                partition: parts[0].to_string(),
                avail: parts[1].to_string(),
                nodes: parts[2].to_string(),
                cpus: parts[3].to_string(),
                state: parts[4].to_string(),
                nodelist: parts[5..].join(" "),
            })
        })
        .collect()
}

/// Extracts the job id from `sbatch` output ("Submitted batch job 123")
pub fn parse_submitted_job_id(text: &str) -> Option<String> {
    if !text.contains("Submitted batch job") {
        return None;
    }
    text.split_whitespace().last().and_then(normalize_job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCONTROL_DUMP: &str = "JobId=111 JobName=train
   UserId=alice(1000) GroupId=alice(1000) MCS_label=N/A
   JobState=RUNNING Reason=None Dependency=(null)
   RunTime=00:10:00 TimeLimit=01:00:00
   Partition=gpu NumNodes=1 NumCPUs=8
   Command=/home/alice/run.sh --epochs 10
";

    #[test]
    fn test_job_details_joins_continuation_lines() {
        let fields = parse_job_details(SCONTROL_DUMP);

        assert_eq!(fields["JobId"], "111");
        assert_eq!(fields["JobName"], "train");
        assert_eq!(fields["JobState"], "RUNNING");
        assert_eq!(fields["NumCPUs"], "8");
        assert_eq!(fields["UserId"], "alice(1000)");
    }

    #[test]
    fn test_job_details_truncates_values_with_spaces() {
        let fields = parse_job_details(SCONTROL_DUMP);

        assert_eq!(fields["Command"], "/home/alice/run.sh");
        assert!(!fields.contains_key("--epochs"));
    }

    #[test]
    fn test_job_details_splits_on_first_equals() {
        let fields = parse_job_details("JobId=5 Comment=a=b");
        assert_eq!(fields["Comment"], "a=b");
    }

    #[test]
    fn test_job_details_keeps_last_record() {
        let dump = "JobId=5_0 JobName=sweep\n   JobState=COMPLETED ExitCode=0:0\n\n\
                    JobId=5_1 JobName=sweep\n   JobState=RUNNING\n";
        let fields = parse_job_details(dump);

        assert_eq!(fields["JobId"], "5_1");
        assert_eq!(fields["JobState"], "RUNNING");
        // Fields of earlier records do not leak into the last one
        assert!(!fields.contains_key("ExitCode"));
    }

    #[test]
    fn test_job_details_empty_input() {
        assert!(parse_job_details("").is_empty());
        assert!(parse_job_details("\n  \n").is_empty());
    }

    #[test]
    fn test_pipe_record() {
        let fields = parse_pipe_record("JobID|AveCPU|MaxRSS\n123|00:01:02|4096K").unwrap();

        assert_eq!(fields.len(), 3);
        assert_eq!(fields["JobID"], "123");
        assert_eq!(fields["AveCPU"], "00:01:02");
        assert_eq!(fields["MaxRSS"], "4096K");
    }

    #[test]
    fn test_pipe_table_truncates_to_shorter_side() {
        let rows = parse_pipe_table("A|B|C\n1|2\n1|2|3|4\n");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 2);
        assert!(!rows[0].contains_key("C"));
        assert_eq!(rows[1].len(), 3);
        assert_eq!(rows[1]["C"], "3");
    }

    #[test]
    fn test_pipe_record_header_only() {
        assert!(parse_pipe_record("JobID|AveCPU\n").is_none());
        assert!(parse_pipe_record("").is_none());
    }

    #[test]
    fn test_squeue_rows() {
        let raw = "JOBID PARTITION NAME USER ST TIME NODES NODELIST(REASON)
 111 gpu train alice R 10:00 1 node01
 112 cpu prep alice PD 0:00 2 (Priority)
 bad line
";
        let entries = parse_squeue(raw);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].job_id, "111");
        assert_eq!(entries[0].state, "R");
        assert_eq!(entries[1].reason(), Some("Priority"));
    }

    #[test]
    fn test_sinfo_rows() {
        let raw = "PARTITION AVAIL NODES(A/I/O/T) S:C:T STATE NODELIST
gpu* up 2/1/0/3 2:16:2 mixed node[01-03]
";
        let rows = parse_sinfo(raw);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].partition, "gpu*");
        assert_eq!(rows[0].nodes, "2/1/0/3");
        assert_eq!(rows[0].nodelist, "node[01-03]");
    }

    #[test]
    fn test_submitted_job_id() {
        assert_eq!(
            parse_submitted_job_id("Submitted batch job 60489632\n").as_deref(),
            Some("60489632")
        );
        assert_eq!(parse_submitted_job_id("sbatch: error"), None);
    }
}
