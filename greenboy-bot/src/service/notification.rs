//! Completion notifications
//!
//! Builds the message pushed when a monitored job reaches a terminal state.

use crate::repository::{OutgoingMessage, escape_markdown};
use greenboy_core::domain::job::{ExitOutcome, JobRecord};
use greenboy_core::domain::usage::ResourceUsage;
use greenboy_core::dto::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Composes the completion notification for a finished job
///
/// Missing pieces of `usage` are left out rather than shown as blanks.
pub fn completion_message(record: &JobRecord, usage: Option<&ResourceUsage>) -> OutgoingMessage {
    let mut text = String::from("🔔 *Job Completed Notification*\n\n");
    text.push_str(&format!("*Job ID:* {}\n", record.job_id));
    text.push_str(&format!(
        "*Job Name:* {}\n",
        escape_markdown(record.display_name())
    ));
    text.push_str(&format!(
        "*Final State:* {}\n",
        escape_markdown(record.display_state())
    ));

    if let Some(exit_code) = usage.and_then(ResourceUsage::exit_code) {
        text.push_str(&format!("*Exit Code:* {}\n", exit_code));
        if ExitOutcome::from_exit_code(exit_code).is_success() {
            text.push_str("✅ *Job completed successfully*\n");
        } else {
            text.push_str("❌ *Job failed or had errors*\n");
        }
    }

    let run_time = usage
        .and_then(ResourceUsage::elapsed)
        .or_else(|| record.get("RunTime"));
    if let Some(run_time) = run_time {
        text.push_str(&format!("*Run Time:* {}\n", run_time));
    }

    let metrics: Vec<(&str, &str)> = usage
        .map(|usage| {
            [
                ("Average CPU", usage.ave_cpu()),
                ("Peak Memory", usage.max_rss()),
                ("Energy", usage.consumed_energy()),
            ]
            .into_iter()
            .filter_map(|(label, value)| value.map(|v| (label, v)))
            .collect()
        })
        .unwrap_or_default();

    if !metrics.is_empty() {
        text.push_str("\n*Resource Usage:*\n");
        for (label, value) in metrics {
            text.push_str(&format!("*{}:* {}\n", label, escape_markdown(value)));
        }
    }

    OutgoingMessage::markdown(text).with_keyboard(InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::new("📋 Detailed Job Info", format!("jobinfo_{}", record.job_id)),
    ]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn record(state: &str) -> JobRecord {
        JobRecord::from_fields(
            "111",
            BTreeMap::from([
                ("JobId".to_string(), "111".to_string()),
                ("JobName".to_string(), "train".to_string()),
                ("JobState".to_string(), state.to_string()),
                ("RunTime".to_string(), "00:09:59".to_string()),
            ]),
        )
    }

    fn usage(metrics: &[(&str, &str)]) -> ResourceUsage {
        ResourceUsage {
            job_id: "111".to_string(),
            metrics: metrics
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_successful_exit_code() {
        let usage = usage(&[
            ("ExitCode", "0:0"),
            ("Elapsed", "00:10:00"),
            ("AveCPU", "00:05:00"),
        ]);
        let message = completion_message(&record("COMPLETED"), Some(&usage));

        assert!(message.text.contains("*Final State:* COMPLETED"));
        assert!(message.text.contains("*Exit Code:* 0:0"));
        assert!(message.text.contains("✅ *Job completed successfully*"));
        assert!(message.text.contains("*Run Time:* 00:10:00"));
        assert!(message.text.contains("*Average CPU:* 00:05:00"));
        assert!(!message.text.contains("Peak Memory"));

        let keyboard = message.keyboard.unwrap();
        assert_eq!(keyboard.inline_keyboard[0][0].callback_data, "jobinfo_111");
    }

    #[test]
    fn test_failed_exit_code() {
        let usage = usage(&[("ExitCode", "1:0")]);
        let message = completion_message(&record("FAILED"), Some(&usage));

        assert!(message.text.contains("❌ *Job failed or had errors*"));
    }

    #[test]
    fn test_job_name_is_escaped() {
        let mut record = record("COMPLETED");
        record.name = Some("my_job".to_string());
        let message = completion_message(&record, None);

        assert!(message.text.contains("*Job Name:* my\\_job"));
    }

    #[test]
    fn test_without_usage_falls_back_to_runtime() {
        let message = completion_message(&record("CANCELLED"), None);

        assert!(!message.text.contains("Exit Code"));
        assert!(message.text.contains("*Run Time:* 00:09:59"));
        assert!(!message.text.contains("Resource Usage"));
    }
}
