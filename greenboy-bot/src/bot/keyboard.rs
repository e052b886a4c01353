//! Inline keyboards attached to replies

use super::command::{Callback, QueueFilter};
use greenboy_core::domain::job::JobState;
use greenboy_core::dto::telegram::{InlineKeyboardButton, InlineKeyboardMarkup};

/// Per-job info buttons are only offered for short lists
const MAX_JOB_BUTTONS: usize = 10;

/// Monitor list rows get buttons only up to this many entries
const MAX_MONITOR_BUTTONS: usize = 5;

fn button(text: impl Into<String>, callback: Callback) -> InlineKeyboardButton {
    InlineKeyboardButton::new(text, callback.to_string())
}

/// Filter buttons, plus one info button per job for short lists
pub fn queue(job_ids: &[String]) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![
            button("📊 All Jobs", Callback::Queue(QueueFilter::All)),
            button("⏳ Pending", Callback::Queue(QueueFilter::Pending)),
        ],
        vec![
            button("🏃 Running", Callback::Queue(QueueFilter::Running)),
            button("🖥️ GPU Jobs", Callback::Queue(QueueFilter::Gpu)),
        ],
    ];

    if !job_ids.is_empty() && job_ids.len() <= MAX_JOB_BUTTONS {
        rows.extend(job_ids.iter().map(|id| {
            vec![button(
                format!("📋 Info for job {}", id),
                Callback::JobInfo(id.clone()),
            )]
        }));
    }

    InlineKeyboardMarkup::new(rows)
}

/// Actions offered under `/jobinfo`
///
/// `monitored_by_requester` selects between the monitor and stop buttons.
pub fn job_info(job_id: &str, state: JobState, monitored_by_requester: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![vec![button(
        "❌ Cancel Job",
        Callback::Cancel(job_id.to_string()),
    )]];

    if state == JobState::Running {
        rows.push(vec![button(
            "📊 Detailed CPU & Memory",
            Callback::CpuMem(job_id.to_string()),
        )]);
    }

    if !state.is_terminal() {
        rows.push(vec![if monitored_by_requester {
            button("🔕 Stop Monitoring", Callback::Unmonitor(job_id.to_string()))
        } else {
            button("🔔 Monitor Completion", Callback::Monitor(job_id.to_string()))
        }]);
    }

    InlineKeyboardMarkup::new(rows)
}

pub fn monitor_list(job_ids: &[String]) -> InlineKeyboardMarkup {
    if job_ids.len() > MAX_MONITOR_BUTTONS {
        return InlineKeyboardMarkup::default();
    }

    InlineKeyboardMarkup::new(
        job_ids
            .iter()
            .map(|id| {
                vec![
                    button(format!("📋 Info: {}", id), Callback::JobInfo(id.clone())),
                    button(format!("🛑 Stop: {}", id), Callback::Unmonitor(id.clone())),
                ]
            })
            .collect(),
    )
}

pub fn submitted(job_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("📋 Check Status", Callback::JobInfo(job_id.to_string()))],
        vec![button(
            "🔔 Monitor Completion",
            Callback::Monitor(job_id.to_string()),
        )],
    ])
}

pub fn job_details(job_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button(
        "📋 Job Details",
        Callback::JobInfo(job_id.to_string()),
    )]])
}

pub fn back_to_job(job_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button(
        "⬅️ Back to Job Info",
        Callback::JobInfo(job_id.to_string()),
    )]])
}

pub fn shutdown_offer() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button(
        "🔴 Shutdown Bot",
        Callback::ShutdownConfirm,
    )]])
}

pub fn shutdown_confirm() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Yes, Shutdown", Callback::ShutdownExecute),
        button("❌ Cancel", Callback::ShutdownCancel),
    ]])
}
