//! Chat-facing side of the bot
//!
//! Commands and button payloads are parsed in `command`, rendered with
//! `format` and `keyboard`, and handled in `handlers`. The `event_loop`
//! ties them to the update poller and the job monitor.

pub mod command;
pub mod event_loop;
pub mod format;
pub mod handlers;
pub mod keyboard;

pub use event_loop::{EventLoop, LoopExit};
pub use handlers::Handlers;
