//! Background work for the bot
//!
//! The update poller feeds chat updates to the event loop and the job
//! monitor checks monitored jobs on every tick of the loop's timer.

pub mod monitor;
pub mod poller;

pub use monitor::{JobMonitor, TickReport};
pub use poller::{PollEvent, UpdatePoller};
