//! Repository layer
//!
//! Repositories abstract the two external systems the bot talks to: the
//! Slurm command line and the chat gateway's push side. They carry no
//! business logic.
//!
//! All repositories are trait-based so services can be tested with fakes.

pub mod push;
pub mod scheduler;

#[cfg(test)]
pub mod mock;

// Re-export traits
pub use push::PushChannel;
pub use scheduler::SchedulerRepository;

// Re-export implementations
pub use push::{OutgoingMessage, TelegramPushChannel, escape_markdown};
pub use scheduler::SlurmRepository;
