//! Core domain types
//!
//! These types describe what the bot knows about cluster jobs. They are
//! filled in by the scheduler layer of the bot and persisted by the job
//! registry; nothing in here talks to Slurm or the network.

pub mod cluster;
pub mod job;
pub mod monitor;
pub mod usage;
