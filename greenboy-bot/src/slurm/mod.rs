//! Slurm command line plumbing
//!
//! The executor runs the tools, the parser turns their text into maps and
//! rows. Deciding which tool to run for what lives in the repository layer.

pub mod executor;
pub mod parser;

pub use executor::{CommandExecutor, CommandOutput, ProcessExecutor};
