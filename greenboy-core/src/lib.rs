//! Green-Boy Core
//!
//! Core types shared by the Green-Boy bot and its chat client.
//!
//! This crate contains:
//! - Domain types: scheduler-derived job records, monitor entries, resource usage
//! - DTOs: wire types for the chat gateway (updates, messages, keyboards)

pub mod domain;
pub mod dto;
