//! Data Transfer Objects for the chat gateway
//!
//! Lightweight representations of the Bot API payloads the client sends
//! and receives. Only the fields the bot actually reads are modelled.

pub mod telegram;
