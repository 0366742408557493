//! Subsidy intake: chat-based enrollment core.

pub mod channels;
pub mod config;
pub mod conversation;
pub mod error;
pub mod intake;
pub mod schedule;
pub mod store;
