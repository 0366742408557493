//! Channel abstraction for message I/O.
//!
//! A channel turns its transport into a stream of [`RawMessage`]s and
//! delivers reply parts back to a sender. Transport details stay behind
//! this trait.

pub mod cli;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::intake::RawMessage;

pub use cli::CliChannel;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = RawMessage> + Send>>;

/// Reply parts for one inbound message, sent in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingResponse {
    pub sender: String,
    pub in_reply_to: Uuid,
    pub parts: Vec<String>,
}

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. The stream ends when the transport closes.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    async fn respond(&self, response: &OutgoingResponse) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
