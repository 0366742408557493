//! Fan inbound messages out to one worker per sender.
//!
//! Each sender gets its own queue and task, so one slow store call never
//! stalls other senders while a single sender's messages are still handled
//! in arrival order.

use std::collections::HashMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::engine::Conversation;
use crate::channels::OutgoingResponse;
use crate::intake::RawMessage;

const DEFAULT_QUEUE_DEPTH: usize = 32;

pub struct Dispatcher {
    conversation: Arc<Conversation>,
    queue_depth: usize,
}

impl Dispatcher {
    pub fn new(conversation: Arc<Conversation>) -> Self {
        Self {
            conversation,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Consume `incoming` until it ends, then wait for every queued message
    /// to be answered.
    pub async fn run<S>(self, mut incoming: S, replies: mpsc::Sender<OutgoingResponse>)
    where
        S: Stream<Item = RawMessage> + Unpin,
    {
        let mut queues: HashMap<String, mpsc::Sender<RawMessage>> = HashMap::new();
        let mut workers = JoinSet::new();

        while let Some(msg) = incoming.next().await {
            let queue = queues.entry(msg.sender.clone()).or_insert_with(|| {
                let (tx, rx) = mpsc::channel(self.queue_depth);
                workers.spawn(sender_worker(
                    Arc::clone(&self.conversation),
                    rx,
                    replies.clone(),
                ));
                debug!(sender = %msg.sender, "Sender worker started");
                tx
            });
            let sender = msg.sender.clone();
            if queue.send(msg).await.is_err() {
                warn!(sender = %sender, "Sender worker gone, dropping message");
                queues.remove(&sender);
            }
        }

        info!(senders = queues.len(), "Inbound stream ended, draining workers");
        drop(queues);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Sender worker panicked");
            }
        }
    }
}

async fn sender_worker(
    conversation: Arc<Conversation>,
    mut rx: mpsc::Receiver<RawMessage>,
    replies: mpsc::Sender<OutgoingResponse>,
) {
    while let Some(msg) = rx.recv().await {
        let parts = conversation.handle(&msg).await;
        if parts.is_empty() {
            continue;
        }
        let response = OutgoingResponse {
            sender: msg.sender.clone(),
            in_reply_to: msg.id,
            parts,
        };
        if replies.send(response).await.is_err() {
            debug!(sender = %msg.sender, "Reply channel closed");
            break;
        }
    }
}
