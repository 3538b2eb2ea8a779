//! Per-channel message queues.
//!
//! Messages for one channel are handled strictly one after another by a
//! dedicated worker task, so a channel never has two prompts in flight.
//! Different channels run concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::connector::{handle_message, InboundMessage, OutboundReply};
use crate::orchestrator::pool::SessionPool;

type QueueMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<InboundMessage>>>>;

/// Routes inbound messages to their channel's worker.
#[derive(Debug, Clone)]
pub struct ChannelQueues {
    queues: QueueMap,
    pool: Arc<SessionPool>,
    replies: mpsc::UnboundedSender<OutboundReply>,
}

impl ChannelQueues {
    /// Queues that hand messages to `pool` and send replies to `replies`.
    #[must_use]
    pub fn new(pool: Arc<SessionPool>, replies: mpsc::UnboundedSender<OutboundReply>) -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            pool,
            replies,
        }
    }

    /// Enqueue `message` behind anything already waiting on its channel.
    pub async fn dispatch(&self, message: InboundMessage) {
        let key = message.channel_key.clone();
        let sender = {
            let mut queues = self.queues.lock().await;
            if let Some(sender) = queues.get(&key) {
                sender.clone()
            } else {
                let sender = self.spawn_worker(&key);
                queues.insert(key.clone(), sender.clone());
                sender
            }
        };

        if let Err(err) = sender.send(message) {
            // The worker has exited; start a fresh one.
            warn!(channel_key = %key, "channel worker gone, restarting");
            let sender = self.spawn_worker(&key);
            self.queues.lock().await.insert(key, sender.clone());
            if sender.send(err.0).is_err() {
                warn!("message dropped: new channel worker exited immediately");
            }
        }
    }

    /// Number of channels with a worker.
    pub async fn active_channels(&self) -> usize {
        self.queues.lock().await.len()
    }

    fn spawn_worker(&self, key: &str) -> mpsc::UnboundedSender<InboundMessage> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<InboundMessage>();
        let pool = Arc::clone(&self.pool);
        let replies = self.replies.clone();
        let key = key.to_owned();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                let reply = handle_message(&pool, message).await;
                if replies.send(reply).is_err() {
                    debug!(channel_key = %key, "reply receiver gone, worker stopping");
                    break;
                }
            }
        });
        sender
    }
}
