// Per-sender message queues.
//
// Each sender gets one worker task fed by an unbounded channel, so a user's
// messages reach the router in the order the webhook received them while
// different users are handled concurrently. A worker that stays idle for
// `idle_timeout` removes its queue and exits.

use super::inbound::{InboundMessage, MessageRouter};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

struct SenderQueue {
    tx: mpsc::UnboundedSender<InboundMessage>,
    /// Messages queued or being processed. Only changed while the map entry
    /// is locked (increment) or by the worker (decrement).
    pending: Arc<AtomicUsize>,
}

pub struct SenderQueues {
    router: Arc<MessageRouter>,
    queues: DashMap<String, SenderQueue>,
    idle_timeout: Duration,
}

impl SenderQueues {
    pub fn new(router: Arc<MessageRouter>) -> Arc<Self> {
        Self::with_idle_timeout(router, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(router: Arc<MessageRouter>, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            router,
            queues: DashMap::new(),
            idle_timeout,
        })
    }

    /// Number of senders with a live worker.
    pub fn active_senders(&self) -> usize {
        self.queues.len()
    }

    /// Queues `message` behind any earlier message from the same sender.
    pub fn dispatch(self: &Arc<Self>, message: InboundMessage) {
        let sender_id = message.sender_id.clone();

        let rejected = {
            let queue = self
                .queues
                .entry(sender_id.clone())
                .or_insert_with(|| self.spawn_worker(sender_id.clone()));
            queue.pending.fetch_add(1, Ordering::SeqCst);
            queue.tx.send(message).err().map(|e| e.0)
        };

        // Only reachable if a worker died without removing its queue.
        if let Some(message) = rejected {
            tracing::warn!(sender = %sender_id, "Message worker gone; starting a new one");
            self.queues.remove(&sender_id);
            let queue = self.spawn_worker(sender_id.clone());
            queue.pending.fetch_add(1, Ordering::SeqCst);
            if queue.tx.send(message).is_err() {
                tracing::error!(sender = %sender_id, "Dropping message; worker failed to start");
                return;
            }
            self.queues.insert(sender_id, queue);
        }
    }

    fn spawn_worker(self: &Arc<Self>, sender_id: String) -> SenderQueue {
        let (tx, mut rx) = mpsc::unbounded_channel::<InboundMessage>();
        let pending = Arc::new(AtomicUsize::new(0));

        let queues = Arc::clone(self);
        let worker_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(queues.idle_timeout, rx.recv()).await {
                    Ok(Some(message)) => {
                        queues.router.on_inbound_message(message).await;
                        worker_pending.fetch_sub(1, Ordering::SeqCst);
                    }
                    // Queue removed and drained.
                    Ok(None) => break,
                    Err(_) => {
                        // Removing drops the only sender, so the next recv
                        // returns None once nothing is left.
                        queues.queues.remove_if(&sender_id, |_, queue| {
                            Arc::ptr_eq(&queue.pending, &worker_pending)
                                && queue.pending.load(Ordering::SeqCst) == 0
                        });
                    }
                }
            }
            tracing::debug!(sender = %sender_id, "Message worker stopped");
        });

        SenderQueue { tx, pending }
    }
}
