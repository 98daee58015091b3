// Status Broadcaster - publish/subscribe of job status events
//
// Delivery is at-most-once: a subscriber whose receiver is gone is pruned on
// the next publish, nothing is retried.

use crate::domain::{JobEvent, JobId};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

struct Subscriber {
    job_filter: Option<JobId>,
    tx: mpsc::UnboundedSender<JobEvent>,
}

#[derive(Default)]
pub struct StatusBroadcaster {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, optionally limited to one job
    pub fn subscribe(&self, job_filter: Option<JobId>) -> mpsc::UnboundedReceiver<JobEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { job_filter, tx });
        rx
    }

    /// Send an event to every matching subscriber. Returns how many received it.
    pub fn publish(&self, event: &JobEvent) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subscribers.len();
        let mut delivered = 0;

        subscribers.retain(|sub| {
            if sub.tx.is_closed() {
                return false;
            }
            let wanted = sub
                .job_filter
                .as_ref()
                .map_or(true, |job_id| *job_id == event.job_id);
            if !wanted {
                return true;
            }
            match sub.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });

        let pruned = before - subscribers.len();
        if pruned > 0 {
            debug!(pruned, "Pruned dead status subscribers");
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
