use dashmap::DashMap;
use futures::Stream;
use log::debug;
use shared::models::JobStatusEvent;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// Key under which firehose subscribers are registered.
const ALL_JOBS: &str = "*";

struct Subscriber {
    id: u64,
    sender: UnboundedSender<JobStatusEvent>,
}

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    subscribers: DashMap<String, Vec<Subscriber>>,
}

impl Registry {
    fn remove(&self, key: &str, id: u64) {
        let now_empty = match self.subscribers.get_mut(key) {
            Some(mut subs) => {
                subs.retain(|s| s.id != id);
                subs.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.subscribers.remove_if(key, |_, subs| subs.is_empty());
        }
    }

    fn deliver(&self, key: &str, event: &JobStatusEvent) {
        if let Some(mut subs) = self.subscribers.get_mut(key) {
            // receivers dropped without unsubscribing are pruned here
            subs.retain(|s| s.sender.send(event.clone()).is_ok());
        }
    }
}

/// Subscriber registry for job status events, keyed by job id.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, job_id: &str) -> Subscription {
        self.register(job_id.to_string())
    }

    /// Receives events for every job.
    pub fn subscribe_all(&self) -> Subscription {
        self.register(ALL_JOBS.to_string())
    }

    fn register(&self, key: String) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = unbounded_channel();
        self.registry
            .subscribers
            .entry(key.clone())
            .or_default()
            .push(Subscriber { id, sender });
        debug!("subscriber {id} registered for {key}");
        Subscription {
            id,
            key,
            receiver,
            registry: Arc::downgrade(&self.registry),
            active: true,
        }
    }

    pub fn publish(&self, event: JobStatusEvent) {
        self.registry.deliver(&event.job_id, &event);
        self.registry.deliver(ALL_JOBS, &event);
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.registry
            .subscribers
            .get(job_id)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}

/// A cancellable, unbounded stream of status events for one job (or all jobs).
pub struct Subscription {
    id: u64,
    key: String,
    receiver: UnboundedReceiver<JobStatusEvent>,
    registry: Weak<Registry>,
    active: bool,
}

impl Subscription {
    /// Stops delivery. Events already queued are discarded.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.key, self.id);
        }
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }

    pub async fn next_event(&mut self) -> Option<JobStatusEvent> {
        if !self.active {
            return None;
        }
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = JobStatusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.active {
            return Poll::Ready(None);
        }
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
