use crate::domain::jobs::ProgressEvent;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

type Subscribers = Mutex<HashMap<u64, mpsc::Sender<ProgressEvent>>>;

/// What a subscriber sees on each wait.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressItem {
    Event(ProgressEvent),
    /// Nothing arrived within the wait but the job is still running.
    Heartbeat,
    /// The job is no longer running, or the subscription was detached.
    Idle,
}

/// Fan-out of job progress with one bounded queue per subscriber.
///
/// Delivery is best-effort: a full queue drops the event for that subscriber
/// only, and late subscribers see nothing published before they attached.
pub struct ProgressBus {
    subscribers: Arc<Subscribers>,
    next_id: Arc<AtomicU64>,
    capacity: usize,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::Sender<ProgressEvent>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("ProgressBus: Lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, tx);
        Subscription {
            id,
            rx,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    /// Offers `event` to every subscriber; returns how many accepted it.
    pub fn publish(&self, event: &ProgressEvent) -> usize {
        let mut guard = self.lock();
        let mut delivered = 0;
        guard.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!("ProgressBus: subscriber {} queue full, dropping event", id);
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl Clone for ProgressBus {
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            next_id: Arc::clone(&self.next_id),
            capacity: self.capacity,
        }
    }
}

/// Receiving end of one subscriber's queue. Detaches on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<ProgressEvent>,
    subscribers: Weak<Subscribers>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits up to `wait` for the next event; on timeout asks `still_running`
    /// whether to report a heartbeat or go idle.
    pub async fn next<F>(&mut self, wait: Duration, still_running: F) -> ProgressItem
    where
        F: FnOnce() -> bool,
    {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(event)) => ProgressItem::Event(event),
            Ok(None) => ProgressItem::Idle,
            Err(_) if still_running() => ProgressItem::Heartbeat,
            Err(_) => ProgressItem::Idle,
        }
    }

    /// Non-blocking receive of anything already queued.
    pub fn try_next(&mut self) -> Option<ProgressEvent> {
        self.rx.try_recv().ok()
    }

    /// Stops delivery to this subscriber. Safe to call more than once.
    pub fn detach(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            let mut guard = subscribers.lock().unwrap_or_else(|p| p.into_inner());
            guard.remove(&self.id);
        }
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
