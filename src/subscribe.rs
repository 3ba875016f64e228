// change-event fan-out
//
// every subscriber owns an unbounded channel drained by a dedicated worker
// thread, so publish never blocks on a slow handler. unsubscribing drops the
// sender; the worker drains what was already queued and exits. workers are
// detached and are not awaited on close

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub key: Vec<u8>,
    /// Empty for [`EventKind::Delete`].
    pub value: Vec<u8>,
}

pub(crate) struct Subscriptions {
    subscribers: RwLock<HashMap<u64, Sender<ChangeEvent>>>,
    next_id: AtomicU64,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe<F>(&self, mut handler: F) -> u64
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let (tx, rx) = unbounded::<ChangeEvent>();
        thread::spawn(move || {
            for event in rx {
                handler(event);
            }
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, tx);
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        self.subscribers.write().remove(&id).is_some()
    }

    pub fn publish(&self, event: ChangeEvent) {
        let subscribers = self.subscribers.read();
        for tx in subscribers.values() {
            // send only fails on a disconnected worker, nothing to do then
            let _ = tx.send(event.clone());
        }
    }
}
