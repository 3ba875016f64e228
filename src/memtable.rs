// in-memory mutable table absorbing recent writes
//
// one RwLock guards both the data map and the expiration map so lookups,
// snapshots and the TTL sweep all see a consistent pair. a background
// sweeper thread wakes once a second and drops expired entries under the
// write lock; lookups also check expiry themselves so the sweep cadence
// never widens visibility

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::RwLock;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Default)]
struct Inner {
    data: HashMap<Vec<u8>, Vec<u8>>,
    // wall-clock expiration in ms since the epoch, only for TTL-bearing keys
    expirations: HashMap<Vec<u8>, u64>,
}

impl Inner {
    fn is_expired(&self, key: &[u8], now: u64) -> bool {
        self.expirations.get(key).is_some_and(|&at| at <= now)
    }
}

pub struct Memtable {
    inner: Arc<RwLock<Inner>>,
    sweeper: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
}

impl Memtable {
    pub fn new() -> Self {
        let inner = Arc::new(RwLock::new(Inner::default()));
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let sweep_inner = Arc::clone(&inner);
        let sweeper = thread::spawn(move || loop {
            match shutdown_rx.recv_timeout(SWEEP_INTERVAL) {
                Err(RecvTimeoutError::Timeout) => sweep(&sweep_inner),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            inner,
            sweeper: Some(sweeper),
            shutdown: Some(shutdown_tx),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let inner = self.inner.read();
        if inner.is_expired(key, now_millis()) {
            return None;
        }
        inner.data.get(key).cloned()
    }

    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        let mut inner = self.inner.write();
        inner.expirations.remove(&key);
        inner.data.insert(key, value);
    }

    pub fn put_ttl(&self, key: Vec<u8>, value: Vec<u8>, ttl: Duration) {
        self.put_with_expiry(key, value, now_millis() + ttl.as_millis() as u64);
    }

    pub fn put_with_expiry(&self, key: Vec<u8>, value: Vec<u8>, expires_at_ms: u64) {
        let mut inner = self.inner.write();
        inner.expirations.insert(key.clone(), expires_at_ms);
        inner.data.insert(key, value);
    }

    pub fn delete(&self, key: &[u8]) {
        let mut inner = self.inner.write();
        inner.data.remove(key);
        inner.expirations.remove(key);
    }

    /// Independent sorted copy of the live (unexpired) entries. Later writes
    /// to the memtable do not show through.
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        let inner = self.inner.read();
        let now = now_millis();
        inner
            .data
            .iter()
            .filter(|(key, _)| !inner.is_expired(key, now))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().data.is_empty()
    }
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Memtable {
    fn drop(&mut self) {
        // dropping the sender wakes the sweeper immediately
        self.shutdown.take();
        if let Some(handle) = self.sweeper.take() {
            let _ = handle.join();
        }
    }
}

fn sweep(inner: &RwLock<Inner>) {
    let now = now_millis();
    let mut inner = inner.write();
    let expired: Vec<Vec<u8>> = inner
        .expirations
        .iter()
        .filter(|(_, &at)| at <= now)
        .map(|(key, _)| key.clone())
        .collect();
    if expired.is_empty() {
        return;
    }
    tracing::debug!(count = expired.len(), "evicting expired entries");
    for key in &expired {
        inner.data.remove(key);
        inner.expirations.remove(key);
    }
}
