use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use avian::errors::AvianError;
use avian::jobs::queue::StoreFuture;
use avian::jobs::{JobQueueStore, MemoryQueueStore, QueueEntry};

/// Controls a [`FlakyQueueStore`] after it has been moved into a dispatcher.
#[derive(Debug, Clone, Default)]
pub struct StoreSwitch {
    down: Arc<AtomicBool>,
    inserts_down: Arc<AtomicBool>,
}

impl StoreSwitch {
    /// Every operation fails until [`StoreSwitch::restore`].
    pub fn go_down(&self) {
        self.down.store(true, Ordering::SeqCst);
    }

    /// Only `insert_if_absent` fails; reads and `take` keep working.
    pub fn fail_inserts(&self) {
        self.inserts_down.store(true, Ordering::SeqCst);
    }

    pub fn restore(&self) {
        self.down.store(false, Ordering::SeqCst);
        self.inserts_down.store(false, Ordering::SeqCst);
    }

    fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }

    fn rejects_inserts(&self) -> bool {
        self.is_down() || self.inserts_down.load(Ordering::SeqCst)
    }
}

/// An in-memory queue store that can be made unavailable, like a Redis
/// server that went away.
#[derive(Debug, Default)]
pub struct FlakyQueueStore {
    inner: MemoryQueueStore,
    switch: StoreSwitch,
}

impl FlakyQueueStore {
    pub fn new() -> (Self, StoreSwitch) {
        let store = Self::default();
        let switch = store.switch.clone();
        (store, switch)
    }
}

fn unavailable<'a, T: Send + 'a>() -> StoreFuture<'a, T> {
    Box::pin(async { Err(AvianError::QueueStore("store unavailable".to_string())) })
}

impl JobQueueStore for FlakyQueueStore {
    fn insert_if_absent(&mut self, entry: QueueEntry) -> StoreFuture<'_, bool> {
        if self.switch.rejects_inserts() {
            return unavailable();
        }
        self.inner.insert_if_absent(entry)
    }

    fn take(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>> {
        if self.switch.is_down() {
            return unavailable();
        }
        self.inner.take(name)
    }

    fn get(&mut self, name: String) -> StoreFuture<'_, Option<QueueEntry>> {
        if self.switch.is_down() {
            return unavailable();
        }
        self.inner.get(name)
    }

    fn names(&mut self) -> StoreFuture<'_, Vec<String>> {
        if self.switch.is_down() {
            return unavailable();
        }
        self.inner.names()
    }
}
