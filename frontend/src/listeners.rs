// frontend/src/listeners.rs
//
// Channel registry: one ordered set of callbacks per event class.

use crate::error::FeedError;
use riverwatch_shared::TelemetryRecord;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::warn;

pub type DataCallback = Arc<dyn Fn(&TelemetryRecord) + Send + Sync>;
pub type StatusCallback = Arc<dyn Fn(bool) + Send + Sync>;
/// `None` means the previously reported error was cleared.
pub type ErrorCallback = Arc<dyn Fn(Option<&FeedError>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Data,
    Status,
    Error,
}

/// Handle returned by registration; removal goes through the handle, never
/// through callback identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId {
    channel: Channel,
    seq: u64,
}

impl ListenerId {
    pub fn channel(&self) -> Channel {
        self.channel
    }
}

/// A callback bound to the channel it listens on.
#[derive(Clone)]
pub enum Listener {
    Data(DataCallback),
    Status(StatusCallback),
    Error(ErrorCallback),
}

impl Listener {
    pub fn data(f: impl Fn(&TelemetryRecord) + Send + Sync + 'static) -> Self {
        Listener::Data(Arc::new(f))
    }

    pub fn status(f: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Listener::Status(Arc::new(f))
    }

    pub fn error(f: impl Fn(Option<&FeedError>) + Send + Sync + 'static) -> Self {
        Listener::Error(Arc::new(f))
    }

    pub fn channel(&self) -> Channel {
        match self {
            Listener::Data(_) => Channel::Data,
            Listener::Status(_) => Channel::Status,
            Listener::Error(_) => Channel::Error,
        }
    }
}

struct Slot<F: ?Sized> {
    seq: u64,
    callback: Arc<F>,
}

/// Insertion-ordered set of callbacks. Adding the same `Arc` twice returns the
/// original handle.
pub(crate) struct ListenerSet<F: ?Sized> {
    channel: Channel,
    slots: Mutex<Vec<Slot<F>>>,
}

impl<F: ?Sized> ListenerSet<F> {
    pub(crate) fn new(channel: Channel) -> Self {
        Self {
            channel,
            slots: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn add(&self, callback: Arc<F>, next_seq: &AtomicU64) -> ListenerId {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());

        let ptr = Arc::as_ptr(&callback) as *const ();
        if let Some(existing) = slots
            .iter()
            .find(|s| Arc::as_ptr(&s.callback) as *const () == ptr)
        {
            return ListenerId {
                channel: self.channel,
                seq: existing.seq,
            };
        }

        let seq = next_seq.fetch_add(1, Ordering::Relaxed);
        slots.push(Slot { seq, callback });
        ListenerId {
            channel: self.channel,
            seq,
        }
    }

    /// Returns false for unknown or already-removed handles.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        if id.channel != self.channel {
            return false;
        }
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        let before = slots.len();
        slots.retain(|s| s.seq != id.seq);
        slots.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Snapshot taken under the lock; callbacks run after it is released so a
    /// callback may add or remove listeners.
    fn snapshot(&self) -> Vec<(u64, Arc<F>)> {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| (s.seq, Arc::clone(&s.callback)))
            .collect()
    }

    /// Call every listener in registration order. A panicking listener is
    /// logged and skipped; the rest still run.
    pub(crate) fn dispatch(&self, call: impl Fn(&F)) {
        for (seq, callback) in self.snapshot() {
            if !self.contains(seq) {
                // removed by an earlier listener during this fan-out
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| call(&*callback))).is_err() {
                warn!(channel = ?self.channel, listener = seq, "telemetry listener panicked");
            }
        }
    }

    fn contains(&self, seq: u64) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|s| s.seq == seq)
    }
}

/// The three channels plus the shared sequence counter for handles.
pub(crate) struct Registry {
    next_seq: AtomicU64,
    pub(crate) data: ListenerSet<dyn Fn(&TelemetryRecord) + Send + Sync>,
    pub(crate) status: ListenerSet<dyn Fn(bool) + Send + Sync>,
    pub(crate) error: ListenerSet<dyn Fn(Option<&FeedError>) + Send + Sync>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            next_seq: AtomicU64::new(1),
            data: ListenerSet::new(Channel::Data),
            status: ListenerSet::new(Channel::Status),
            error: ListenerSet::new(Channel::Error),
        }
    }

    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        match listener {
            Listener::Data(f) => self.data.add(f, &self.next_seq),
            Listener::Status(f) => self.status.add(f, &self.next_seq),
            Listener::Error(f) => self.error.add(f, &self.next_seq),
        }
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        match id.channel {
            Channel::Data => self.data.remove(id),
            Channel::Status => self.status.remove(id),
            Channel::Error => self.error.remove(id),
        }
    }

    pub(crate) fn count(&self, channel: Channel) -> usize {
        match channel {
            Channel::Data => self.data.len(),
            Channel::Status => self.status.len(),
            Channel::Error => self.error.len(),
        }
    }

    pub(crate) fn emit_record(&self, record: &TelemetryRecord) {
        self.data.dispatch(|f| f(record));
    }

    pub(crate) fn emit_status(&self, connected: bool) {
        self.status.dispatch(|f| f(connected));
    }

    pub(crate) fn emit_error(&self, error: Option<&FeedError>) {
        self.error.dispatch(|f| f(error));
    }
}
