// Deterministic stand-ins for the socket and the retry timer.

use crate::error::{FeedError, TransportError};
use crate::listeners::Listener;
use crate::manager::ConnectionManager;
use crate::reconnect::{RetryTask, Scheduler, TimerHandle};
use crate::transport::{EventSink, Socket, Transport, TransportEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ----------------------------
// Scheduler
// ----------------------------

struct ManualTimer {
    delay: Duration,
    task: Option<RetryTask>,
    cancelled: Arc<AtomicBool>,
}

#[derive(Default)]
pub(crate) struct ManualScheduler {
    timers: Mutex<Vec<ManualTimer>>,
}

impl ManualScheduler {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every delay ever scheduled, in order.
    pub(crate) fn delays(&self) -> Vec<Duration> {
        self.timers.lock().unwrap().iter().map(|t| t.delay).collect()
    }

    pub(crate) fn scheduled(&self) -> usize {
        self.timers.lock().unwrap().len()
    }

    /// Timers neither fired nor cancelled.
    pub(crate) fn pending(&self) -> usize {
        self.timers
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.task.is_some() && !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Run the oldest live timer. Returns false when nothing is pending.
    pub(crate) fn fire_next(&self) -> bool {
        let task = {
            let mut timers = self.timers.lock().unwrap();
            timers
                .iter_mut()
                .find(|t| t.task.is_some() && !t.cancelled.load(Ordering::SeqCst))
                .and_then(|t| t.task.take())
        };
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }
}

struct ManualHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle for ManualHandle {
    fn cancel(self: Box<Self>) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: RetryTask) -> Box<dyn TimerHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.timers.lock().unwrap().push(ManualTimer {
            delay,
            task: Some(task),
            cancelled: cancelled.clone(),
        });
        Box::new(ManualHandle { cancelled })
    }
}

// ----------------------------
// Transport
// ----------------------------

struct FakeConn {
    endpoint: String,
    sink: EventSink,
    closed: Arc<AtomicBool>,
}

#[derive(Default)]
pub(crate) struct FakeTransport {
    conns: Mutex<Vec<FakeConn>>,
    refuse: AtomicBool,
}

struct FakeSocket {
    closed: Arc<AtomicBool>,
}

impl Socket for FakeSocket {
    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl Transport for FakeTransport {
    fn open(&self, endpoint: &str, sink: EventSink) -> Result<Box<dyn Socket>, TransportError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::Open("refused by test".into()));
        }
        let closed = Arc::new(AtomicBool::new(false));
        self.conns.lock().unwrap().push(FakeConn {
            endpoint: endpoint.to_string(),
            sink,
            closed: closed.clone(),
        });
        Ok(Box::new(FakeSocket { closed }))
    }
}

impl FakeTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn refuse_opens(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn opened(&self) -> usize {
        self.conns.lock().unwrap().len()
    }

    pub(crate) fn endpoint(&self, idx: usize) -> String {
        self.conns.lock().unwrap()[idx].endpoint.clone()
    }

    pub(crate) fn is_closed(&self, idx: usize) -> bool {
        self.conns.lock().unwrap()[idx].closed.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, idx: usize, event: TransportEvent) {
        let sink = self.conns.lock().unwrap()[idx].sink.clone();
        sink.emit(event);
    }

    pub(crate) fn accept(&self, idx: usize) {
        self.emit(idx, TransportEvent::Opened);
    }

    pub(crate) fn frame(&self, idx: usize, text: &str) {
        self.emit(idx, TransportEvent::Frame(text.to_string()));
    }

    pub(crate) fn drop_conn(&self, idx: usize) {
        self.emit(
            idx,
            TransportEvent::Closed {
                code: Some(1006),
                reason: String::new(),
            },
        );
    }

    /// Socket error followed by close, as a refused connection reports it.
    pub(crate) fn fail(&self, idx: usize, msg: &str) {
        self.emit(idx, TransportEvent::Error(msg.to_string()));
        self.drop_conn(idx);
    }
}

// ----------------------------
// Event recorder
// ----------------------------

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Seen {
    Data(String, f64),
    Status(bool),
    Error(Option<FeedError>),
}

#[derive(Default)]
pub(crate) struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub(crate) fn attach(manager: &ConnectionManager) -> Arc<Self> {
        let rec = Arc::new(Self::default());
        let r = rec.clone();
        manager.add_listener(Listener::data(move |rec| {
            r.push(Seen::Data(rec.unit_id.clone(), rec.height))
        }));
        let r = rec.clone();
        manager.add_listener(Listener::status(move |up| r.push(Seen::Status(up))));
        let r = rec.clone();
        manager.add_listener(Listener::error(move |e| r.push(Seen::Error(e.cloned()))));
        rec
    }

    fn push(&self, s: Seen) {
        self.seen.lock().unwrap().push(s);
    }

    pub(crate) fn take(&self) -> Vec<Seen> {
        std::mem::take(&mut *self.seen.lock().unwrap())
    }

    pub(crate) fn statuses(&self) -> Vec<bool> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Seen::Status(up) => Some(*up),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn errors(&self) -> Vec<Option<FeedError>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Seen::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn data(&self) -> Vec<(String, f64)> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|s| match s {
                Seen::Data(id, h) => Some((id.clone(), *h)),
                _ => None,
            })
            .collect()
    }
}
