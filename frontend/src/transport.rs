// frontend/src/transport.rs

use crate::error::TransportError;
use crate::manager::Shared;
use std::sync::Weak;

/// What a physical socket reports back to the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// One open (or opening) socket. Closing is fire-and-forget.
pub trait Socket: Send {
    fn close(&mut self);
}

/// Opens sockets for the manager.
///
/// Implementations must deliver every event through `sink` asynchronously:
/// never from inside `open` itself.
pub trait Transport: Send + Sync {
    fn open(&self, endpoint: &str, sink: EventSink) -> Result<Box<dyn Socket>, TransportError>;
}

/// Event entry point handed to each socket. Tagged with the connection
/// generation so events from a replaced socket are ignored.
#[derive(Clone)]
pub struct EventSink {
    target: Weak<Shared>,
    generation: u64,
}

impl EventSink {
    pub(crate) fn new(target: Weak<Shared>, generation: u64) -> Self {
        Self { target, generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: TransportEvent) {
        if let Some(shared) = self.target.upgrade() {
            shared.handle_event(self.generation, event);
        }
    }
}
