// frontend/src/web.rs
//
// Browser transport over `web_sys::WebSocket`; retry timers via setTimeout.

use crate::config::FeedConfig;
use crate::error::TransportError;
use crate::manager::ConnectionManager;
use crate::reconnect::{RetryTask, Scheduler, TimerHandle};
use crate::transport::{EventSink, Socket, Transport, TransportEvent};
use gloo_timers::callback::Timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

impl ConnectionManager {
    pub fn browser(config: FeedConfig) -> Self {
        Self::new(config, Arc::new(BrowserTransport), Arc::new(BrowserScheduler))
    }
}

// ----------------------------
// Transport
// ----------------------------

pub struct BrowserTransport;

impl Transport for BrowserTransport {
    fn open(&self, endpoint: &str, sink: EventSink) -> Result<Box<dyn Socket>, TransportError> {
        let ws = WebSocket::new(endpoint)
            .map_err(|e| TransportError::Open(format!("{e:?}")))?;
        debug!(endpoint, generation = sink.generation(), "[WS] connecting");

        let on_open: Closure<dyn FnMut(Event)> = {
            let sink = sink.clone();
            Closure::new(move |_e: Event| sink.emit(TransportEvent::Opened))
        };
        ws.set_onopen(Some(on_open.as_ref().unchecked_ref()));

        let on_message: Closure<dyn FnMut(MessageEvent)> = {
            let sink = sink.clone();
            Closure::new(move |e: MessageEvent| match e.data().as_string() {
                Some(text) => sink.emit(TransportEvent::Frame(text)),
                None => debug!("[WS] non-text frame dropped"),
            })
        };
        ws.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

        // browsers hide the cause; the close event that follows carries the code
        let on_error: Closure<dyn FnMut(Event)> = {
            let sink = sink.clone();
            Closure::new(move |_e: Event| {
                warn!("[WS] socket error");
                sink.emit(TransportEvent::Error("websocket error".to_string()));
            })
        };
        ws.set_onerror(Some(on_error.as_ref().unchecked_ref()));

        let on_close: Closure<dyn FnMut(CloseEvent)> = Closure::new(move |e: CloseEvent| {
            sink.emit(TransportEvent::Closed {
                code: Some(e.code()),
                reason: e.reason(),
            });
        });
        ws.set_onclose(Some(on_close.as_ref().unchecked_ref()));

        Ok(Box::new(BrowserSocket {
            ws,
            _on_open: on_open,
            _on_message: on_message,
            _on_error: on_error,
            _on_close: on_close,
        }))
    }
}

struct BrowserSocket {
    ws: WebSocket,
    // kept alive for as long as the handlers are installed
    _on_open: Closure<dyn FnMut(Event)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(Event)>,
    _on_close: Closure<dyn FnMut(CloseEvent)>,
}

// SAFETY: wasm32-unknown-unknown is single-threaded.
unsafe impl Send for BrowserSocket {}

impl BrowserSocket {
    fn detach(&self) {
        self.ws.set_onopen(None);
        self.ws.set_onmessage(None);
        self.ws.set_onerror(None);
        self.ws.set_onclose(None);
    }
}

impl Socket for BrowserSocket {
    fn close(&mut self) {
        self.detach();
        if let Err(e) = self.ws.close() {
            debug!(error = ?e, "[WS] close failed");
        }
    }
}

impl Drop for BrowserSocket {
    fn drop(&mut self) {
        // handlers must be gone before the closures are freed
        self.detach();
        if self.ws.ready_state() <= WebSocket::OPEN {
            let _ = self.ws.close();
        }
    }
}

// ----------------------------
// Retry timer
// ----------------------------

pub struct BrowserScheduler;

struct BrowserTimer(Timeout);

// SAFETY: wasm32-unknown-unknown is single-threaded.
unsafe impl Send for BrowserTimer {}

impl TimerHandle for BrowserTimer {
    fn cancel(self: Box<Self>) {
        let _ = self.0.cancel();
    }
}

impl Scheduler for BrowserScheduler {
    fn schedule(&self, delay: Duration, task: RetryTask) -> Box<dyn TimerHandle> {
        let millis = u32::try_from(delay.as_millis()).unwrap_or(u32::MAX);
        Box::new(BrowserTimer(Timeout::new(millis, task)))
    }
}
