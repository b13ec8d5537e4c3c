// frontend/src/native.rs
//
// Desktop/mobile transport: one tokio task per socket, one per retry timer.

use crate::config::FeedConfig;
use crate::error::{FeedError, TransportError};
use crate::manager::ConnectionManager;
use crate::reconnect::{RetryTask, Scheduler, TimerHandle};
use crate::transport::{EventSink, Socket, Transport, TransportEvent};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

impl ConnectionManager {
    /// Manager driven by the tokio runtime the caller is running on.
    pub fn tokio(config: FeedConfig) -> Result<Self, FeedError> {
        let runtime = Handle::try_current().map_err(|_| FeedError::NoRuntime)?;
        Ok(Self::with_runtime(config, runtime))
    }

    pub fn with_runtime(config: FeedConfig, runtime: Handle) -> Self {
        Self::new(
            config,
            Arc::new(TungsteniteTransport::new(runtime.clone())),
            Arc::new(TokioScheduler::new(runtime)),
        )
    }
}

// ----------------------------
// Transport
// ----------------------------

pub struct TungsteniteTransport {
    runtime: Handle,
}

impl TungsteniteTransport {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

impl Transport for TungsteniteTransport {
    fn open(&self, endpoint: &str, sink: EventSink) -> Result<Box<dyn Socket>, TransportError> {
        let (close_tx, close_rx) = oneshot::channel();
        let task = self
            .runtime
            .spawn(run_socket(endpoint.to_string(), sink, close_rx));
        Ok(Box::new(TungsteniteSocket {
            close_tx: Some(close_tx),
            task,
        }))
    }
}

struct TungsteniteSocket {
    close_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Socket for TungsteniteSocket {
    fn close(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            // task may already be gone
            let _ = tx.send(());
        }
    }
}

impl Drop for TungsteniteSocket {
    fn drop(&mut self) {
        if self.close_tx.is_some() {
            self.task.abort();
        }
    }
}

fn fail(sink: &EventSink, reason: String) {
    sink.emit(TransportEvent::Error(reason.clone()));
    sink.emit(TransportEvent::Closed { code: None, reason });
}

async fn run_socket(endpoint: String, sink: EventSink, mut close_rx: oneshot::Receiver<()>) {
    let generation = sink.generation();
    debug!(endpoint = %endpoint, generation, "[WS] connecting");

    let connected = tokio::select! {
        _ = &mut close_rx => {
            debug!(generation, "[WS] closed before open");
            return;
        }
        res = connect_async(endpoint.as_str()) => res,
    };

    let (mut write, mut read) = match connected {
        Ok((stream, _)) => stream.split(),
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "[WS] connect failed");
            fail(&sink, e.to_string());
            return;
        }
    };
    sink.emit(TransportEvent::Opened);

    loop {
        tokio::select! {
            _ = &mut close_rx => {
                let _ = write.send(Message::Close(None)).await;
                let _ = write.close().await;
                debug!(generation, "[WS] closed by client");
                return;
            }
            item = read.next() => match item {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => sink.emit(TransportEvent::Frame(text)),
                    Err(_) => debug!(len = bytes.len(), "[WS] non-utf8 binary frame dropped"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.as_str().to_owned()),
                        None => (None, String::new()),
                    };
                    sink.emit(TransportEvent::Closed { code, reason });
                    return;
                }
                // ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "[WS] read error");
                    fail(&sink, e.to_string());
                    return;
                }
                None => {
                    sink.emit(TransportEvent::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                    return;
                }
            },
        }
    }
}

// ----------------------------
// Retry timer
// ----------------------------

pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }
}

struct TokioTimer(JoinHandle<()>);

impl TimerHandle for TokioTimer {
    fn cancel(self: Box<Self>) {
        self.0.abort();
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: RetryTask) -> Box<dyn TimerHandle> {
        Box::new(TokioTimer(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn tokio_constructor_needs_a_runtime() {
        assert_eq!(
            ConnectionManager::tokio(FeedConfig::default()).err(),
            Some(FeedError::NoRuntime)
        );
    }

    #[tokio::test]
    async fn timer_fires_after_delay() {
        let sched = TokioScheduler::new(Handle::current());
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let _timer = sched.schedule(
            Duration::from_millis(10),
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_timer_never_fires() {
        let sched = TokioScheduler::new(Handle::current());
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let timer = sched.schedule(
            Duration::from_millis(20),
            Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        timer.cancel();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_transient_error() {
        let mgr = ConnectionManager::tokio(
            FeedConfig::default().with_endpoint("ws://127.0.0.1:9/ws"),
        )
        .unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        mgr.on_error(move |e| {
            let _ = tx.send(e.cloned());
        });

        mgr.start();
        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .flatten();
        assert!(matches!(first, Some(FeedError::Transient(_))));
        mgr.close(true);
        assert!(!mgr.retry_pending());
    }
}
