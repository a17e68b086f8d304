use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};

use crate::browser::messages::{build_command, parse_cdp_frame, CdpFrame, ProtocolError};
use crate::config::CDP_CHANNEL_CAPACITY;
use crate::error::{AppError, Result};

type Reply = std::result::Result<serde_json::Value, ProtocolError>;

/// A DevTools event, forwarded to every subscriber.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: serde_json::Value,
    pub session_id: Option<String>,
}

/// One multiplexed DevTools WebSocket connection to a browser process.
///
/// Commands are correlated to replies by id; events are broadcast. A reader
/// task and a writer task own the two halves of the socket.
pub struct CdpConnection {
    next_id: AtomicU64,
    pending: Arc<DashMap<u64, oneshot::Sender<Reply>>>,
    outbound: mpsc::Sender<String>,
    events: broadcast::Sender<CdpEvent>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str) -> Result<Arc<Self>> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        let (outbound, mut outbound_rx) = mpsc::channel::<String>(CDP_CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(CDP_CHANNEL_CAPACITY);
        let pending: Arc<DashMap<u64, oneshot::Sender<Reply>>> = Arc::new(DashMap::new());
        let closed = Arc::new(AtomicBool::new(false));

        let writer = tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    warn!("CDP write failed: {e}");
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader = {
            let pending = Arc::clone(&pending);
            let events = events.clone();
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                loop {
                    match read.next().await {
                        Some(Ok(Message::Text(text))) => match parse_cdp_frame(&text) {
                            Some(CdpFrame::Response { id, result }) => {
                                if let Some((_, tx)) = pending.remove(&id) {
                                    let _ = tx.send(result);
                                }
                            }
                            Some(CdpFrame::Event { method, params, session_id }) => {
                                // No subscribers is normal for most events.
                                let _ = events.send(CdpEvent { method, params, session_id });
                            }
                            None => {}
                        },
                        Some(Ok(Message::Close(_))) | None => {
                            debug!("CDP connection closed");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!("CDP read failed: {e}");
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
                closed.store(true, Ordering::Relaxed);
                // Dropping the senders fails every in-flight command.
                pending.clear();
            })
        };

        Ok(Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending,
            outbound,
            events,
            closed,
            reader,
            writer,
        }))
    }

    /// Issue one command and wait for its reply.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
        session_id: Option<&str>,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        if self.is_closed() {
            return Err(AppError::Browser(format!("{method}: connection closed")));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = build_command(id, method, params, session_id);
        if self.outbound.send(frame).await.is_err() {
            self.pending.remove(&id);
            return Err(AppError::Browser(format!("{method}: writer stopped")));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(AppError::Browser(format!(
                "{method}: {} ({})",
                err.message, err.code
            ))),
            Ok(Err(_)) => Err(AppError::Browser(format!(
                "{method}: connection closed before reply"
            ))),
            Err(_) => {
                self.pending.remove(&id);
                Err(AppError::Timeout(format!("{method} after {}ms", timeout.as_millis())))
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl Drop for CdpConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}
