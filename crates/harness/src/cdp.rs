//! Minimal Chrome DevTools Protocol client over a websocket.
//!
//! One connection per browser process. Commands are JSON envelopes matched
//! to replies by id; everything without an id is an event and is forwarded
//! to the single event channel (events carry their `sessionId`, so one
//! channel serves every attached target).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

use crate::error::HarnessError;

/// Per-command reply deadline. A browser that stops answering is treated as
/// a crashed context, not waited on forever.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// An event pushed by the browser (no `id` field).
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, String>>>>>;

/// Cheap-to-clone handle for issuing DevTools commands.
#[derive(Clone)]
pub struct CdpClient {
    out_tx: mpsc::UnboundedSender<Message>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl CdpClient {
    /// Connect to a browser's DevTools websocket endpoint.
    ///
    /// Returns the command handle plus the stream of protocol events.
    pub async fn connect(
        ws_url: &str,
    ) -> Result<(CdpClient, mpsc::UnboundedReceiver<CdpEvent>), HarnessError> {
        let (stream, _response) = tokio_tungstenite::connect_async(ws_url).await?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<CdpEvent>();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        // Writer: drains the outbound queue into the socket.
        tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
        });

        // Reader: routes replies to pending calls and events to the channel.
        let reader_pending = pending.clone();
        let reader_closed = closed.clone();
        let reader_out = out_tx.clone();
        tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Ping(payload)) => {
                        let _ = reader_out.send(Message::Pong(payload));
                        continue;
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => continue,
                };
                let value: Value = match serde_json::from_str(&text) {
                    Ok(value) => value,
                    Err(error) => {
                        tracing::warn!(%error, "dropping malformed DevTools frame");
                        continue;
                    }
                };

                if let Some(id) = value.get("id").and_then(Value::as_u64) {
                    let sender = reader_pending.lock().remove(&id);
                    if let Some(sender) = sender {
                        let reply = match value.get("error") {
                            Some(error) => Err(error
                                .get("message")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown protocol error")
                                .to_string()),
                            None => Ok(value.get("result").cloned().unwrap_or(Value::Null)),
                        };
                        let _ = sender.send(reply);
                    }
                    continue;
                }

                if let Some(method) = value.get("method").and_then(Value::as_str) {
                    let event = CdpEvent {
                        method: method.to_string(),
                        params: value.get("params").cloned().unwrap_or(Value::Null),
                        session_id: value
                            .get("sessionId")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    };
                    if event_tx.send(event).is_err() {
                        break;
                    }
                }
            }

            // Connection gone: fail every in-flight call.
            reader_closed.store(true, Ordering::SeqCst);
            let mut pending = reader_pending.lock();
            for (_, sender) in pending.drain() {
                let _ = sender.send(Err("connection closed".to_string()));
            }
        });

        Ok((
            CdpClient {
                out_tx,
                pending,
                next_id: Arc::new(AtomicU64::new(1)),
                closed,
            },
            event_rx,
        ))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Issue one command and await its reply.
    pub async fn call(
        &self,
        session_id: Option<&str>,
        method: &str,
        params: Value,
    ) -> Result<Value, HarnessError> {
        if self.is_closed() {
            return Err(HarnessError::ContextCrash);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut envelope = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        if let Some(session_id) = session_id {
            envelope["sessionId"] = Value::String(session_id.to_string());
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        if self
            .out_tx
            .send(Message::Text(envelope.to_string()))
            .is_err()
        {
            self.pending.lock().remove(&id);
            return Err(HarnessError::ContextCrash);
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(HarnessError::CallTimeout {
                    method: method.to_string(),
                })
            }
            Ok(Err(_)) => Err(HarnessError::ContextCrash),
            Ok(Ok(Err(message))) => {
                if message == "connection closed" {
                    Err(HarnessError::ContextCrash)
                } else {
                    Err(HarnessError::Protocol {
                        method: method.to_string(),
                        message,
                    })
                }
            }
            Ok(Ok(Ok(result))) => Ok(result),
        }
    }
}
