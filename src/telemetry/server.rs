// src/telemetry/server.rs
// WebSocket fan-out for frames and control state. Every subscriber gets
// its own latest-only slot and a dedicated delivery task, so one slow
// viewer can never starve the others or stall the producer. Inbound
// messages are parsed as motion commands and forwarded to the drive
// dispatcher; malformed ones are logged and dropped.

use futures::{SinkExt, StreamExt};
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::latest::LatestSlot;
use super::FramePayload;
use crate::drive::MotionCommand;
use crate::JetbotError;

/// One connected viewer.
struct Subscriber {
    id: u64,
    slot: Arc<LatestSlot<Arc<str>>>,
    sender: JoinHandle<()>,
}

/// Latest-only frame/telemetry distribution server.
pub struct TelemetryServer {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    commands: mpsc::Sender<MotionCommand>,
}

impl TelemetryServer {
    /// Creates a server that forwards inbound control messages to
    /// `commands`.
    pub fn new(commands: mpsc::Sender<MotionCommand>) -> Arc<Self> {
        Arc::new(TelemetryServer {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            commands,
        })
    }

    /// Accepts connections on `listener` until the task is dropped.
    pub async fn run(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    info!("new telemetry client: {peer}");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream).await {
                            warn!("telemetry client {peer} closed: {e}");
                        }
                    });
                }
                Err(e) => {
                    warn!("telemetry accept failed: {e}");
                }
            }
        }
    }

    /// Serializes the payload once and offers it to every subscriber's
    /// slot with replace-on-full semantics. Never blocks on a consumer;
    /// a disconnecting subscriber mid-iteration is harmless because
    /// removal only mutates the list under the same lock.
    pub fn broadcast(&self, payload: &FramePayload) -> Result<(), JetbotError> {
        let message: Arc<str> = serde_json::to_string(payload)
            .map_err(|e| JetbotError::Websocket(e.to_string()))?
            .into();
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        for sub in subscribers.iter() {
            sub.slot.offer(Arc::clone(&message));
        }
        Ok(())
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    async fn handle_connection(self: &Arc<Self>, stream: TcpStream) -> Result<(), JetbotError> {
        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| JetbotError::Websocket(e.to_string()))?;
        let (mut tx, mut rx) = ws.split();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(LatestSlot::new());

        // Dedicated delivery task: wait for the next queued item, send it,
        // repeat. Any send failure tears the subscriber down.
        let sender = {
            let slot: Arc<LatestSlot<Arc<str>>> = Arc::clone(&slot);
            let server = Arc::clone(self);
            tokio::spawn(async move {
                loop {
                    let payload = slot.recv().await;
                    if tx.send(Message::text(payload.to_string())).await.is_err() {
                        break;
                    }
                }
                server.remove_subscriber(id);
            })
        };

        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber { id, slot, sender });

        // Inbound loop: control messages ride the same connection.
        while let Some(message) = rx.next().await {
            let message = match message {
                Ok(m) => m,
                Err(e) => {
                    self.remove_subscriber(id);
                    return Err(JetbotError::Websocket(e.to_string()));
                }
            };
            match message {
                Message::Text(text) => self.dispatch_control(text.as_str()).await,
                Message::Close(_) => break,
                _ => {}
            }
        }

        self.remove_subscriber(id);
        Ok(())
    }

    async fn dispatch_control(&self, raw: &str) {
        match serde_json::from_str::<MotionCommand>(raw) {
            Ok(command) => {
                if self.commands.send(command).await.is_err() {
                    warn!("command dispatcher gone, dropping inbound control message");
                }
            }
            Err(e) => {
                // Malformed input never crashes the server.
                warn!("dropping malformed control message ({e}): {raw}");
            }
        }
    }

    /// Removes a subscriber, cancelling its delivery task and draining its
    /// slot. Idempotent: removing an already-removed id is a no-op.
    fn remove_subscriber(&self, id: u64) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pos) = subscribers.iter().position(|s| s.id == id) {
            let sub = subscribers.swap_remove(pos);
            drop(subscribers);
            sub.slot.try_take();
            sub.sender.abort();
            info!("telemetry client {id} removed");
        }
    }
}
