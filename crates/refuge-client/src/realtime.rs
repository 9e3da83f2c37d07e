//! Gateway connection owned by the application root.
//!
//! `connect` performs the identify handshake and waits for `ready`, then a
//! reader task feeds events into the [`EventBus`] and a writer task drains
//! outgoing frames. Acknowledgements for `sendMessage` are routed back to
//! the waiting caller by request id instead of the bus.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use uuid::Uuid;

use refuge_types::events::{EventKind, GatewayCommand, GatewayEvent};
use refuge_types::models::Message;

use crate::bus::{EventBus, Subscription};
use crate::error::ClientError;

pub const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

type Ack = oneshot::Sender<Result<Message, String>>;
type Pending = Arc<Mutex<HashMap<Uuid, Ack>>>;

struct Link {
    user_id: Uuid,
    outgoing: mpsc::UnboundedSender<WsMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

pub struct ConnectionManager {
    url: String,
    bus: EventBus,
    link: tokio::sync::Mutex<Option<Link>>,
    pending: Pending,
}

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<Uuid, Ack>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn realtime(e: impl std::fmt::Display) -> ClientError {
    ClientError::Realtime(e.to_string())
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, bus: EventBus) -> Self {
        Self {
            url: url.into(),
            bus,
            link: tokio::sync::Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn on_event<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&GatewayEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    /// Connects and identifies. Returns the user id from `ready`.
    pub async fn connect(&self, token: &str) -> Result<Uuid, ClientError> {
        self.disconnect().await;

        let (ws, _) = connect_async(self.url.as_str()).await.map_err(realtime)?;
        let (mut sink, mut stream) = ws.split();

        let identify = serde_json::to_string(&GatewayCommand::Identify {
            token: token.to_string(),
        })?;
        sink.send(WsMessage::Text(identify.into()))
            .await
            .map_err(realtime)?;

        let user_id = timeout(IDENTIFY_TIMEOUT, wait_for_ready(&mut stream))
            .await
            .map_err(|_| ClientError::Realtime("Timed out waiting for ready".into()))??;
        info!("Gateway ready as {}", user_id);

        let (outgoing, mut rx) = mpsc::unbounded_channel::<WsMessage>();
        let writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if sink.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let bus = self.bus.clone();
        let pending = self.pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => route_frame(text.as_str(), &bus, &pending),
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            fail_pending(&pending, "Connection closed");
            debug!("Gateway reader finished");
        });

        *self.link.lock().await = Some(Link {
            user_id,
            outgoing,
            reader,
            writer,
        });
        Ok(user_id)
    }

    pub async fn disconnect(&self) {
        if let Some(link) = self.link.lock().await.take() {
            link.reader.abort();
            link.writer.abort();
            fail_pending(&self.pending, "Disconnected");
            debug!("Gateway disconnected for {}", link.user_id);
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(|l| !l.reader.is_finished())
    }

    /// Sends a message over the gateway.
    ///
    /// `Ok(None)` means no acknowledgement arrived in time; the message may
    /// or may not have been stored.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Option<Message>, ClientError> {
        let request_id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        {
            let link = self.link.lock().await;
            let Some(link) = link.as_ref() else {
                return Err(ClientError::Realtime("Not connected".into()));
            };
            let frame = serde_json::to_string(&GatewayCommand::SendMessage {
                request_id,
                conversation_id,
                content: content.to_string(),
            })?;
            lock(&self.pending).insert(request_id, tx);
            if link.outgoing.send(WsMessage::Text(frame.into())).is_err() {
                lock(&self.pending).remove(&request_id);
                return Err(ClientError::Realtime("Connection closed".into()));
            }
        }

        match timeout(ACK_TIMEOUT, rx).await {
            Ok(Ok(Ok(message))) => Ok(Some(message)),
            Ok(Ok(Err(reason))) => Err(ClientError::Realtime(reason)),
            Ok(Err(_)) => Err(ClientError::Realtime("Connection closed".into())),
            Err(_) => {
                lock(&self.pending).remove(&request_id);
                warn!("No acknowledgement for message {}", request_id);
                Ok(None)
            }
        }
    }
}

async fn wait_for_ready<S>(stream: &mut S) -> Result<Uuid, ClientError>
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame.map_err(realtime)? {
            WsMessage::Text(text) => {
                if let Ok(GatewayEvent::Ready { user_id, .. }) =
                    serde_json::from_str::<GatewayEvent>(text.as_str())
                {
                    return Ok(user_id);
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
    Err(ClientError::Realtime("Gateway closed during identify".into()))
}

fn route_frame(text: &str, bus: &EventBus, pending: &Pending) {
    let event = match serde_json::from_str::<GatewayEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Unreadable gateway frame: {}", e);
            return;
        }
    };

    match event {
        GatewayEvent::MessageSent {
            request_id,
            message,
        } => {
            if let Some(ack) = lock(pending).remove(&request_id) {
                let _ = ack.send(Ok(message));
            }
        }
        GatewayEvent::MessageRejected { request_id, reason } => {
            if let Some(ack) = lock(pending).remove(&request_id) {
                let _ = ack.send(Err(reason));
            }
        }
        other => bus.emit(&other),
    }
}

fn fail_pending(pending: &Pending, reason: &str) {
    for (_, ack) in lock(pending).drain() {
        let _ = ack.send(Err(reason.to_string()));
    }
}
