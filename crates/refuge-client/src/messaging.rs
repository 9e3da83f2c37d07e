use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};
use uuid::Uuid;

use refuge_types::models::Message;

use crate::cache::QueryCache;
use crate::error::ClientError;
use crate::realtime::ConnectionManager;
use crate::rest::RestClient;
use crate::topics::Topic;

/// The network calls messaging depends on.
pub trait MessageBackend: Send + Sync {
    /// `Ok(None)` when the channel produced no result.
    fn send_realtime(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> impl Future<Output = Result<Option<Message>, ClientError>> + Send;

    fn send_http(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> impl Future<Output = Result<Message, ClientError>> + Send;

    fn mark_read(
        &self,
        conversation_id: Uuid,
    ) -> impl Future<Output = Result<(), ClientError>> + Send;
}

/// Gateway first, REST as the fallback.
#[derive(Clone)]
pub struct Remote {
    pub rest: Arc<RestClient>,
    pub realtime: Arc<ConnectionManager>,
}

impl MessageBackend for Remote {
    async fn send_realtime(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Option<Message>, ClientError> {
        self.realtime.send_message(conversation_id, content).await
    }

    async fn send_http(
        &self,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<Message, ClientError> {
        self.rest.send_message(conversation_id, content).await
    }

    async fn mark_read(&self, conversation_id: Uuid) -> Result<(), ClientError> {
        self.rest.mark_conversation_read(conversation_id).await?;
        Ok(())
    }
}

pub struct MessagingService<B> {
    backend: B,
    cache: Arc<QueryCache>,
}

impl<B: MessageBackend> MessagingService<B> {
    pub fn new(backend: B, cache: Arc<QueryCache>) -> Self {
        Self { backend, cache }
    }

    /// Sends over the gateway, falling back to one HTTP post when the
    /// gateway errors or stays silent.
    pub async fn send(&self, conversation_id: Uuid, content: &str) -> Result<Message, ClientError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ClientError::Validation("Message cannot be empty".into()));
        }

        let message = match self.backend.send_realtime(conversation_id, content).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!("Gateway gave no result, posting message over HTTP");
                self.backend.send_http(conversation_id, content).await?
            }
            Err(e) => {
                warn!("Gateway send failed ({}), posting message over HTTP", e);
                self.backend.send_http(conversation_id, content).await?
            }
        };

        self.cache
            .invalidate_all([Topic::Messages(conversation_id), Topic::Conversations]);
        Ok(message)
    }
}

/// Marks each conversation read once when a view opens it. One tracker
/// lives as long as the view that owns it.
#[derive(Debug, Default)]
pub struct ReadTracker {
    last: Mutex<Option<Uuid>>,
}

impl ReadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a mark-read was attempted.
    pub async fn open<B: MessageBackend>(
        &self,
        service: &MessagingService<B>,
        conversation_id: Uuid,
    ) -> bool {
        {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            if *last == Some(conversation_id) {
                return false;
            }
            *last = Some(conversation_id);
        }

        if let Err(e) = service.backend.mark_read(conversation_id).await {
            warn!("Failed to mark conversation {} read: {}", conversation_id, e);
        }
        service
            .cache
            .invalidate_all([Topic::Conversations, Topic::MessageUnreadCount]);
        true
    }
}
