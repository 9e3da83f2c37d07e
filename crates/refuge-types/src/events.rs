use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Announcement, Message, Notification};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String },

    /// An announcement was published (delivered to everyone)
    NewAnnouncement { announcement: Announcement },

    /// A message was posted in a conversation the receiver takes part in
    NewMessage {
        conversation_id: Uuid,
        message: Message,
    },

    /// A participant read a conversation
    MessagesRead {
        conversation_id: Uuid,
        reader_id: Uuid,
    },

    /// A notification was created for the receiver
    NewNotification { notification: Notification },

    /// The receiver's notifications were marked read
    NotificationsRead { recipient_id: Uuid },

    /// Acknowledges a `sendMessage` command
    MessageSent { request_id: Uuid, message: Message },

    /// A `sendMessage` command was refused
    MessageRejected { request_id: Uuid, reason: String },
}

/// Event kinds client code can listen for. Acknowledgement frames are
/// consumed by the sender and never surface as a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewAnnouncement,
    NewMessage,
    MessagesRead,
    NewNotification,
    NotificationsRead,
}

impl GatewayEvent {
    pub fn kind(&self) -> Option<EventKind> {
        match self {
            Self::NewAnnouncement { .. } => Some(EventKind::NewAnnouncement),
            Self::NewMessage { .. } => Some(EventKind::NewMessage),
            Self::MessagesRead { .. } => Some(EventKind::MessagesRead),
            Self::NewNotification { .. } => Some(EventKind::NewNotification),
            Self::NotificationsRead { .. } => Some(EventKind::NotificationsRead),
            Self::Ready { .. } | Self::MessageSent { .. } | Self::MessageRejected { .. } => None,
        }
    }

    /// Returns the conversation this event is scoped to, if any.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::NewMessage { conversation_id, .. } => Some(*conversation_id),
            Self::MessagesRead { conversation_id, .. } => Some(*conversation_id),
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Post a message; answered with `messageSent` or `messageRejected`
    /// carrying the same `request_id`
    SendMessage {
        request_id: Uuid,
        conversation_id: Uuid,
        content: String,
    },
}
