//! Persist-then-push routines shared by the REST handlers and the gateway
//! `sendMessage` command.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use refuge_db::Database;
use refuge_db::queries::NewNotification;
use refuge_types::events::GatewayEvent;
use refuge_types::models::{Message, Notification, NotificationType};

use crate::dispatcher::Dispatcher;

const PREVIEW_CHARS: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Message content cannot be empty")]
    EmptyContent,
    #[error("Conversation not found")]
    NotParticipant,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Stores a message from `sender` and pushes `newMessage` to every
/// participant's connections. Participants with no live connection get a
/// `message` notification instead.
pub async fn deliver_message(
    db: Arc<Database>,
    dispatcher: &Dispatcher,
    sender: Uuid,
    conversation_id: Uuid,
    content: &str,
) -> Result<Message, DeliveryError> {
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(DeliveryError::EmptyContent);
    }

    let db_task = db.clone();
    let (message, participants) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        if !db_task.is_participant(conversation_id, sender)? {
            return Ok(None);
        }
        let message = db_task.insert_message(conversation_id, sender, &content)?;
        let participants = db_task.participant_ids(conversation_id)?;
        Ok(Some((message, participants)))
    })
    .await
    .map_err(anyhow::Error::from)??
    .ok_or(DeliveryError::NotParticipant)?;

    debug!(
        "Message {} in {} delivered to {} participants",
        message.id,
        conversation_id,
        participants.len()
    );

    let event = GatewayEvent::NewMessage {
        conversation_id,
        message: message.clone(),
    };
    let mut offline = Vec::new();
    for participant in participants {
        let reached = dispatcher.send_to_user(participant, event.clone()).await;
        if reached == 0 && participant != sender {
            offline.push(participant);
        }
    }

    if !offline.is_empty() {
        let preview: String = message.content.chars().take(PREVIEW_CHARS).collect();
        for recipient in offline {
            let new = NewNotification {
                recipient_id: recipient,
                title: "New message".to_string(),
                description: preview.clone(),
                notification_type: NotificationType::Message,
                entity_id: Some(conversation_id),
            };
            if let Err(e) = notify(db.clone(), dispatcher, new).await {
                warn!("Failed to record message notification for {}: {}", recipient, e);
            }
        }
    }

    Ok(message)
}

/// Stores a notification and pushes `newNotification` to its recipient.
pub async fn notify(
    db: Arc<Database>,
    dispatcher: &Dispatcher,
    new: NewNotification,
) -> anyhow::Result<Notification> {
    let notification = tokio::task::spawn_blocking(move || db.create_notification(&new)).await??;
    dispatcher
        .send_to_user(
            notification.recipient_id,
            GatewayEvent::NewNotification {
                notification: notification.clone(),
            },
        )
        .await;
    Ok(notification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use refuge_types::api::RegisterRequest;
    use refuge_types::models::Role;

    struct TempDb {
        db: Arc<Database>,
        path: std::path::PathBuf,
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
            }
        }
    }

    fn temp_db() -> TempDb {
        let path = std::env::temp_dir().join(format!("refuge_gateway_test_{}.db", Uuid::new_v4()));
        let db = Arc::new(Database::open(&path).unwrap());
        TempDb { db, path }
    }

    fn user(db: &Database, name: &str, role: Role) -> Uuid {
        db.create_user(
            &RegisterRequest {
                name: name.to_string(),
                email: format!("{}@example.org", name.to_lowercase()),
                password: String::new(),
                role: Some(role),
                language: None,
                organization_name: None,
                contact: None,
                location: None,
            },
            "hash",
        )
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_message_reaches_participants_and_offline_get_notified() {
        let t = temp_db();
        let amira = user(&t.db, "Amira", Role::Refugee);
        let vera = user(&t.db, "Vera", Role::Volunteer);
        let (conversation, _) = t.db.get_or_create_conversation(amira, vera).unwrap();

        let dispatcher = Dispatcher::new();
        let (_conn, mut amira_rx) = dispatcher.register_user_channel(amira).await;

        let message =
            deliver_message(t.db.clone(), &dispatcher, amira, conversation.id, "  hello  ")
                .await
                .unwrap();
        assert_eq!(message.content, "hello");

        match amira_rx.recv().await {
            Some(GatewayEvent::NewMessage { conversation_id, .. }) => {
                assert_eq!(conversation_id, conversation.id)
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let notes = t.db.list_notifications(vera).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].notification_type, NotificationType::Message);
        assert!(t.db.list_notifications(amira).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_outsiders() {
        let t = temp_db();
        let amira = user(&t.db, "Amira", Role::Refugee);
        let vera = user(&t.db, "Vera", Role::Volunteer);
        let nora = user(&t.db, "Nora", Role::Ngo);
        let (conversation, _) = t.db.get_or_create_conversation(amira, vera).unwrap();
        let dispatcher = Dispatcher::new();

        let empty = deliver_message(t.db.clone(), &dispatcher, amira, conversation.id, "   ").await;
        assert!(matches!(empty, Err(DeliveryError::EmptyContent)));

        let outsider =
            deliver_message(t.db.clone(), &dispatcher, nora, conversation.id, "hi").await;
        assert!(matches!(outsider, Err(DeliveryError::NotParticipant)));
        assert!(t.db.get_messages(conversation.id, 10, None).unwrap().is_empty());
    }
}
