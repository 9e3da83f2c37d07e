use uuid::Uuid;

use refuge_types::events::GatewayEvent;
use refuge_types::models::NotificationType;

/// A cached server-side query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Conversations,
    Messages(Uuid),
    MessageUnreadCount,
    Notifications,
    NotificationUnreadCount,
    Announcements,
    Needs,
    Offers,
    Matches,
}

/// Topics made stale by a real-time event.
pub fn topics_for(event: &GatewayEvent) -> Vec<Topic> {
    match event {
        GatewayEvent::NewMessage {
            conversation_id, ..
        } => vec![
            Topic::Conversations,
            Topic::MessageUnreadCount,
            Topic::Messages(*conversation_id),
        ],
        GatewayEvent::MessagesRead { .. } => {
            vec![Topic::Conversations, Topic::MessageUnreadCount]
        }
        GatewayEvent::NewNotification { notification }
            if notification.notification_type == NotificationType::Match =>
        {
            vec![
                Topic::Notifications,
                Topic::NotificationUnreadCount,
                Topic::Matches,
                Topic::Needs,
                Topic::Offers,
            ]
        }
        GatewayEvent::NewNotification { .. } | GatewayEvent::NotificationsRead { .. } => {
            vec![Topic::Notifications, Topic::NotificationUnreadCount]
        }
        GatewayEvent::NewAnnouncement { .. } => vec![Topic::Announcements],
        GatewayEvent::Ready { .. }
        | GatewayEvent::MessageSent { .. }
        | GatewayEvent::MessageRejected { .. } => Vec::new(),
    }
}
