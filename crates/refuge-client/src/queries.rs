use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use refuge_types::models::{
    Announcement, Conversation, Match, Message, Need, Notification, Offer,
};

use crate::cache::QueryCache;
use crate::error::ClientError;
use crate::rest::RestClient;
use crate::topics::Topic;

/// Read side of the client. Fresh topics come from the cache; stale ones
/// are refetched. Failures are logged and read as empty.
#[derive(Clone)]
pub struct Queries {
    rest: Arc<RestClient>,
    cache: Arc<QueryCache>,
}

impl Queries {
    pub fn new(rest: Arc<RestClient>, cache: Arc<QueryCache>) -> Self {
        Self { rest, cache }
    }

    async fn cached<T, F>(&self, topic: Topic, load: F) -> T
    where
        T: Serialize + DeserializeOwned + Default,
        F: Future<Output = Result<T, ClientError>>,
    {
        if let Some(value) = self.cache.fresh(topic) {
            match serde_json::from_value(value) {
                Ok(hit) => return hit,
                Err(e) => debug!("Discarding cached {:?}: {}", topic, e),
            }
        }

        match load.await {
            Ok(value) => {
                match serde_json::to_value(&value) {
                    Ok(json) => self.cache.store(topic, json),
                    Err(e) => warn!("Could not cache {:?}: {}", topic, e),
                }
                value
            }
            Err(e) => {
                warn!("Failed to load {:?}: {}", topic, e);
                T::default()
            }
        }
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.cached(Topic::Conversations, self.rest.conversations())
            .await
    }

    pub async fn messages(&self, conversation_id: Uuid) -> Vec<Message> {
        self.cached(
            Topic::Messages(conversation_id),
            self.rest.messages(conversation_id),
        )
        .await
    }

    pub async fn message_unread_count(&self) -> i64 {
        self.cached(Topic::MessageUnreadCount, self.rest.message_unread_count())
            .await
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.cached(Topic::Notifications, self.rest.notifications())
            .await
    }

    pub async fn notification_unread_count(&self) -> i64 {
        self.cached(
            Topic::NotificationUnreadCount,
            self.rest.notification_unread_count(),
        )
        .await
    }

    pub async fn announcements(&self) -> Vec<Announcement> {
        self.cached(Topic::Announcements, self.rest.announcements())
            .await
    }

    pub async fn needs(&self) -> Vec<Need> {
        self.cached(Topic::Needs, self.rest.needs()).await
    }

    pub async fn offers(&self) -> Vec<Offer> {
        self.cached(Topic::Offers, self.rest.offers()).await
    }

    pub async fn matches(&self) -> Vec<Match> {
        self.cached(Topic::Matches, self.rest.matches()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::config::ClientConfig;

    fn offline() -> (Queries, Arc<QueryCache>) {
        let rest = Arc::new(RestClient::new(&ClientConfig {
            api_url: "http://127.0.0.1:9".into(),
            gateway_url: "ws://127.0.0.1:9/gateway".into(),
        }));
        let cache = Arc::new(QueryCache::new());
        (Queries::new(rest, cache.clone()), cache)
    }

    #[tokio::test]
    async fn test_failures_read_as_safe_defaults() {
        let (queries, cache) = offline();
        assert!(queries.conversations().await.is_empty());
        assert_eq!(queries.message_unread_count().await, 0);
        // failures are not cached
        assert!(cache.is_stale(Topic::Conversations));
        assert!(cache.last_known(Topic::MessageUnreadCount).is_none());
    }

    #[tokio::test]
    async fn test_fresh_topics_skip_the_network() {
        let (queries, cache) = offline();
        cache.store(Topic::NotificationUnreadCount, json!(6));
        assert_eq!(queries.notification_unread_count().await, 6);

        cache.invalidate(Topic::NotificationUnreadCount);
        // stale now, and the refetch fails without a token
        assert_eq!(queries.notification_unread_count().await, 0);
    }
}
