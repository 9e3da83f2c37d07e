use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::trace;

use crate::cache::QueryCache;
use crate::topics::Topic;

pub const MESSAGE_UNREAD_POLL: Duration = Duration::from_secs(5 * 60);
pub const NOTIFICATION_UNREAD_POLL: Duration = Duration::from_secs(60);

/// Periodically marks the unread badges stale in case a real-time event
/// was missed. Stops when dropped.
pub struct UnreadPollers {
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for UnreadPollers {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

pub fn spawn_unread_pollers(cache: Arc<QueryCache>) -> UnreadPollers {
    UnreadPollers {
        tasks: vec![
            spawn_poller(cache.clone(), Topic::MessageUnreadCount, MESSAGE_UNREAD_POLL),
            spawn_poller(cache, Topic::NotificationUnreadCount, NOTIFICATION_UNREAD_POLL),
        ],
    }
}

fn spawn_poller(cache: Arc<QueryCache>, topic: Topic, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            trace!("Polling {:?}", topic);
            cache.invalidate(topic);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_intervals() {
        let cache = Arc::new(QueryCache::new());
        cache.store(Topic::MessageUnreadCount, json!(0));
        cache.store(Topic::NotificationUnreadCount, json!(0));
        let pollers = spawn_unread_pollers(cache.clone());

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(cache.is_stale(Topic::NotificationUnreadCount));
        assert!(!cache.is_stale(Topic::MessageUnreadCount));

        tokio::time::sleep(Duration::from_secs(4 * 60)).await;
        assert!(cache.is_stale(Topic::MessageUnreadCount));

        drop(pollers);
        cache.store(Topic::NotificationUnreadCount, json!(0));
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!cache.is_stale(Topic::NotificationUnreadCount));
    }
}
