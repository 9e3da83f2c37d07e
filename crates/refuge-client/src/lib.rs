//! Client core for Refuge: a typed query cache kept current by gateway
//! events, plus the REST calls and messaging rules views rely on.

pub mod board;
pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod messaging;
pub mod poller;
pub mod queries;
pub mod realtime;
pub mod rest;
pub mod topics;

use std::sync::Arc;

use tracing::warn;

use refuge_types::models::User;

pub use board::Board;
pub use bus::{EventBus, Subscription};
pub use cache::QueryCache;
pub use config::ClientConfig;
pub use error::ClientError;
pub use messaging::{MessagingService, ReadTracker, Remote};
pub use queries::Queries;
pub use realtime::ConnectionManager;
pub use rest::RestClient;
pub use topics::{Topic, topics_for};

/// Application root. Owns the connection, the cache and the subscription
/// that keeps them in sync.
pub struct Refuge {
    pub rest: Arc<RestClient>,
    pub realtime: Arc<ConnectionManager>,
    pub cache: Arc<QueryCache>,
    _invalidation: Subscription,
    pollers: Option<poller::UnreadPollers>,
}

impl Refuge {
    pub fn new(config: ClientConfig) -> Self {
        let bus = EventBus::new();
        let cache = Arc::new(QueryCache::new());
        let invalidation = bus.invalidate_on_events(cache.clone());
        Self {
            rest: Arc::new(RestClient::new(&config)),
            realtime: Arc::new(ConnectionManager::new(config.gateway_url, bus)),
            cache,
            _invalidation: invalidation,
            pollers: None,
        }
    }

    /// Logs in over REST, then opens the gateway. A gateway failure is
    /// logged; REST keeps working and sends fall back to HTTP. Anything
    /// cached for a previous account is dropped.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<User, ClientError> {
        let user = self.rest.login(email, password).await?;
        self.cache.clear();
        if let Some(token) = self.rest.token() {
            if let Err(e) = self.realtime.connect(&token).await {
                warn!("Gateway unavailable: {}", e);
            }
        }
        self.pollers = Some(poller::spawn_unread_pollers(self.cache.clone()));
        Ok(user)
    }

    pub async fn sign_out(&mut self) {
        self.pollers = None;
        self.realtime.disconnect().await;
        self.rest.set_token(None);
        self.cache.clear();
    }

    pub fn queries(&self) -> Queries {
        Queries::new(self.rest.clone(), self.cache.clone())
    }

    pub fn board(&self) -> Board {
        Board::new(self.rest.clone(), self.cache.clone())
    }

    pub fn messaging(&self) -> MessagingService<Remote> {
        MessagingService::new(
            Remote {
                rest: self.rest.clone(),
                realtime: self.realtime.clone(),
            },
            self.cache.clone(),
        )
    }
}
