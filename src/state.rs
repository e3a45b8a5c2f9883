use std::sync::Arc;
use std::time::Duration;

use crate::auth::SessionAuthenticator;
use crate::chat::{ChatChannels, ChatRelay};
use crate::config::Config;
use crate::engine::risk::RiskEngine;
use crate::observability::metrics::Metrics;
use crate::store::DurableStore;
use crate::tracking::cache::LocationCache;
use crate::tracking::feeds::LocationFeeds;
use crate::tracking::ingest::LocationIngestor;

/// Everything the handlers share. Built once at startup; the cache and hubs
/// live here rather than in statics so tests get a fresh world each time.
pub struct AppState {
    pub authenticator: SessionAuthenticator,
    pub cache: Arc<LocationCache>,
    pub feeds: Arc<LocationFeeds>,
    pub chat_channels: Arc<ChatChannels>,
    pub store: Arc<dyn DurableStore>,
    pub ingestor: LocationIngestor,
    pub risk: RiskEngine,
    pub chat: ChatRelay,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn DurableStore>) -> Self {
        let metrics = Metrics::new();
        let cache = Arc::new(LocationCache::new(config.location_history_limit));
        let feeds = Arc::new(LocationFeeds::new(config.feed_buffer_size));
        let chat_channels = Arc::new(ChatChannels::new(config.chat_buffer_size));

        let ingestor = LocationIngestor::new(
            cache.clone(),
            feeds.clone(),
            store.clone(),
            Duration::from_millis(config.store_timeout_ms),
            metrics.clone(),
        );
        let risk = RiskEngine::new(cache.clone(), store.clone());
        let chat = ChatRelay::new(store.clone(), chat_channels.clone(), metrics.clone());

        Self {
            authenticator: SessionAuthenticator::from_config(config),
            cache,
            feeds,
            chat_channels,
            store,
            ingestor,
            risk,
            chat,
            metrics,
        }
    }
}
