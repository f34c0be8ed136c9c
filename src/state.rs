use std::sync::Arc;

use crate::config::Config;
use crate::db::DiagramStore;
use crate::services::conflict_guard::ConflictGuard;
use crate::ws::{Hub, HubSettings};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<Hub>,
    pub guard: ConflictGuard,
    pub store: Arc<dyn DiagramStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn DiagramStore>) -> Self {
        let hub = Hub::new(HubSettings {
            relay_queue_size: config.relay_queue_size,
            outbound_queue_size: config.outbound_queue_size,
            empty_session_grace: config.session_empty_grace(),
        });
        Self {
            config: Arc::new(config),
            guard: ConflictGuard::new(hub.clone()),
            hub,
            store,
        }
    }
}
