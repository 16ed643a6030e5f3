//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::server::ServerHandle;
use crate::store::ServerStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ServerStore>,
    pub server: ServerHandle,
}

impl AppState {
    pub fn new(config: Config, store: Arc<ServerStore>, server: ServerHandle) -> Self {
        Self {
            config: Arc::new(config),
            store,
            server,
        }
    }
}
