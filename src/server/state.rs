//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::ChatController;
use crate::core::config::ServerConfig;
use crate::store::Store;

/// Shared application state.
pub struct AppState {
    /// Chat session controller.
    pub chat: ChatController,
    /// Session and message persistence.
    pub store: Store,
    /// HTTP settings.
    pub server: ServerConfig,
}

impl AppState {
    /// Bundle the shared services.
    #[must_use]
    pub fn new(chat: ChatController, store: Store, server: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            chat,
            store,
            server,
        })
    }
}
