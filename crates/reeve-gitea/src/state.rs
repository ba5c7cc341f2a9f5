//! Application state.

use std::sync::Arc;

use crate::GiteaPlugin;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub plugin: Arc<GiteaPlugin>,
    /// Secret for `X-Gitea-Signature` verification; unverified when unset.
    pub webhook_secret: Option<String>,
}

impl AppState {
    pub fn new(plugin: Arc<GiteaPlugin>, webhook_secret: Option<String>) -> Self {
        Self {
            plugin,
            webhook_secret,
        }
    }
}
