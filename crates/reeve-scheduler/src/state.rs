//! Shared plugin state read by the scan worker.

use std::sync::{Mutex, PoisonError};

/// Mutable state shared between message handling and the scan worker.
///
/// The lock is only held for the read or write itself.
#[derive(Debug, Default)]
pub struct PluginState {
    webui_present: Mutex<bool>,
}

impl PluginState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a web UI has announced its presence.
    pub fn webui_present(&self) -> bool {
        *self.webui_present.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_webui_present(&self, present: bool) {
        *self.webui_present.lock().unwrap_or_else(PoisonError::into_inner) = present;
    }
}
