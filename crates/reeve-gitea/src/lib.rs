//! Gitea bridge service for the Reeve pipeline engine.
//!
//! Provides the Gitea REST client, the engine dispatch client and the HTTP
//! endpoints through which the engine discovers pipelines, routes messages and
//! invokes CLI methods.

pub mod client;
pub mod discover;
pub mod engine;
pub mod error;
pub mod plugin;
pub mod routes;
pub mod state;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use client::GiteaClient;
pub use engine::EngineClient;
pub use error::{ApiError, PluginError};
pub use plugin::GiteaPlugin;
pub use state::AppState;
