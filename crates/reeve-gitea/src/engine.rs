//! Client for the pipeline engine's plugin API.

use async_trait::async_trait;
use reeve_core::host::MessageDispatch;
use reeve_core::message::{Message, Trigger};
use reeve_core::{Error, Result};
use serde::Serialize;
use tracing::debug;

/// Delivers triggers and messages to the engine over HTTP.
pub struct EngineClient {
    client: reqwest::Client,
    base_url: String,
}

impl EngineClient {
    /// `base_url` must end with `/`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api { status, body });
        }

        Ok(())
    }
}

#[async_trait]
impl MessageDispatch for EngineClient {
    async fn notify_triggers(&self, triggers: Vec<Trigger>) -> Result<()> {
        debug!(count = triggers.len(), "Sending triggers to engine");
        self.post("api/v1/triggers", &triggers).await
    }

    async fn notify_messages(&self, messages: Vec<Message>) -> Result<()> {
        debug!(count = messages.len(), "Sending messages to engine");
        self.post("api/v1/messages", &messages).await
    }
}
