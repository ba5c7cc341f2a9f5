//! Messages and triggers exchanged with the pipeline engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Name under which this bridge addresses messages to itself.
pub const PLUGIN_NAME: &str = "gitea";

/// Target name of the web UI presentation collaborator.
pub const WEBUI_TARGET: &str = "webui";

/// Source name used by the engine for its own lifecycle messages.
pub const SERVER_SOURCE: &str = "server";

/// Engine event announcing that all plugins have started.
pub const EVENT_STARTUP_COMPLETE: &str = "startup-complete";

/// An opaque trigger descriptor handed to the engine for discovery.
pub type Trigger = BTreeMap<String, String>;

/// A message routed through the engine to a plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub target: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    /// Binary payload, base64 encoded on the wire.
    #[serde(default, with = "base64_data", skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
}

impl Message {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn option(&self, key: &str) -> &str {
        self.options.get(key).map(String::as_str).unwrap_or_default()
    }

    /// A message asking this bridge to trigger `action` across repositories.
    pub fn action(action: impl Into<String>) -> Self {
        Self::new(PLUGIN_NAME)
            .with_option("type", "action")
            .with_option("action", action)
    }

    /// A message asking this bridge to run an operation such as `rescan`.
    pub fn operation(operation: impl Into<String>) -> Self {
        Self::new(PLUGIN_NAME)
            .with_option("type", "operation")
            .with_option("operation", operation)
    }
}

/// A set of actions published to the web UI under one bundle id.
///
/// Publishing a bundle with no actions removes the bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBundle {
    #[serde(rename = "bundleID")]
    pub bundle_id: String,
    pub actions: Vec<Action>,
}

impl ActionBundle {
    /// The empty bundle for a repository, signalling its removal.
    pub fn empty_for_repository(repository: &str) -> Self {
        Self {
            bundle_id: repository_bundle_id(repository),
            actions: Vec::new(),
        }
    }

    /// Wrap the bundle into a message for the web UI.
    pub fn into_message(self) -> serde_json::Result<Message> {
        let data = serde_json::to_vec(&self)?;
        Ok(Message::new(WEBUI_TARGET)
            .with_option("webui", "actions")
            .with_data(data))
    }
}

/// An action presented in the web UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub groups: Vec<String>,
    pub message: Message,
}

pub fn repository_bundle_id(repository: &str) -> String {
    format!("repo:{}", repository)
}

mod base64_data {
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => serializer.serialize_str(&BASE64.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        encoded
            .map(|s| BASE64.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
