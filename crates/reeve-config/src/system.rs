//! Service configuration parsing.

use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

/// Schedule used for full discovery scans when none is configured.
pub const DEFAULT_DISCOVERY_SCHEDULE: &str = "0 12 * * *";

/// Schedule value that disables scheduled discovery scans.
pub const DISCOVERY_DISABLED: &str = "never";

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";

const TOKEN_ENV: &str = "REEVE_GITEA_TOKEN";
const SECRET_KEY_ENV: &str = "REEVE_GITEA_SECRET_KEY";

/// Service-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    pub gitea: GiteaConfig,
    pub pipelines: PipelinesConfig,
    pub discovery: DiscoveryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiteaConfig {
    /// Base URL used for API calls.
    pub url: String,
    /// Base URL repositories are published under; triggers must match it.
    pub public_url: String,
    /// Base URL pipelines clone from.
    pub clone_url: String,
    pub token: String,
    /// Skip the assignee check when scanning repositories.
    pub unrestricted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelinesConfig {
    pub setup_task: String,
    /// Task domain to task prefix.
    pub task_domains: BTreeMap<String, String>,
    pub trusted_domains: Vec<String>,
    pub trusted_tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Cron schedule for full scans; `None` when disabled.
    pub schedule: Option<String>,
    pub secret_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen: String,
    pub engine_url: String,
    pub webhook_secret: Option<String>,
}

impl SystemConfig {
    /// Read and parse a configuration file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = parse_system_config(&content)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Check that credentials are present after overrides.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.gitea.token.is_empty() {
            return Err(ConfigError::MissingField("gitea.token".to_string()));
        }
        if self.discovery.secret_key.is_empty() {
            return Err(ConfigError::MissingField("discovery.secret-key".to_string()));
        }
        Ok(())
    }

    /// Replace credentials with values from the environment when present.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.gitea.token = token;
        }
        if let Some(key) = lookup(SECRET_KEY_ENV).filter(|v| !v.is_empty()) {
            self.discovery.secret_key = key;
        }
    }
}

/// Parse service configuration from KDL text.
///
/// Required values may be left empty in the file when they are supplied
/// through the environment; [`SystemConfig::load`] applies those overrides.
pub fn parse_system_config(kdl: &str) -> ConfigResult<SystemConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let gitea_node = doc
        .get("gitea")
        .ok_or_else(|| ConfigError::MissingField("gitea".to_string()))?;
    let url = child_string(gitea_node, "url")
        .ok_or_else(|| ConfigError::MissingField("gitea.url".to_string()))?;
    let url = parse_base_url("gitea.url", &url)?;
    let public_url = match child_string(gitea_node, "public-url") {
        Some(value) => parse_base_url("gitea.public-url", &value)?,
        None => url.clone(),
    };
    let clone_url = match child_string(gitea_node, "clone-url") {
        Some(value) => parse_base_url("gitea.clone-url", &value)?,
        None => url.clone(),
    };
    let gitea = GiteaConfig {
        url,
        public_url,
        clone_url,
        token: child_string(gitea_node, "token").unwrap_or_default(),
        unrestricted: child_bool(gitea_node, "unrestricted")?.unwrap_or(false),
    };

    let mut pipelines = PipelinesConfig::default();
    if let Some(node) = doc.get("pipelines") {
        pipelines.setup_task = child_string(node, "setup-task").unwrap_or_default();
        for child in children_named(node, "task-domain") {
            let args = get_all_string_args(child);
            let Some(domain) = args.first() else {
                return Err(ConfigError::InvalidValue {
                    field: "pipelines.task-domain".to_string(),
                    message: "domain name required".to_string(),
                });
            };
            let prefix = args.get(1).cloned().unwrap_or_default();
            pipelines.task_domains.insert(domain.clone(), prefix);
        }
        pipelines.trusted_domains = children_named(node, "trusted-domain")
            .flat_map(get_all_string_args)
            .collect();
        pipelines.trusted_tasks = children_named(node, "trusted-task")
            .flat_map(get_all_string_args)
            .collect();
    }
    if pipelines.setup_task.is_empty() {
        return Err(ConfigError::MissingField("pipelines.setup-task".to_string()));
    }

    let discovery_node = doc.get("discovery");
    let schedule = discovery_node
        .and_then(|n| child_string(n, "schedule"))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_DISCOVERY_SCHEDULE.to_string());
    let discovery = DiscoveryConfig {
        schedule: (schedule != DISCOVERY_DISABLED).then_some(schedule),
        secret_key: discovery_node
            .and_then(|n| child_string(n, "secret-key"))
            .unwrap_or_default(),
    };

    let server_node = doc
        .get("server")
        .ok_or_else(|| ConfigError::MissingField("server".to_string()))?;
    let engine_url = child_string(server_node, "engine-url")
        .ok_or_else(|| ConfigError::MissingField("server.engine-url".to_string()))?;
    let server = ServerConfig {
        listen: child_string(server_node, "listen").unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
        engine_url: parse_base_url("server.engine-url", &engine_url)?,
        webhook_secret: child_string(server_node, "webhook-secret").filter(|s| !s.is_empty()),
    };

    Ok(SystemConfig {
        gitea,
        pipelines,
        discovery,
        server,
    })
}

/// Normalise a base URL: drop query and fragment, ensure a trailing `/`.
pub fn parse_base_url(field: &str, value: &str) -> ConfigResult<String> {
    let mut url = Url::parse(value).map_err(|e| ConfigError::InvalidValue {
        field: field.to_string(),
        message: format!("invalid URL {:?} - {}", value, e),
    })?;
    url.set_query(None);
    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url.to_string())
}

// Helper functions for extracting values from KDL nodes

fn children_named<'a>(node: &'a KdlNode, name: &'a str) -> impl Iterator<Item = &'a KdlNode> {
    node.children()
        .into_iter()
        .flat_map(|children| children.nodes())
        .filter(move |child| child.name().value() == name)
}

fn child_string(node: &KdlNode, name: &str) -> Option<String> {
    children_named(node, name).next().and_then(get_first_string_arg)
}

fn child_bool(node: &KdlNode, name: &str) -> ConfigResult<Option<bool>> {
    let Some(child) = children_named(node, name).next() else {
        return Ok(None);
    };
    child
        .entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_bool())
        .map(Some)
        .ok_or_else(|| ConfigError::InvalidValue {
            field: name.to_string(),
            message: "expected a boolean".to_string(),
        })
}

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_all_string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}
