//! Pipeline schema shared with the pipeline engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Priority assigned to every env value produced by repository discovery.
/// Other sources use higher priorities to override these values.
pub const BASE_PRIORITY: i32 = 0;

/// Trigger conditions keyed by fact dimension (e.g. `branch`, `action`).
pub type Conditions = BTreeMap<String, Condition>;

/// Facts describing a trigger, keyed by dimension.
pub type Facts = BTreeMap<String, Vec<String>>;

/// A pipeline as declared in a repository configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub headline: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Conditions a trigger must satisfy for the pipeline to run.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub when: Conditions,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Engine fields the bridge does not interpret, passed through as declared.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A single pipeline step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub task: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub when: Conditions,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ignore_failure: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A condition over one fact dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_env: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_env: Vec<String>,
}

impl Condition {
    /// A condition including exactly the given values.
    pub fn include<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: values.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Whether the condition constrains nothing.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty()
            && self.include_env.is_empty()
            && self.exclude.is_empty()
            && self.exclude_env.is_empty()
    }
}

/// Fill unset dimensions of `when` from `defaults`.
///
/// A dimension is unset when it is absent or its condition is empty.
/// Declared conditions are never overridden.
pub fn apply_default_conditions(when: &mut Conditions, defaults: &Conditions) {
    for (dimension, default) in defaults {
        let unset = when.get(dimension).is_none_or(Condition::is_empty);
        if unset {
            when.insert(dimension.clone(), default.clone());
        }
    }
}

/// An environment value handed to pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    pub value: String,
    pub priority: i32,
    pub secret: bool,
}

impl Env {
    pub fn plain(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            priority: BASE_PRIORITY,
            secret: false,
        }
    }

    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            priority: BASE_PRIORITY,
            secret: true,
        }
    }
}

/// A parameter of the setup task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Param {
    Literal(String),
    Env { env: String },
}

/// The task that prepares the workspace before the pipeline steps run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub task: String,
    pub params: BTreeMap<String, Param>,
}

/// A fully resolved pipeline ready for execution by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    #[serde(flatten)]
    pub definition: PipelineDefinition,
    pub env: BTreeMap<String, Env>,
    pub facts: Facts,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub task_domains: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_tasks: Vec<String>,
    pub setup: Setup,
}
