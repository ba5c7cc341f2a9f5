//! Configuration documents.

use reeve_core::schema::PipelineDefinition;
use serde::Deserialize;
use serde_yaml::Value;

use crate::{ConfigError, ConfigResult};

/// One document of a configuration file, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// A pipeline declaration.
    Pipeline(PipelineDefinition),
    /// A plaintext env value.
    Variable { name: String, value: String },
    /// An encrypted env value.
    Secret { name: String, value: String },
    /// A cron rule triggering an action.
    Trigger { cron: String, action: String },
    /// A reference to another configuration file.
    Include {
        path: String,
        template_data: Option<Value>,
    },
}

impl Document {
    /// The `type` tag of the document.
    pub fn kind(&self) -> &'static str {
        match self {
            Document::Pipeline(_) => "pipeline",
            Document::Variable { .. } => "variable",
            Document::Secret { .. } => "secret",
            Document::Trigger { .. } => "trigger",
            Document::Include { .. } => "include",
        }
    }
}

/// A document together with the file it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub document: Document,
    pub source_file: String,
}

#[derive(Deserialize)]
struct NamedValue {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct TriggerRule {
    #[serde(default)]
    cron: String,
    #[serde(default)]
    action: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncludeRef {
    #[serde(default)]
    path: String,
    #[serde(default)]
    template_data: Option<Value>,
}

/// Decode the stream of YAML documents in `content`.
///
/// Empty documents are skipped; any malformed document or unknown type fails the whole file.
pub fn decode_documents(
    repository: &str,
    file: &str,
    content: &str,
) -> ConfigResult<Vec<SourceDocument>> {
    let yaml_error = |source| ConfigError::Yaml {
        repository: repository.to_string(),
        file: file.to_string(),
        source,
    };

    let mut result = Vec::new();

    for de in serde_yaml::Deserializer::from_str(content) {
        let value = Value::deserialize(de).map_err(yaml_error)?;
        if value.is_null() {
            continue;
        }

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let document = match kind.as_str() {
            "pipeline" => {
                let mut pipeline: PipelineDefinition =
                    serde_yaml::from_value(value).map_err(yaml_error)?;
                pipeline.extra.remove("type");
                Document::Pipeline(pipeline)
            }
            "variable" => {
                let NamedValue { name, value } = serde_yaml::from_value(value).map_err(yaml_error)?;
                Document::Variable { name, value }
            }
            "secret" => {
                let NamedValue { name, value } = serde_yaml::from_value(value).map_err(yaml_error)?;
                Document::Secret { name, value }
            }
            "trigger" => {
                let TriggerRule { cron, action } =
                    serde_yaml::from_value(value).map_err(yaml_error)?;
                Document::Trigger { cron, action }
            }
            "include" => {
                let IncludeRef {
                    path,
                    template_data,
                } = serde_yaml::from_value(value).map_err(yaml_error)?;
                Document::Include {
                    path,
                    template_data,
                }
            }
            _ => {
                return Err(ConfigError::UnknownDocumentType {
                    repository: repository.to_string(),
                    file: file.to_string(),
                    kind,
                });
            }
        };

        result.push(SourceDocument {
            document,
            source_file: file.to_string(),
        });
    }

    Ok(result)
}
