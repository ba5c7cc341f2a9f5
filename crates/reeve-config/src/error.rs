//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error loading {file} from repository {repository} - invalid file extension, please use one of {allowed}")]
    InvalidExtension {
        repository: String,
        file: String,
        allowed: String,
    },

    #[error("fetching {file} from repository {repository} failed - {source}")]
    Fetch {
        repository: String,
        file: String,
        #[source]
        source: reeve_core::Error,
    },

    #[error("included file {file} not found in repository {repository}")]
    MissingInclude { repository: String, file: String },

    #[error("error resolving include in {file} from repository {repository} - no path specified")]
    MissingIncludePath { repository: String, file: String },

    #[error("error resolving include {file} from repository {repository} - includes nested deeper than {limit} levels")]
    IncludeDepth {
        repository: String,
        file: String,
        limit: usize,
    },

    #[error("error parsing {file} from repository {repository} - {source}")]
    Yaml {
        repository: String,
        file: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("error parsing {file} from repository {repository} - invalid document type {kind:?}")]
    UnknownDocumentType {
        repository: String,
        file: String,
        kind: String,
    },

    #[error("error parsing template {file} from repository {repository} - {source}")]
    Template {
        repository: String,
        file: String,
        #[source]
        source: TemplateError,
    },

    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("undefined variable {0:?}")]
    Undefined(String),

    #[error("variable {name:?} cannot be rendered: {message}")]
    NotRenderable { name: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
