//! Configuration handling for the Reeve Gitea bridge.
//!
//! This crate handles:
//! - Locating the `.reeve` entrypoint and README in a repository root
//! - Template rendering of `.tmpl` configuration files
//! - Decoding configuration documents and resolving includes
//! - Service configuration (KDL)

pub mod document;
pub mod error;
pub mod files;
pub mod loader;
pub mod system;
pub mod template;

pub use document::{Document, SourceDocument};
pub use error::{ConfigError, ConfigResult, TemplateError};
pub use loader::DocumentLoader;
pub use system::SystemConfig;
pub use template::TemplateRenderer;
