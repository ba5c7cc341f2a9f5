//! Core domain types and traits for the Reeve Gitea bridge.
//!
//! This crate contains:
//! - Pipeline schema types (definitions, conditions, env, resolved pipelines)
//! - Messages and triggers exchanged with the pipeline engine
//! - Repository identifiers and git host listing types
//! - Collaborator traits for git host access and message dispatch
//! - Secret encryption used by `secret` documents

pub mod error;
pub mod host;
pub mod message;
pub mod repository;
pub mod schema;
pub mod secret;

pub use error::{Error, Result};
pub use repository::RepositoryName;
