//! Repository identifiers and git host listing types.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A validated `owner/name` repository identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{owner}/{name}")]
pub struct RepositoryName {
    owner: String,
    name: String,
}

impl RepositoryName {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The identifier with both segments percent-encoded, for use in URL paths.
    pub fn path_escaped(&self) -> String {
        format!(
            "{}/{}",
            urlencoding::encode(&self.owner),
            urlencoding::encode(&self.name)
        )
    }
}

impl std::str::FromStr for RepositoryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::InvalidInput(format!("malformed repository identifier \"{}\"", s));

        let (owner, name) = s.split_once('/').ok_or_else(malformed)?;
        for part in [owner, name] {
            if part.is_empty() || part == "." || part == ".." || part.contains('/') {
                return Err(malformed());
            }
        }

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

/// Kind of a directory entry returned by the git host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Submodule,
    #[serde(other)]
    Other,
}

/// An entry of a repository directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
}

impl FileEntry {
    pub fn file(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: name.clone(),
            name,
            kind: FileKind::File,
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

/// A repository returned by a repository search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub html_url: String,
    pub clone_url: String,
    pub default_branch: String,
}

/// The head commit of a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    pub message: String,
}

/// Identity of a git host user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct UserId(pub i64);
