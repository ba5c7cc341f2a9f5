//! Collaborator traits for the git host and the pipeline engine.

use async_trait::async_trait;

use crate::Result;
use crate::message::{Message, Trigger};
use crate::repository::{CommitInfo, FileEntry, RepositoryInfo, UserId};

/// Read access to repository contents.
#[async_trait]
pub trait RepositoryFiles: Send + Sync {
    /// Fetch the raw content of `path` at `git_ref`.
    /// Returns `None` if the file does not exist.
    async fn fetch_file_content(
        &self,
        repository: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>>;

    /// List the entries of the repository root at `git_ref`.
    /// A missing repository or ref yields an empty listing.
    async fn list_root_files(&self, repository: &str, git_ref: &str) -> Result<Vec<FileEntry>>;
}

/// Permission checks against the git host.
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// The identity the bridge acts as.
    async fn current_identity(&self) -> Result<UserId>;

    /// Whether `identity` is an assignable collaborator of `repository`.
    /// Fails with [`crate::Error::NotFound`] if the repository is not visible to the identity.
    async fn is_assignee(&self, repository: &str, identity: UserId) -> Result<bool>;
}

/// Repository lookup on the git host.
#[async_trait]
pub trait RepositorySearch: Send + Sync {
    /// All repositories visible to the current identity, optionally filtered by `query`.
    async fn search(&self, query: &str) -> Result<Vec<RepositoryInfo>>;

    /// The head commit of `branch`, or `None` if the branch does not exist.
    async fn fetch_commit(&self, repository: &str, branch: &str) -> Result<Option<CommitInfo>>;
}

/// Everything the bridge needs from the git host.
pub trait GitHost: RepositoryFiles + AccessControl + RepositorySearch {}

impl<T> GitHost for T where T: RepositoryFiles + AccessControl + RepositorySearch {}

/// Delivery of triggers and messages to the pipeline engine.
#[async_trait]
pub trait MessageDispatch: Send + Sync {
    async fn notify_triggers(&self, triggers: Vec<Trigger>) -> Result<()>;

    async fn notify_messages(&self, messages: Vec<Message>) -> Result<()>;
}
