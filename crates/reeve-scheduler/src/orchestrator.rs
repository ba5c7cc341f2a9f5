//! Per-repository scan: access check, entrypoint lookup, document delivery.

use reeve_config::DocumentLoader;
use reeve_config::files::find_entrypoint;
use reeve_core::host::GitHost;
use std::sync::Arc;
use tracing::debug;

use crate::visitor::{InitContext, ScanVisitor};
use crate::{ScanError, ScanResult};

/// Runs visitors over the configuration of a repository.
#[derive(Clone)]
pub struct ScanOrchestrator {
    host: Arc<dyn GitHost>,
    unrestricted: bool,
}

impl ScanOrchestrator {
    /// Create an orchestrator. Unless `unrestricted`, only repositories the
    /// current identity is an assignee of are scanned.
    pub fn new(host: Arc<dyn GitHost>, unrestricted: bool) -> Self {
        Self { host, unrestricted }
    }

    pub fn host(&self) -> &Arc<dyn GitHost> {
        &self.host
    }

    /// Scan `repository` at `commit` (empty for the default branch).
    ///
    /// Inaccessible repositories and repositories without an entrypoint are
    /// skipped silently. The first error aborts the pass; every visitor is
    /// closed exactly once either way.
    pub async fn scan_repository(
        &self,
        repository: &str,
        commit: &str,
        visitors: &mut [&mut dyn ScanVisitor],
    ) -> ScanResult<()> {
        if visitors.is_empty() {
            return Ok(());
        }

        let result = self.run(repository, commit, visitors).await;

        for visitor in visitors.iter_mut() {
            visitor.close().await;
        }

        result
    }

    async fn run(
        &self,
        repository: &str,
        commit: &str,
        visitors: &mut [&mut dyn ScanVisitor],
    ) -> ScanResult<()> {
        if !self.unrestricted && !self.has_access(repository).await? {
            debug!(repository, "No access to repository, skipping");
            return Ok(());
        }

        let root_files = self
            .host
            .list_root_files(repository, commit)
            .await
            .map_err(|source| ScanError::Listing {
                repository: repository.to_string(),
                source,
            })?;

        let Some(entrypoint) = find_entrypoint(&root_files) else {
            debug!(repository, "No configuration entrypoint, skipping");
            return Ok(());
        };

        let ctx = InitContext {
            host: self.host.as_ref(),
            repository,
            commit,
            root_files: &root_files,
        };
        for visitor in visitors.iter_mut() {
            visitor.init(ctx).await?;
        }

        let documents = DocumentLoader::new(self.host.as_ref())
            .load(repository, &entrypoint.name, commit, None)
            .await?;

        debug!(repository, entrypoint = %entrypoint.name, documents = documents.len(), "Loaded configuration");

        for document in &documents {
            for visitor in visitors.iter_mut() {
                visitor.scan(document)?;
            }
        }

        for visitor in visitors.iter_mut() {
            visitor.done();
        }

        Ok(())
    }

    async fn has_access(&self, repository: &str) -> ScanResult<bool> {
        let access_error = |source| ScanError::Access {
            repository: repository.to_string(),
            source,
        };

        let identity = self.host.current_identity().await.map_err(access_error)?;

        match self.host.is_assignee(repository, identity).await {
            Ok(assignee) => Ok(assignee),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(access_error(e)),
        }
    }
}
