//! Visitors consuming one pass over a repository's configuration documents.

use async_trait::async_trait;
use reeve_config::SourceDocument;
use reeve_core::host::GitHost;
use reeve_core::repository::FileEntry;

use crate::ScanResult;

/// What a visitor sees of the repository before documents are delivered.
#[derive(Clone, Copy)]
pub struct InitContext<'a> {
    pub host: &'a dyn GitHost,
    pub repository: &'a str,
    /// Commit being scanned; empty for the default branch.
    pub commit: &'a str,
    pub root_files: &'a [FileEntry],
}

/// A consumer of one scan pass.
///
/// For every scan the orchestrator calls `init`, then `scan` for each document
/// in order, then `done` if every document was delivered. `close` runs exactly
/// once afterwards, whether the pass completed or not.
#[async_trait]
pub trait ScanVisitor: private::Sealed + Send {
    async fn init(&mut self, _ctx: InitContext<'_>) -> ScanResult<()> {
        Ok(())
    }

    fn scan(&mut self, document: &SourceDocument) -> ScanResult<()>;

    /// Mark the pass as complete.
    fn done(&mut self) {}

    /// Flush results; the pass is aborted unless `done` was called.
    async fn close(&mut self) {}
}

pub(crate) mod private {
    /// Restricts [`super::ScanVisitor`] to the collectors of this crate.
    pub trait Sealed {}

    impl Sealed for crate::PipelineCollector {}
    impl Sealed for crate::CronRuleCollector {}
    impl Sealed for crate::WebUiActionCollector {}
}
