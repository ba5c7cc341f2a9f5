//! Configuration resolution for a local checkout.

use async_trait::async_trait;
use reeve_config::files::find_entrypoint;
use reeve_config::{Document, DocumentLoader};
use reeve_core::host::RepositoryFiles;
use reeve_core::repository::{FileEntry, FileKind};
use reeve_core::schema::PipelineDefinition;
use reeve_core::{Error, Result};
use reeve_scheduler::CronRuleset;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Repository name used for the local checkout in messages.
pub const LOCAL_REPOSITORY: &str = "local/checkout";

/// Serves repository files from a directory. Refs are ignored.
pub struct LocalFiles {
    root: PathBuf,
}

impl LocalFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(Error::InvalidInput(format!(
                "path {:?} leaves the repository",
                path
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl RepositoryFiles for LocalFiles {
    async fn fetch_file_content(
        &self,
        _repository: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.resolve(path)?).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Request(format!("reading {}: {}", path, e))),
        }
    }

    async fn list_root_files(&self, _repository: &str, _git_ref: &str) -> Result<Vec<FileEntry>> {
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Request(e.to_string())),
        };

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| Error::Request(e.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Error::Request(e.to_string()))?;
            let kind = if file_type.is_file() {
                FileKind::File
            } else if file_type.is_dir() {
                FileKind::Dir
            } else if file_type.is_symlink() {
                FileKind::Symlink
            } else {
                FileKind::Other
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(FileEntry {
                path: name.clone(),
                name,
                kind,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// The resolved configuration of a checkout.
#[derive(Debug, Default)]
pub struct Resolution {
    pub entrypoint: String,
    pub pipelines: Vec<PipelineDefinition>,
    pub variables: Vec<String>,
    /// Secret names with their encrypted values.
    pub secrets: Vec<(String, String)>,
    pub triggers: CronRuleset,
}

/// Resolve the configuration below `dir`, or `None` without an entrypoint.
pub async fn resolve(dir: &Path) -> anyhow::Result<Option<Resolution>> {
    let files = LocalFiles::new(dir);

    let root_files = files.list_root_files(LOCAL_REPOSITORY, "").await?;
    let Some(entrypoint) = find_entrypoint(&root_files) else {
        return Ok(None);
    };

    let documents = DocumentLoader::new(&files)
        .load(LOCAL_REPOSITORY, &entrypoint.name, "", None)
        .await?;

    let mut resolution = Resolution {
        entrypoint: entrypoint.name.clone(),
        ..Default::default()
    };
    for source in documents {
        match source.document {
            Document::Pipeline(pipeline) => resolution.pipelines.push(pipeline),
            Document::Variable { name, .. } => resolution.variables.push(name),
            Document::Secret { name, value } => resolution.secrets.push((name, value)),
            Document::Trigger { cron, action } => resolution.triggers.add(&cron, &action),
            Document::Include { .. } => {}
        }
    }

    Ok(Some(resolution))
}
