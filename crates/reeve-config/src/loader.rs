//! Recursive configuration loading.
//!
//! The loader fetches the entrypoint, renders it if templated, decodes its
//! documents and replaces every `include` document with the resolved documents
//! of the referenced file. Expansion is depth first and preserves file order.

use async_recursion::async_recursion;
use reeve_core::host::RepositoryFiles;
use serde_yaml::Value;
use tracing::debug;

use crate::document::{Document, SourceDocument, decode_documents};
use crate::files::{CONFIG_EXTENSIONS, has_config_extension, is_template};
use crate::{ConfigError, ConfigResult, TemplateRenderer};

/// Maximum include nesting below the entrypoint.
pub const MAX_INCLUDE_DEPTH: usize = 32;

static NO_TEMPLATE_DATA: Value = Value::Null;

/// Loads configuration documents from a repository.
pub struct DocumentLoader<'a, F: RepositoryFiles + ?Sized> {
    files: &'a F,
}

impl<'a, F: RepositoryFiles + ?Sized> DocumentLoader<'a, F> {
    pub fn new(files: &'a F) -> Self {
        Self { files }
    }

    /// Load `entrypoint` and all files it includes at `git_ref`.
    ///
    /// A missing entrypoint yields no documents.
    pub async fn load(
        &self,
        repository: &str,
        entrypoint: &str,
        git_ref: &str,
        template_data: Option<&Value>,
    ) -> ConfigResult<Vec<SourceDocument>> {
        let data = template_data.unwrap_or(&NO_TEMPLATE_DATA);
        self.load_file(repository, entrypoint, git_ref, data, 0).await
    }

    #[async_recursion]
    async fn load_file(
        &self,
        repository: &str,
        file: &str,
        git_ref: &str,
        template_data: &Value,
        depth: usize,
    ) -> ConfigResult<Vec<SourceDocument>> {
        if !has_config_extension(file) {
            return Err(ConfigError::InvalidExtension {
                repository: repository.to_string(),
                file: file.to_string(),
                allowed: CONFIG_EXTENSIONS.join(", "),
            });
        }

        debug!(repository, file, git_ref, depth, "Loading configuration file");

        let content = self
            .files
            .fetch_file_content(repository, file, git_ref)
            .await
            .map_err(|source| ConfigError::Fetch {
                repository: repository.to_string(),
                file: file.to_string(),
                source,
            })?;

        let Some(content) = content else {
            if depth == 0 {
                debug!(repository, file, "Configuration entrypoint not found");
                return Ok(Vec::new());
            }
            return Err(ConfigError::MissingInclude {
                repository: repository.to_string(),
                file: file.to_string(),
            });
        };

        let content = if is_template(file) {
            TemplateRenderer::new(template_data)
                .render(&content)
                .map_err(|source| ConfigError::Template {
                    repository: repository.to_string(),
                    file: file.to_string(),
                    source,
                })?
        } else {
            content
        };

        let documents = decode_documents(repository, file, &content)?;
        let mut result = Vec::with_capacity(documents.len());

        for doc in documents {
            if let Document::Include {
                path,
                template_data,
            } = &doc.document
            {
                if path.is_empty() {
                    return Err(ConfigError::MissingIncludePath {
                        repository: repository.to_string(),
                        file: file.to_string(),
                    });
                }
                if depth >= MAX_INCLUDE_DEPTH {
                    return Err(ConfigError::IncludeDepth {
                        repository: repository.to_string(),
                        file: path.clone(),
                        limit: MAX_INCLUDE_DEPTH,
                    });
                }

                let data = template_data.as_ref().unwrap_or(&NO_TEMPLATE_DATA);
                let included = self
                    .load_file(repository, path, git_ref, data, depth + 1)
                    .await?;
                result.extend(included);
            } else {
                result.push(doc);
            }
        }

        Ok(result)
    }
}
