//! Pipeline collection for discovery.

use async_trait::async_trait;
use reeve_config::files::find_readme;
use reeve_config::{Document, SourceDocument};
use reeve_core::schema::{Conditions, Env, PipelineDefinition, apply_default_conditions};
use reeve_core::secret::decrypt_secret;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::visitor::{InitContext, ScanVisitor};
use crate::{ScanError, ScanResult};

const README_SEPARATOR: &str = "\n\n---\n\n";

/// Collects pipeline declarations and env values of one repository.
pub struct PipelineCollector {
    repository: String,
    secret_key: String,
    default_conditions: Conditions,
    readme: String,
    pipelines: Vec<PipelineDefinition>,
    env: BTreeMap<String, Env>,
}

impl PipelineCollector {
    pub fn new(
        repository: impl Into<String>,
        secret_key: impl Into<String>,
        default_conditions: Conditions,
    ) -> Self {
        Self {
            repository: repository.into(),
            secret_key: secret_key.into(),
            default_conditions,
            readme: String::new(),
            pipelines: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// The collected pipelines and env values.
    pub fn finish(self) -> (Vec<PipelineDefinition>, BTreeMap<String, Env>) {
        (self.pipelines, self.env)
    }
}

/// Prepare README content for embedding into a Markdown description.
///
/// Line endings are normalised; non-Markdown content is indented so it renders verbatim.
pub fn format_readme(file: &str, content: &str) -> String {
    let readme = content.replace("\r\n", "\n").replace('\r', "\n");

    if readme.trim().is_empty() || file.to_lowercase().ends_with(".md") {
        return readme;
    }
    format!("    {}", readme.replace('\n', "\n    "))
}

#[async_trait]
impl ScanVisitor for PipelineCollector {
    async fn init(&mut self, ctx: InitContext<'_>) -> ScanResult<()> {
        let Some(readme) = find_readme(ctx.root_files) else {
            return Ok(());
        };

        debug!(repository = %self.repository, file = %readme.name, "Fetching README");

        match ctx
            .host
            .fetch_file_content(ctx.repository, &readme.name, ctx.commit)
            .await
        {
            Ok(Some(content)) => self.readme = format_readme(&readme.name, &content),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    repository = %self.repository,
                    file = %readme.name,
                    error = %e,
                    "Failed to fetch README, continuing without it"
                );
            }
        }
        Ok(())
    }

    fn scan(&mut self, document: &SourceDocument) -> ScanResult<()> {
        match &document.document {
            Document::Pipeline(definition) => {
                let mut pipeline = definition.clone();

                if !self.readme.is_empty() {
                    if !pipeline.description.is_empty() {
                        pipeline.description.push_str(README_SEPARATOR);
                    }
                    pipeline.description.push_str(&self.readme);
                }

                apply_default_conditions(&mut pipeline.when, &self.default_conditions);
                self.pipelines.push(pipeline);
            }
            Document::Variable { name, value } => {
                self.env.insert(name.clone(), Env::plain(value.as_str()));
            }
            Document::Secret { name, value } => {
                let plaintext =
                    decrypt_secret(&self.secret_key, value).map_err(|source| ScanError::Secret {
                        repository: self.repository.clone(),
                        file: document.source_file.clone(),
                        name: name.clone(),
                        source,
                    })?;
                self.env.insert(name.clone(), Env::secret(plaintext));
            }
            Document::Trigger { .. } | Document::Include { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScanOrchestrator;
    use crate::testing::FakeHost;
    use std::sync::Arc;
    use reeve_core::repository::FileEntry;
    use reeve_core::schema::Condition;
    use reeve_core::secret::encrypt_secret;

    fn source(document: Document) -> SourceDocument {
        SourceDocument {
            document,
            source_file: ".reeve.yaml".to_string(),
        }
    }

    fn pipeline(name: &str, description: &str) -> Document {
        Document::Pipeline(PipelineDefinition {
            name: name.to_string(),
            description: description.to_string(),
            ..Default::default()
        })
    }

    fn defaults() -> Conditions {
        Conditions::from([("branch".to_string(), Condition::include(["main"]))])
    }

    #[test]
    fn test_variables_and_secrets() {
        let encrypted = encrypt_secret("key", "hunter2").unwrap();
        let mut collector = PipelineCollector::new("acme/web", "key", Conditions::new());

        collector
            .scan(&source(Document::Variable {
                name: "LEVEL".to_string(),
                value: "debug".to_string(),
            }))
            .unwrap();
        collector
            .scan(&source(Document::Secret {
                name: "TOKEN".to_string(),
                value: encrypted,
            }))
            .unwrap();

        let (_, env) = collector.finish();
        assert_eq!(env["LEVEL"], Env::plain("debug"));
        assert_eq!(env["TOKEN"], Env::secret("hunter2"));
        assert!(env["TOKEN"].secret);
        assert!(!env["LEVEL"].secret);
    }

    #[test]
    fn test_secret_with_wrong_key_fails() {
        let encrypted = encrypt_secret("other", "hunter2").unwrap();
        let mut collector = PipelineCollector::new("acme/web", "key", Conditions::new());

        let result = collector.scan(&source(Document::Secret {
            name: "TOKEN".to_string(),
            value: encrypted,
        }));
        assert!(matches!(result, Err(ScanError::Secret { name, .. }) if name == "TOKEN"));
    }

    #[test]
    fn test_default_conditions_applied() {
        let mut collector = PipelineCollector::new("acme/web", "key", defaults());

        collector.scan(&source(pipeline("plain", ""))).unwrap();
        collector
            .scan(&source(Document::Pipeline(PipelineDefinition {
                name: "dev".to_string(),
                when: Conditions::from([("branch".to_string(), Condition::include(["dev"]))]),
                ..Default::default()
            })))
            .unwrap();

        let (pipelines, _) = collector.finish();
        assert_eq!(pipelines[0].when["branch"], Condition::include(["main"]));
        assert_eq!(pipelines[1].when["branch"], Condition::include(["dev"]));
    }

    #[test]
    fn test_triggers_are_ignored() {
        let mut collector = PipelineCollector::new("acme/web", "key", Conditions::new());
        collector
            .scan(&source(Document::Trigger {
                cron: "0 * * * *".to_string(),
                action: "nightly".to_string(),
            }))
            .unwrap();

        let (pipelines, env) = collector.finish();
        assert!(pipelines.is_empty());
        assert!(env.is_empty());
    }

    #[tokio::test]
    async fn test_readme_appended_to_description() {
        let host = FakeHost::new().with_file("acme/web", "README.md", "# Web\r\nDocs\r\n");
        let root_files = vec![FileEntry::file("README.md"), FileEntry::file(".reeve.yaml")];
        let mut collector = PipelineCollector::new("acme/web", "key", Conditions::new());

        collector
            .init(InitContext {
                host: &host,
                repository: "acme/web",
                commit: "abc",
                root_files: &root_files,
            })
            .await
            .unwrap();
        collector.scan(&source(pipeline("build", "Builds it"))).unwrap();
        collector.scan(&source(pipeline("lint", ""))).unwrap();

        let (pipelines, _) = collector.finish();
        assert_eq!(pipelines[0].description, "Builds it\n\n---\n\n# Web\nDocs\n");
        assert_eq!(pipelines[1].description, "# Web\nDocs\n");
    }

    #[tokio::test]
    async fn test_readme_fetch_failure_keeps_pipelines() {
        let host = FakeHost::new()
            .with_file("acme/web", ".reeve.yaml", "type: pipeline\nname: build\ndescription: Builds it\n")
            .with_file("acme/web", "README.md", "# Web")
            .with_broken_file("acme/web", "README.md");
        let orchestrator = ScanOrchestrator::new(Arc::new(host), false);
        let mut collector = PipelineCollector::new("acme/web", "key", Conditions::new());

        orchestrator
            .scan_repository("acme/web", "abc", &mut [&mut collector])
            .await
            .unwrap();

        let (pipelines, _) = collector.finish();
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].description, "Builds it");
    }

    #[test]
    fn test_format_readme() {
        assert_eq!(format_readme("README.md", "a\r\nb"), "a\nb");
        assert_eq!(format_readme("README.txt", "a\rb"), "    a\n    b");
        assert_eq!(format_readme("README", "  \n"), "  \n");
    }
}
