//! In-memory collaborators for plugin and route tests.

use async_trait::async_trait;
use reeve_config::SystemConfig;
use reeve_config::system::parse_system_config;
use reeve_core::host::{AccessControl, MessageDispatch, RepositoryFiles, RepositorySearch};
use reeve_core::message::{Message, Trigger};
use reeve_core::repository::{CommitInfo, FileEntry, RepositoryInfo, UserId};
use reeve_core::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::GiteaPlugin;

pub const SECRET_KEY: &str = "s3cret";

pub fn config() -> SystemConfig {
    parse_system_config(
        r#"
        gitea {
            url "http://gitea:3000"
            public-url "https://git.example.com"
            clone-url "ssh://git@git.example.com"
            token "t0ken"
        }
        pipelines {
            setup-task "reeve/git-setup"
            task-domain "ghcr.io" "acme/"
            trusted-task "reeve/deploy"
        }
        discovery {
            schedule "never"
            secret-key "s3cret"
        }
        server {
            engine-url "http://reeve:9080"
        }
        "#,
    )
    .unwrap()
}

#[derive(Default)]
pub struct FakeGitea {
    files: HashMap<(String, String), String>,
    repositories: Vec<String>,
    branches: HashMap<String, CommitInfo>,
    searches: Mutex<Vec<String>>,
}

impl FakeGitea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, repository: &str, path: &str, content: &str) -> Self {
        self.files
            .insert((repository.to_string(), path.to_string()), content.to_string());
        self
    }

    /// Make `repository` visible to searches, with a `main` branch at `commit`.
    pub fn with_repository(mut self, repository: &str, commit: Option<&str>) -> Self {
        self.repositories.push(repository.to_string());
        if let Some(commit) = commit {
            self.branches.insert(
                repository.to_string(),
                CommitInfo {
                    id: commit.to_string(),
                    message: format!("Head of {}", repository),
                },
            );
        }
        self
    }

    pub fn searches(&self) -> Vec<String> {
        self.searches.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryFiles for FakeGitea {
    async fn fetch_file_content(
        &self,
        repository: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .files
            .get(&(repository.to_string(), path.to_string()))
            .cloned())
    }

    async fn list_root_files(&self, repository: &str, _git_ref: &str) -> Result<Vec<FileEntry>> {
        Ok(self
            .files
            .keys()
            .filter(|(repo, path)| repo == repository && !path.contains('/'))
            .map(|(_, path)| FileEntry::file(path.as_str()))
            .collect())
    }
}

#[async_trait]
impl AccessControl for FakeGitea {
    async fn current_identity(&self) -> Result<UserId> {
        Ok(UserId(1))
    }

    async fn is_assignee(&self, _repository: &str, _identity: UserId) -> Result<bool> {
        Ok(true)
    }
}

#[async_trait]
impl RepositorySearch for FakeGitea {
    async fn search(&self, query: &str) -> Result<Vec<RepositoryInfo>> {
        self.searches.lock().unwrap().push(query.to_string());
        Ok(self
            .repositories
            .iter()
            .filter(|name| name.contains(query))
            .map(|name| RepositoryInfo {
                full_name: name.clone(),
                html_url: format!("https://git.example.com/{}", name),
                clone_url: format!("https://git.example.com/{}.git", name),
                default_branch: "main".to_string(),
            })
            .collect())
    }

    async fn fetch_commit(&self, repository: &str, _branch: &str) -> Result<Option<CommitInfo>> {
        Ok(self.branches.get(repository).cloned())
    }
}

/// Records everything sent to the engine.
#[derive(Default)]
pub struct RecordingEngine {
    triggers: Mutex<Vec<Trigger>>,
    messages: Mutex<Vec<Message>>,
}

impl RecordingEngine {
    pub fn triggers(&self) -> Vec<Trigger> {
        self.triggers.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageDispatch for RecordingEngine {
    async fn notify_triggers(&self, triggers: Vec<Trigger>) -> Result<()> {
        self.triggers.lock().unwrap().extend(triggers);
        Ok(())
    }

    async fn notify_messages(&self, messages: Vec<Message>) -> Result<()> {
        self.messages.lock().unwrap().extend(messages);
        Ok(())
    }
}

pub fn start_plugin(host: FakeGitea) -> (GiteaPlugin, Arc<FakeGitea>, Arc<RecordingEngine>) {
    let host = Arc::new(host);
    let engine = Arc::new(RecordingEngine::default());
    let plugin = GiteaPlugin::start(config(), host.clone(), engine.clone()).unwrap();
    (plugin, host, engine)
}
