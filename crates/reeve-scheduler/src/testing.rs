//! In-memory collaborators for tests.

use async_trait::async_trait;
use reeve_core::host::{AccessControl, MessageDispatch, RepositoryFiles, RepositorySearch};
use reeve_core::message::{Message, Trigger};
use reeve_core::repository::{CommitInfo, FileEntry, RepositoryInfo, UserId};
use reeve_core::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

pub type EventLog = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Copy)]
pub enum Access {
    Denied,
    Hidden,
    Broken,
}

#[derive(Default)]
pub struct FakeHost {
    files: HashMap<(String, String), String>,
    listings: Mutex<VecDeque<Vec<String>>>,
    access: HashMap<String, Access>,
    broken_listings: HashSet<String>,
    broken_files: HashSet<(String, String)>,
    gate: Option<Arc<Semaphore>>,
    events: EventLog,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, repository: &str, path: &str, content: &str) -> Self {
        self.files
            .insert((repository.to_string(), path.to_string()), content.to_string());
        self
    }

    pub fn with_access(mut self, repository: &str, access: Access) -> Self {
        self.access.insert(repository.to_string(), access);
        self
    }

    pub fn with_broken_listing(mut self, repository: &str) -> Self {
        self.broken_listings.insert(repository.to_string());
        self
    }

    pub fn with_broken_file(mut self, repository: &str, path: &str) -> Self {
        self.broken_files
            .insert((repository.to_string(), path.to_string()));
        self
    }

    /// Hold every root listing until [`FakeHost::release`] is called.
    pub fn stalled(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.close();
        }
    }

    pub fn with_events(mut self, events: EventLog) -> Self {
        self.events = events;
        self
    }

    /// Queue the result of a search; the last queued listing repeats.
    pub fn push_listing(&self, repositories: &[&str]) {
        self.listings
            .lock()
            .unwrap()
            .push_back(repositories.iter().map(|r| r.to_string()).collect());
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl RepositoryFiles for FakeHost {
    async fn fetch_file_content(
        &self,
        repository: &str,
        path: &str,
        _git_ref: &str,
    ) -> Result<Option<String>> {
        if self
            .broken_files
            .contains(&(repository.to_string(), path.to_string()))
        {
            return Err(Error::Api {
                status: 500,
                body: "oops".to_string(),
            });
        }
        Ok(self
            .files
            .get(&(repository.to_string(), path.to_string()))
            .cloned())
    }

    async fn list_root_files(&self, repository: &str, _git_ref: &str) -> Result<Vec<FileEntry>> {
        self.record(format!("list:{}", repository));
        if let Some(gate) = &self.gate {
            // Resolves once the gate is closed.
            let _ = gate.acquire().await;
        }
        if self.broken_listings.contains(repository) {
            return Err(Error::Request("connection reset".to_string()));
        }

        let mut entries: Vec<FileEntry> = self
            .files
            .keys()
            .filter(|(repo, path)| repo == repository && !path.contains('/'))
            .map(|(_, path)| FileEntry::file(path.as_str()))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[async_trait]
impl AccessControl for FakeHost {
    async fn current_identity(&self) -> Result<UserId> {
        Ok(UserId(1))
    }

    async fn is_assignee(&self, repository: &str, _identity: UserId) -> Result<bool> {
        match self.access.get(repository) {
            None => Ok(true),
            Some(Access::Denied) => Ok(false),
            Some(Access::Hidden) => Err(Error::NotFound(repository.to_string())),
            Some(Access::Broken) => Err(Error::Api {
                status: 500,
                body: "internal error".to_string(),
            }),
        }
    }
}

#[async_trait]
impl RepositorySearch for FakeHost {
    async fn search(&self, query: &str) -> Result<Vec<RepositoryInfo>> {
        self.record("search".to_string());
        let repositories = {
            let mut listings = self.listings.lock().unwrap();
            if listings.len() > 1 {
                listings.pop_front().unwrap_or_default()
            } else {
                listings.front().cloned().unwrap_or_default()
            }
        };
        Ok(repositories
            .into_iter()
            .filter(|r| r.contains(query))
            .map(|full_name| RepositoryInfo {
                html_url: format!("https://git.example.com/{}", full_name),
                clone_url: format!("https://git.example.com/{}.git", full_name),
                default_branch: "main".to_string(),
                full_name,
            })
            .collect())
    }

    async fn fetch_commit(&self, repository: &str, branch: &str) -> Result<Option<CommitInfo>> {
        Ok(Some(CommitInfo {
            id: format!("{}@{}", repository, branch),
            message: "head commit".to_string(),
        }))
    }
}

#[derive(Default)]
pub struct RecordingDispatch {
    triggers: Mutex<Vec<Trigger>>,
    messages: Mutex<Vec<Message>>,
    events: EventLog,
}

impl RecordingDispatch {
    pub fn with_events(events: EventLog) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageDispatch for RecordingDispatch {
    async fn notify_triggers(&self, triggers: Vec<Trigger>) -> Result<()> {
        self.triggers.lock().unwrap().extend(triggers);
        Ok(())
    }

    async fn notify_messages(&self, messages: Vec<Message>) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        for message in &messages {
            events.push(format!("message:{}", message.target));
        }
        drop(events);
        self.messages.lock().unwrap().extend(messages);
        Ok(())
    }
}
