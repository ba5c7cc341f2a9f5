//! Gitea push webhook payloads.

use hmac::{Hmac, Mac};
use reeve_core::message::Trigger;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;

/// Header carrying the hex encoded HMAC-SHA256 of the request body.
pub const SIGNATURE_HEADER: &str = "X-Gitea-Signature";

/// Header naming the webhook event.
pub const EVENT_HEADER: &str = "X-Gitea-Event";

const SKIP_CI_MARKERS: [&str; 2] = ["[skip ci]", "[ci skip]"];

/// The parts of a push event the bridge uses.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub head_commit: Option<HeadCommit>,
    #[serde(default)]
    pub commits: Vec<ChangedFiles>,
    pub repository: PushRepository,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeadCommit {
    pub id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChangedFiles {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushRepository {
    pub full_name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub clone_url: String,
    #[serde(default)]
    pub default_branch: String,
}

impl PushEvent {
    pub fn parse(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }

    /// Whether the head commit asks to skip CI.
    pub fn skips_ci(&self) -> bool {
        self.head_commit
            .as_ref()
            .is_some_and(|commit| is_skip_ci(&commit.message))
    }

    /// The `push` trigger for this event, or `None` without a head commit
    /// (e.g. a deleted branch).
    pub fn trigger(&self) -> Option<Trigger> {
        let head = self.head_commit.as_ref()?;

        Some(Trigger::from([
            ("type".to_string(), "git".to_string()),
            ("trigger".to_string(), "push".to_string()),
            ("ref".to_string(), self.git_ref.clone()),
            ("commit".to_string(), head.id.clone()),
            ("commitMessage".to_string(), head.message.clone()),
            ("repository".to_string(), self.repository.full_name.clone()),
            ("repositoryURL".to_string(), self.repository.html_url.clone()),
            ("cloneURL".to_string(), self.repository.clone_url.clone()),
            ("defaultBranch".to_string(), self.repository.default_branch.clone()),
            ("files".to_string(), collect_files(&self.commits).join("\n")),
        ]))
    }
}

pub fn is_skip_ci(message: &str) -> bool {
    let message = message.to_lowercase();
    SKIP_CI_MARKERS.iter().any(|marker| message.contains(marker))
}

/// Files touched by a push, walking `commits` from the last to the first.
///
/// A file is reported if it existed before the push or exists after it; files
/// both added and removed within the push are not.
pub fn collect_files(commits: &[ChangedFiles]) -> Vec<String> {
    #[derive(Clone, Copy)]
    struct FileState {
        before: bool,
        now: bool,
    }

    let mut files: BTreeMap<&str, FileState> = BTreeMap::new();
    for commit in commits.iter().rev() {
        for file in &commit.added {
            files
                .entry(file)
                .or_insert(FileState { before: false, now: false })
                .now = true;
        }
        for file in &commit.modified {
            files
                .entry(file)
                .or_insert(FileState { before: true, now: false })
                .now = true;
        }
        for file in &commit.removed {
            files
                .entry(file)
                .or_insert(FileState { before: true, now: false })
                .now = false;
        }
    }

    files
        .into_iter()
        .filter(|(_, state)| state.before || state.now)
        .map(|(file, _)| file.to_string())
        .collect()
}

/// Verify a webhook signature. A `sha256=` prefix is accepted.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let Some(signature) = signature else {
        return false;
    };
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let Ok(sig_bytes) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    mac.verify_slice(&sig_bytes).is_ok()
}
