//! Gitea API client for repository contents, permissions and search.

use async_trait::async_trait;
use reeve_config::system::GiteaConfig;
use reeve_core::host::{AccessControl, RepositoryFiles, RepositorySearch};
use reeve_core::repository::{CommitInfo, FileEntry, RepositoryInfo, UserId};
use reeve_core::{Error, RepositoryName, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Gitea API client.
///
/// `base_url` must end with `/`; request paths are appended to it.
pub struct GiteaClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    unrestricted: bool,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RepositoryInfo>,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: CommitInfo,
}

impl GiteaClient {
    /// Create a client. Unless `unrestricted`, searches are limited to
    /// repositories of the current user.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, unrestricted: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
            unrestricted,
        }
    }

    pub fn from_config(config: &GiteaConfig) -> Self {
        Self::new(config.url.as_str(), config.token.as_str(), config.unrestricted)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Bearer {}", self.token))
    }
}

async fn send(request: RequestBuilder) -> Result<Response> {
    request
        .send()
        .await
        .map_err(|e| Error::Request(e.to_string()))
}

async fn unexpected(response: Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::Api { status, body }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| Error::Parse(e.to_string()))
}

fn repository_path(repository: &str) -> Result<String> {
    Ok(repository.parse::<RepositoryName>()?.path_escaped())
}

fn file_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl RepositoryFiles for GiteaClient {
    async fn fetch_file_content(
        &self,
        repository: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>> {
        if path.is_empty() {
            return Err(Error::InvalidInput("no file specified".to_string()));
        }

        let mut request = self.get(&format!(
            "api/v1/repos/{}/raw/{}",
            repository_path(repository)?,
            file_path(path)
        ));
        if !git_ref.is_empty() {
            request = request.query(&[("ref", git_ref)]);
        }

        let response = send(request).await?;
        match response.status() {
            StatusCode::OK => response
                .text()
                .await
                .map(Some)
                .map_err(|e| Error::Request(e.to_string())),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(unexpected(response).await),
        }
    }

    async fn list_root_files(&self, repository: &str, git_ref: &str) -> Result<Vec<FileEntry>> {
        let mut request = self.get(&format!(
            "api/v1/repos/{}/contents",
            repository_path(repository)?
        ));
        if !git_ref.is_empty() {
            request = request.query(&[("ref", git_ref)]);
        }

        let response = send(request).await?;
        match response.status() {
            StatusCode::OK => parse(response).await,
            StatusCode::NOT_FOUND => {
                debug!(repository, git_ref, "Repository contents not found");
                Ok(Vec::new())
            }
            _ => Err(unexpected(response).await),
        }
    }
}

#[async_trait]
impl AccessControl for GiteaClient {
    async fn current_identity(&self) -> Result<UserId> {
        let response = send(self.get("api/v1/user")).await?;
        if response.status() != StatusCode::OK {
            return Err(unexpected(response).await);
        }

        let user: UserResponse = parse(response).await?;
        Ok(UserId(user.id))
    }

    async fn is_assignee(&self, repository: &str, identity: UserId) -> Result<bool> {
        let response = send(self.get(&format!(
            "api/v1/repos/{}/assignees",
            repository_path(repository)?
        )))
        .await?;

        // Gitea hides repositories the user cannot access
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(repository.to_string()));
        }
        if response.status() != StatusCode::OK {
            return Err(unexpected(response).await);
        }

        let assignees: Vec<UserResponse> = parse(response).await?;
        Ok(assignees.iter().any(|user| UserId(user.id) == identity))
    }
}

#[async_trait]
impl RepositorySearch for GiteaClient {
    async fn search(&self, query: &str) -> Result<Vec<RepositoryInfo>> {
        let mut params: Vec<(&str, String)> = Vec::new();
        if !self.unrestricted {
            let identity = self.current_identity().await?;
            params.push(("uid", identity.to_string()));
        }
        if !query.is_empty() {
            params.push(("q", query.to_string()));
        }

        let mut repositories = Vec::new();
        for page in 1u32.. {
            let request = self
                .get("api/v1/repos/search")
                .query(&params)
                .query(&[("page", page)]);

            let response = send(request).await?;
            if response.status() != StatusCode::OK {
                debug!(page, status = %response.status(), "Repository search ended");
                break;
            }

            let total = response
                .headers()
                .get(TOTAL_COUNT_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);

            let result: SearchResponse = parse(response).await?;
            if result.data.is_empty() {
                break;
            }
            repositories.extend(result.data);

            if total > 0 && repositories.len() >= total {
                break;
            }
        }

        Ok(repositories)
    }

    async fn fetch_commit(&self, repository: &str, branch: &str) -> Result<Option<CommitInfo>> {
        let response = send(self.get(&format!(
            "api/v1/repos/{}/branches/{}",
            repository_path(repository)?,
            urlencoding::encode(branch)
        )))
        .await?;

        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        let branch: BranchResponse = parse(response).await?;
        Ok(Some(branch.commit))
    }
}
