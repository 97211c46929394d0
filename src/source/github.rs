//! GitHub pull-request source.
//!
//! Uses three REST endpoints: the pull request itself, its changed files
//! (paginated), and the raw contents of each file at the head ref.

use super::{parse_repo_url, FileFilter, FileSet, ResolveError, WorkItem};
use crate::models::{JobMetadata, SourceFile};
use anyhow::{Context, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

const PER_PAGE: usize = 100;
/// GitHub lists at most 3000 files per pull request.
const MAX_PAGES: usize = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub title: String,
    pub user: Option<Account>,
    pub head: GitRef,
    pub base: GitRef,
    #[serde(default)]
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub name: String,
    pub sha: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
}

impl PullRequestFile {
    fn is_deleted(&self) -> bool {
        self.status == "removed" || self.status == "deleted"
    }
}

/// Minimal GitHub REST client.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(api_url: &str, token: Option<String>, timeout_seconds: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .get(url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, concat!("reviewgate/", env!("CARGO_PKG_VERSION")));
        match &self.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn send(&self, url: &str, accept: &str) -> Result<reqwest::Response, ResolveError> {
        debug!("GET {}", url);
        let response = self
            .request(url, accept)
            .send()
            .await
            .map_err(|e| ResolveError::Http(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(ResolveError::NotFound(url.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ResolveError::Http(format!("{} from {}: {}", status, url, body)))
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ResolveError> {
        self.send(url, "application/vnd.github+json")
            .await?
            .json()
            .await
            .map_err(|e| ResolveError::Http(format!("unreadable response from {}: {}", url, e)))
    }

    pub async fn pull_request(&self, owner: &str, repo: &str, number: u64) -> Result<PullRequest, ResolveError> {
        let url = format!("{}/repos/{}/{}/pulls/{}", self.api_url, owner, repo, number);
        self.get_json(&url).await
    }

    /// Every changed file of a pull request, following pagination.
    pub async fn pull_request_files(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PullRequestFile>, ResolveError> {
        let mut files = Vec::new();
        for page in 1..=MAX_PAGES {
            let url = format!(
                "{}/repos/{}/{}/pulls/{}/files?per_page={}&page={}",
                self.api_url, owner, repo, number, PER_PAGE, page
            );
            let batch: Vec<PullRequestFile> = self.get_json(&url).await?;
            let done = batch.len() < PER_PAGE;
            files.extend(batch);
            if done {
                break;
            }
        }
        Ok(files)
    }

    /// Raw file contents at a ref.
    pub async fn file_content(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<String, ResolveError> {
        let url = format!(
            "{}/repos/{}/{}/contents/{}?ref={}",
            self.api_url, owner, repo, path, git_ref
        );
        self.send(&url, "application/vnd.github.raw")
            .await?
            .text()
            .await
            .map_err(|e| ResolveError::Http(format!("unreadable content for {}: {}", path, e)))
    }
}

/// Changed files worth fetching: not deleted and accepted by the filter.
pub fn eligible_files<'a>(files: &'a [PullRequestFile], filter: &FileFilter) -> Vec<&'a PullRequestFile> {
    files
        .iter()
        .filter(|f| !f.is_deleted())
        .filter(|f| filter.accepts_path(&f.filename))
        .collect()
}

/// Fetch a pull request and the contents of its reviewable files.
///
/// Files whose content cannot be fetched are skipped with a warning; a pull
/// request with no fetchable file is an error.
pub async fn fetch_pull_request(
    client: &GitHubClient,
    repo_url: &str,
    number: u64,
    filter: &FileFilter,
) -> Result<WorkItem, ResolveError> {
    let (owner, repo) = parse_repo_url(repo_url)
        .ok_or_else(|| ResolveError::InvalidReference(format!("not a GitHub repository URL: {}", repo_url)))?;

    info!("Fetching pull request {}/{}#{}", owner, repo, number);
    let pr = client.pull_request(&owner, &repo, number).await?;
    let changed = client.pull_request_files(&owner, &repo, number).await?;
    let candidates = eligible_files(&changed, filter);
    info!(
        "{} changed file(s), {} eligible for review",
        changed.len(),
        candidates.len()
    );

    let mut set = FileSet::new(filter.max_files);
    for file in candidates {
        // Pinned to the head commit, not the branch name.
        match client.file_content(&owner, &repo, &file.filename, &pr.head.sha).await {
            Ok(content) if filter.accepts_size(content.len()) => {
                set.push(SourceFile::new(file.filename.clone(), content));
            }
            Ok(content) => debug!("Skipping {} ({} bytes)", file.filename, content.len()),
            Err(e) => warn!("Could not fetch content for {}: {}", file.filename, e),
        }
    }

    let reference = if pr.html_url.is_empty() {
        format!("{}/{}#{}", owner, repo, number)
    } else {
        pr.html_url.clone()
    };
    let files = set.finish(&reference)?;

    Ok(WorkItem {
        metadata: JobMetadata {
            reference,
            title: pr.title,
            author: pr.user.map(|u| u.login).unwrap_or_default(),
            head_branch: pr.head.name,
            base_branch: pr.base.name,
        },
        files,
    })
}
