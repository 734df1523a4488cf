use super::ObjectStore;
use crate::config::StorageConfig;
use crate::entities::StorageObject;
use crate::errors::StorageError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::OnceCell;

const API_BASE: &str = "https://api.github.com";
const RAW_BASE: &str = "https://raw.githubusercontent.com";
const CDN_BASE: &str = "https://cdn.jsdelivr.net/gh";

/// Adapter for collections hosted in a Git repository, read over the GitHub
/// REST API. The tree listing carries no per-file modification time, so every
/// object is stamped with the branch head-commit timestamp; reuse decisions
/// then err toward reprocessing after a push, never toward staleness.
pub struct GithubStore {
    client: reqwest::Client,
    owner: String,
    repo: String,
    branch: String,
    token: Option<String>,
    raw_preferred: bool,
    head_commit_time: OnceCell<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeNode>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeNode {
    path: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    size: Option<i64>,
    sha: String,
}

#[derive(Deserialize)]
struct CommitItem {
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    committer: Option<CommitSignature>,
    author: Option<CommitSignature>,
}

#[derive(Deserialize)]
struct CommitSignature {
    date: Option<String>,
}

impl GithubStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("photo-manifest")
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: config.token.clone().filter(|token| !token.is_empty()),
            raw_preferred: config.use_raw_url,
            head_commit_time: OnceCell::new(),
        })
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.get(url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn head_commit_time(&self) -> Result<DateTime<Utc>, StorageError> {
        self.head_commit_time
            .get_or_try_init(|| async {
                let url = format!(
                    "{}/repos/{}/{}/commits?sha={}&per_page=1",
                    API_BASE,
                    self.owner,
                    self.repo,
                    urlencoding::encode(&self.branch)
                );
                let response = self
                    .request(&url)
                    .send()
                    .await
                    .map_err(|error| StorageError::Unreachable(error.to_string()))?;
                if !response.status().is_success() {
                    return Err(StorageError::Unreachable(format!(
                        "commit listing returned status {}",
                        response.status()
                    )));
                }
                let commits: Vec<CommitItem> = response
                    .json()
                    .await
                    .map_err(|error| StorageError::Unreachable(error.to_string()))?;

                let date = commits
                    .first()
                    .and_then(|item| {
                        item.commit
                            .committer
                            .as_ref()
                            .or(item.commit.author.as_ref())
                    })
                    .and_then(|signature| signature.date.as_deref())
                    .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                    .map(|value| value.with_timezone(&Utc))
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                Ok(date)
            })
            .await
            .copied()
    }

    fn encoded_path(&self, key: &str) -> String {
        key.split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn raw_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            RAW_BASE,
            self.owner,
            self.repo,
            self.branch,
            self.encoded_path(key)
        )
    }
}

#[async_trait]
impl ObjectStore for GithubStore {
    async fn list(
        &self,
        prefix: &str,
        max_keys: usize,
    ) -> Result<Vec<StorageObject>, StorageError> {
        let last_modified = self.head_commit_time().await?;

        let url = format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            API_BASE,
            self.owner,
            self.repo,
            urlencoding::encode(&self.branch)
        );
        let response = self
            .request(&url)
            .send()
            .await
            .map_err(|error| StorageError::Unreachable(error.to_string()))?;
        if !response.status().is_success() {
            return Err(StorageError::Unreachable(format!(
                "tree listing returned status {}",
                response.status()
            )));
        }
        let tree: TreeResponse = response
            .json()
            .await
            .map_err(|error| StorageError::Unreachable(error.to_string()))?;
        if tree.truncated {
            log::warn!("GitHub tree listing was truncated; some objects may be missing");
        }

        let mut objects = Vec::new();
        for node in tree.tree {
            if node.node_type != "blob" || !node.path.starts_with(prefix) {
                continue;
            }
            objects.push(StorageObject {
                key: node.path,
                size: node.size.unwrap_or(0),
                last_modified,
                etag: node.sha,
            });
            if objects.len() >= max_keys {
                break;
            }
        }
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .request(&self.raw_url(key))
            .send()
            .await
            .map_err(|error| StorageError::Unreachable(error.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|error| StorageError::Unreachable(error.to_string()))?;
            Ok(body.to_vec())
        } else if status == reqwest::StatusCode::NOT_FOUND {
            Err(StorageError::NotFound(key.to_string()))
        } else {
            Err(StorageError::Unreachable(format!(
                "GET {} returned status {}",
                key, status
            )))
        }
    }

    fn public_url(&self, key: &str) -> String {
        if self.raw_preferred {
            self.raw_url(key)
        } else {
            format!(
                "{}/{}/{}@{}/{}",
                CDN_BASE,
                self.owner,
                self.repo,
                self.branch,
                self.encoded_path(key)
            )
        }
    }

    fn thumbnail_url(&self, _key: &str, id: &str) -> String {
        format!("/thumbnails/{}.webp", id)
    }
}
