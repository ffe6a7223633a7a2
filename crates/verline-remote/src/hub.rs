//! Hugging Face compatible hub client
//!
//! Repository lifecycle goes through the hub's HTTP API; working copies are
//! plain git clones of `<endpoint>/<prefix><id>` driven by `GitWorkingCopy`.

use std::path::Path;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RemoteError;
use crate::git::GitWorkingCopy;
use crate::host_traits::{RemoteResult, RepoId, RepositoryHost, WorkingCopySync};

const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Kind of repository on the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    #[default]
    Model,
    Dataset,
    Space,
}

impl RepoType {
    /// Path segment preceding the repository id in URLs.
    fn url_prefix(self) -> &'static str {
        match self {
            RepoType::Model => "",
            RepoType::Dataset => "datasets/",
            RepoType::Space => "spaces/",
        }
    }

    /// Value of the `type` field in API bodies; models omit it.
    fn api_name(self) -> Option<&'static str> {
        match self {
            RepoType::Model => None,
            RepoType::Dataset => Some("dataset"),
            RepoType::Space => Some("space"),
        }
    }
}

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Hub base URL
    pub endpoint: String,
    /// Access token (required to create, push to, or delete repositories)
    pub token: Option<String>,
    /// Kind of repository to manage
    pub repo_type: RepoType,
    /// Create repositories as private
    pub private: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            endpoint: std::env::var("HF_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string()),
            token: std::env::var("HF_TOKEN").ok().filter(|t| !t.is_empty()),
            repo_type: RepoType::Model,
            private: false,
        }
    }
}

impl HubConfig {
    /// Create a new config from environment variables
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Create config for a specific endpoint
    pub fn new(endpoint: &str) -> Self {
        HubConfig {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token: None,
            repo_type: RepoType::Model,
            private: false,
        }
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    pub fn with_repo_type(mut self, repo_type: RepoType) -> Self {
        self.repo_type = repo_type;
        self
    }
}

#[derive(Debug, Serialize)]
struct RepoRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    organization: Option<&'a str>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    repo_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private: Option<bool>,
}

/// Hub client for repository lifecycle and git working copies
#[derive(Debug, Clone)]
pub struct HubClient {
    config: HubConfig,
    http_client: reqwest::Client,
}

impl HubClient {
    /// Create a new hub client
    pub fn new(config: HubConfig) -> RemoteResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("verline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(HubClient {
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> RemoteResult<Self> {
        Self::new(HubConfig::from_env())
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.endpoint, path)
    }

    fn request_body<'a>(&self, id: &'a RepoId, create: bool) -> RepoRequest<'a> {
        RepoRequest {
            name: id.name(),
            organization: id.namespace(),
            repo_type: self.config.repo_type.api_name(),
            private: create.then_some(self.config.private),
        }
    }

    fn authorize(
        &self,
        request: reqwest::RequestBuilder,
    ) -> RemoteResult<reqwest::RequestBuilder> {
        match &self.config.token {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Err(RemoteError::Unauthorized("HF_TOKEN is not set".to_string())),
        }
    }

    /// Git URL of the repository, with credentials embedded when a token is set.
    pub fn clone_url(&self, id: &RepoId) -> String {
        let path = format!("{}{}", self.config.repo_type.url_prefix(), id);
        match (&self.config.token, self.config.endpoint.split_once("://")) {
            (Some(token), Some((scheme, host))) => {
                format!("{scheme}://user:{token}@{host}/{path}")
            }
            _ => format!("{}/{}", self.config.endpoint, path),
        }
    }

    async fn error_for(response: reqwest::Response, id: &RepoId) -> RemoteError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                RemoteError::Unauthorized(format!("{status} for {id}: {body}"))
            }
            StatusCode::NOT_FOUND => RemoteError::RepositoryNotFound { id: id.to_string() },
            _ => RemoteError::Unavailable(format!("{status} for {id}: {body}")),
        }
    }
}

#[async_trait]
impl RepositoryHost for HubClient {
    async fn ensure_repository(&self, id: &RepoId) -> RemoteResult<()> {
        let request = self
            .http_client
            .post(self.api_url("repos/create"))
            .json(&self.request_body(id, true));
        let response = self.authorize(request)?.send().await?;

        if response.status().is_success() {
            info!("Created repository {}", id);
            Ok(())
        } else if response.status() == StatusCode::CONFLICT {
            debug!("Repository {} already exists", id);
            Ok(())
        } else {
            Err(Self::error_for(response, id).await)
        }
    }

    async fn open_working_copy(
        &self,
        id: &RepoId,
        local_dir: &Path,
    ) -> RemoteResult<Box<dyn WorkingCopySync>> {
        debug!("Opening working copy of {} at {:?}", id, local_dir);
        let wc = GitWorkingCopy::open(&self.clone_url(id), local_dir).await?;
        Ok(Box::new(wc))
    }

    async fn delete_repository(&self, id: &RepoId) -> RemoteResult<()> {
        let request = self
            .http_client
            .delete(self.api_url("repos/delete"))
            .json(&self.request_body(id, false));
        let response = self.authorize(request)?.send().await?;

        if response.status().is_success() {
            info!("Deleted repository {}", id);
            Ok(())
        } else {
            Err(Self::error_for(response, id).await)
        }
    }

    fn repository_url(&self, id: &RepoId) -> String {
        format!(
            "{}/{}{}",
            self.config.endpoint,
            self.config.repo_type.url_prefix(),
            id
        )
    }
}
