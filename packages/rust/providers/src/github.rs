//! GitHub REST client implementing [`SourceControl`].

use std::time::Duration;

use async_trait::async_trait;
use leadpipe_shared::{LeadpipeError, Result, SourceControlConfig, resolve_secret};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{SourceControl, build_client, ensure_success, missing_credential, transport_error, trim_base};

const SERVICE: &str = "github";

#[derive(Debug, Serialize)]
struct CreateRepo<'a> {
    name: &'a str,
    description: &'a str,
    private: bool,
    auto_init: bool,
}

#[derive(Debug, Deserialize)]
struct Repo {
    html_url: String,
}

/// Creates and looks up repositories through the GitHub REST API.
pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    owner: String,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        owner: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: trim_base(base_url),
            token,
            owner: owner.into(),
            timeout,
        })
    }

    pub fn from_config(config: &SourceControlConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            &config.base_url,
            resolve_secret(&config.token_env),
            config.owner.clone(),
            timeout,
        )
    }

    fn authed(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.token.as_deref().ok_or_else(|| missing_credential(SERVICE))?;
        Ok(builder
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28"))
    }
}

#[async_trait]
impl SourceControl for GitHubClient {
    #[instrument(skip_all, fields(repo = %name))]
    async fn create_repo(&self, name: &str, description: &str) -> Result<String> {
        let url = format!("{}/user/repos", self.base_url);
        let body = CreateRepo {
            name,
            description,
            private: false,
            auto_init: true,
        };

        let response = self
            .authed(self.client.post(&url))?
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, self.timeout, e))?;
        let repo: Repo = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| LeadpipeError::provider(SERVICE, format!("malformed repo response: {e}")))?;

        info!(url = %repo.html_url, "repository created");
        Ok(repo.html_url)
    }

    #[instrument(skip_all, fields(repo = %name))]
    async fn find_repo(&self, name: &str) -> Result<Option<String>> {
        if self.owner.is_empty() {
            return Err(LeadpipeError::config("source_control.owner not set"));
        }
        let url = format!("{}/repos/{}/{}", self.base_url, self.owner, name);

        let response = self
            .authed(self.client.get(&url))?
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, self.timeout, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("repository not found");
            return Ok(None);
        }

        let repo: Repo = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| LeadpipeError::provider(SERVICE, format!("malformed repo response: {e}")))?;
        Ok(Some(repo.html_url))
    }
}
