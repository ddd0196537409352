//! External provider capabilities used by provisioning and notification.
//!
//! Each capability is a small async trait so the strategy cascade and the
//! orchestrator can be driven by test doubles:
//! - [`SourceControl`]: repository creation / lookup ([`GitHubClient`])
//! - [`Hosting`]: service deployment ([`RenderClient`])
//! - [`Notifier`]: outbound chat messages ([`TelegramNotifier`])
//!
//! Clients are constructed even when their credential is missing; calls then
//! fail with a config error and the caller degrades.

mod github;
mod render;
mod telegram;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use leadpipe_shared::{LeadpipeError, Result};
use reqwest::{Client, Response};

pub use github::GitHubClient;
pub use render::RenderClient;
pub use telegram::TelegramNotifier;

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("Leadpipe/", env!("CARGO_PKG_VERSION"));

/// Description of a hosted service to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    /// Repository URL to build from; `None` deploys a prebuilt image.
    pub repo: Option<String>,
    pub env_vars: BTreeMap<String, String>,
}

/// Source-control provider.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Create a repository and return its browser URL.
    async fn create_repo(&self, name: &str, description: &str) -> Result<String>;

    /// Look up an existing repository by name.
    async fn find_repo(&self, name: &str) -> Result<Option<String>>;
}

/// Hosting provider.
#[async_trait]
pub trait Hosting: Send + Sync {
    /// Create a service and return its public URL.
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String>;
}

/// Notification channel. Callers treat delivery as fire-and-forget.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// HTTP helpers shared by the clients
// ---------------------------------------------------------------------------

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| LeadpipeError::Network(format!("failed to build HTTP client: {e}")))
}

fn transport_error(service: &str, timeout: Duration, e: reqwest::Error) -> LeadpipeError {
    if e.is_timeout() {
        LeadpipeError::timeout(service, timeout)
    } else {
        LeadpipeError::Network(format!("{service}: {e}"))
    }
}

/// Turn a non-success response into the matching error.
async fn ensure_success(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(LeadpipeError::from_status(service, status.as_u16(), &body))
}

fn missing_credential(service: &str) -> LeadpipeError {
    LeadpipeError::config(format!("{service} credential not set"))
}

fn trim_base(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}
