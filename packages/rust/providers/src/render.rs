//! Render REST client implementing [`Hosting`].

use std::time::Duration;

use async_trait::async_trait;
use leadpipe_shared::{HostingConfig, LeadpipeError, Result, resolve_secret};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::{Hosting, ServiceSpec, build_client, ensure_success, missing_credential, transport_error, trim_base};

const SERVICE: &str = "render";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateService<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    name: &'a str,
    owner_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    repo: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<ImageSource<'a>>,
    env_vars: Vec<EnvVar<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSource<'a> {
    image_path: &'a str,
}

#[derive(Debug, Serialize)]
struct EnvVar<'a> {
    key: &'a str,
    value: &'a str,
}

/// Creates web services through the Render REST API.
pub struct RenderClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    owner_id: String,
    fallback_image: String,
    timeout: Duration,
}

impl RenderClient {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        owner_id: impl Into<String>,
        fallback_image: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: trim_base(base_url),
            api_key,
            owner_id: owner_id.into(),
            fallback_image: fallback_image.into(),
            timeout,
        })
    }

    pub fn from_config(config: &HostingConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            &config.base_url,
            resolve_secret(&config.api_key_env),
            config.owner_id.clone(),
            config.fallback_image.clone(),
            timeout,
        )
    }
}

/// The public URL, wherever this API version puts it.
fn service_url(body: &Value) -> Option<String> {
    ["/service/serviceDetails/url", "/serviceDetails/url"]
        .iter()
        .find_map(|ptr| body.pointer(ptr).and_then(Value::as_str))
        .map(String::from)
}

#[async_trait]
impl Hosting for RenderClient {
    #[instrument(skip_all, fields(service = %spec.name, from_repo = spec.repo.is_some()))]
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| missing_credential(SERVICE))?;

        let body = CreateService {
            kind: "web_service",
            name: &spec.name,
            owner_id: &self.owner_id,
            repo: spec.repo.as_deref(),
            image: match spec.repo {
                Some(_) => None,
                None => Some(ImageSource {
                    image_path: &self.fallback_image,
                }),
            },
            env_vars: spec
                .env_vars
                .iter()
                .map(|(key, value)| EnvVar { key, value })
                .collect(),
        };

        let response = self
            .client
            .post(format!("{}/services", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, self.timeout, e))?;
        let created: Value = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| LeadpipeError::provider(SERVICE, format!("malformed service response: {e}")))?;

        let url = service_url(&created)
            .ok_or_else(|| LeadpipeError::provider(SERVICE, "service response has no URL"))?;
        info!(%url, "service created");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use leadpipe_shared::FailureCategory;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RenderClient {
        RenderClient::new(
            &server.uri(),
            Some("rnd-key".into()),
            "tea-123",
            "ghcr.io/leadpipe/practice-site:latest",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn spec(repo: Option<&str>) -> ServiceSpec {
        ServiceSpec {
            name: "acme-dental-18f2a3b4c5d1a2b".into(),
            repo: repo.map(String::from),
            env_vars: BTreeMap::from([("PRACTICE_ID".to_string(), "acme-dental-18f2a3b4c5d1a2b".to_string())]),
        }
    }

    #[tokio::test]
    async fn create_from_repo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services"))
            .and(body_partial_json(serde_json::json!({
                "type": "web_service",
                "ownerId": "tea-123",
                "repo": "https://github.com/x/acme",
                "envVars": [{ "key": "PRACTICE_ID", "value": "acme-dental-18f2a3b4c5d1a2b" }]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "service": { "serviceDetails": { "url": "https://acme.onrender.com" } }
            })))
            .mount(&server)
            .await;

        let url = client(&server)
            .create_service(&spec(Some("https://github.com/x/acme")))
            .await
            .unwrap();
        assert_eq!(url, "https://acme.onrender.com");
    }

    #[tokio::test]
    async fn create_without_repo_uses_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services"))
            .and(body_partial_json(serde_json::json!({
                "image": { "imagePath": "ghcr.io/leadpipe/practice-site:latest" }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "serviceDetails": { "url": "https://image.onrender.com" }
            })))
            .mount(&server)
            .await;

        let url = client(&server).create_service(&spec(None)).await.unwrap();
        assert_eq!(url, "https://image.onrender.com");
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/services"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server).create_service(&spec(None)).await.unwrap_err();
        assert_eq!(err.category(), FailureCategory::Unavailable);
    }

    #[test]
    fn service_url_lookup() {
        let body = serde_json::json!({ "id": "srv-1" });
        assert!(service_url(&body).is_none());
    }
}
