//! Telegram Bot API client implementing [`Notifier`].

use std::time::Duration;

use async_trait::async_trait;
use leadpipe_shared::{LeadpipeError, NotifyConfig, Result, resolve_secret};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{Notifier, build_client, ensure_success, missing_credential, transport_error, trim_base};

const SERVICE: &str = "telegram";

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Sends plain-text messages through a Telegram bot.
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: Option<String>,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(base_url: &str, bot_token: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: trim_base(base_url),
            bot_token,
            timeout,
        })
    }

    pub fn from_config(config: &NotifyConfig, timeout: Duration) -> Result<Self> {
        Self::new(&config.base_url, resolve_secret(&config.bot_token_env), timeout)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip_all, fields(chat = %recipient))]
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        let token = self.bot_token.as_deref().ok_or_else(|| missing_credential(SERVICE))?;
        let url = format!("{}/bot{token}/sendMessage", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: recipient,
                text,
                disable_web_page_preview: true,
            })
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, self.timeout, e))?;
        let reply: ApiReply = ensure_success(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| LeadpipeError::provider(SERVICE, format!("malformed reply: {e}")))?;

        if !reply.ok {
            return Err(LeadpipeError::provider(
                SERVICE,
                reply.description.unwrap_or_else(|| "message rejected".into()),
            ));
        }
        debug!("notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn send_posts_to_bot_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botabc123/sendMessage"))
            .and(body_partial_json(serde_json::json!({ "chat_id": "42", "text": "hello" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::new(&server.uri(), Some("abc123".into()), Duration::from_secs(5)).unwrap();
        notifier.send("42", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn api_rejection_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "description": "chat not found"
            })))
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::new(&server.uri(), Some("t".into()), Duration::from_secs(5)).unwrap();
        let err = notifier.send("0", "x").await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }
}
