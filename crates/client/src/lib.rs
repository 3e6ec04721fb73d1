//! Gatedeck gateway client: REST calls over reqwest plus the
//! WebSocket push channel.

#![forbid(unsafe_code)]

use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use gatedeck_api::{
    ApiError, ApiResult, FieldError, GatewayApi, PairingRequested, PushEvent, StreamHandle,
};
use gatedeck_core::{
    Account, ChatbotConfig, GatewayStats, HealthReport, PairingArtifact, SessionUser, Webhook,
    WebhookDraft,
};

mod push;

/// HTTP implementation of [`GatewayApi`]. Session auth rides on the
/// cookie jar; every non-2xx response maps into the error taxonomy.
pub struct HttpGateway {
    base: Url,
    http: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base).with_context(|| format!("parsing base url {}", base))?;
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .context("building http client")?;
        Ok(Self { base, http })
    }

    fn endpoint(&self, path: &str) -> ApiResult<Url> {
        self.base
            .join(path)
            .map_err(|e| ApiError::Internal(format!("bad endpoint {}: {}", path, e)))
    }

    /// Push-channel URL derived from the base: same host, ws scheme, /ws.
    pub fn push_url(&self) -> ApiResult<Url> {
        let mut u = self.endpoint("/ws")?;
        let scheme = if u.scheme() == "https" { "wss" } else { "ws" };
        u.set_scheme(scheme)
            .map_err(|_| ApiError::Internal("cannot derive ws url".into()))?;
        Ok(u)
    }

    async fn take<T: DeserializeOwned>(&self, resp: reqwest::Response) -> ApiResult<T> {
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(classify(status, &body));
        }
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Internal(format!("decoding response: {}", e)))
    }

    async fn take_unit(&self, resp: reqwest::Response) -> ApiResult<()> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(classify(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "GET");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        self.take(resp).await
    }

    async fn post_json<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        self.take(resp).await
    }

    async fn post_unit<B: serde::Serialize>(&self, path: &str, body: &B) -> ApiResult<()> {
        let url = self.endpoint(path)?;
        debug!(%url, "POST");
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        self.take_unit(resp).await
    }

    async fn delete_unit(&self, path: &str) -> ApiResult<()> {
        let url = self.endpoint(path)?;
        debug!(%url, "DELETE");
        let resp = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        self.take_unit(resp).await
    }
}

/// Backend error body shapes: either `{"errors":[{field,message}..]}`
/// or a flat `{"error":"..."}`.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<FieldError>,
    #[serde(default)]
    error: Option<String>,
}

/// Map an HTTP status + body into the taxonomy. Field-level messages
/// pass through verbatim for rendering next to their inputs.
pub fn classify(status: StatusCode, body: &str) -> ApiError {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.error.clone())
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body.chars().take(200).collect()
            }
        });
    match status {
        StatusCode::UNAUTHORIZED => ApiError::NotAuthenticated,
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        StatusCode::CONFLICT => ApiError::Conflict(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            match parsed {
                Some(b) if !b.errors.is_empty() => ApiError::Validation(b.errors),
                _ => ApiError::Validation(vec![FieldError {
                    field: "_".into(),
                    message,
                }]),
            }
        }
        _ => ApiError::Internal(message),
    }
}

#[derive(Deserialize)]
struct QrBody {
    #[serde(default)]
    artifact: Option<String>,
}

#[derive(Deserialize)]
struct ReplyBody {
    #[serde(default)]
    reply: String,
}

#[derive(serde::Serialize)]
struct NameBody<'a> {
    name: &'a str,
}

#[derive(serde::Serialize)]
struct PromptBody<'a> {
    prompt: &'a str,
}

#[async_trait::async_trait]
impl GatewayApi for HttpGateway {
    async fn session(&self) -> ApiResult<SessionUser> {
        self.get_json("/api/auth/user").await
    }

    async fn logout(&self) -> ApiResult<()> {
        self.post_unit("/api/auth/logout", &serde_json::json!({})).await
    }

    async fn list_accounts(&self) -> ApiResult<Vec<Account>> {
        self.get_json("/api/accounts").await
    }

    async fn stats(&self) -> ApiResult<GatewayStats> {
        self.get_json("/api/stats").await
    }

    async fn create_account(&self, name: &str) -> ApiResult<Account> {
        self.post_json("/api/accounts", &NameBody { name }).await
    }

    async fn delete_account(&self, id: &str) -> ApiResult<()> {
        self.delete_unit(&format!("/api/accounts/{}", id)).await
    }

    async fn pairing_code(&self, id: &str) -> ApiResult<Option<PairingArtifact>> {
        let body: QrBody = self.get_json(&format!("/api/accounts/{}/qr", id)).await?;
        Ok(body.artifact.map(PairingArtifact))
    }

    async fn request_pairing(&self, id: &str) -> ApiResult<PairingRequested> {
        self.post_json(
            &format!("/api/accounts/{}/request-qr", id),
            &serde_json::json!({}),
        )
        .await
    }

    async fn reconnect(&self, id: &str) -> ApiResult<()> {
        self.post_unit(
            &format!("/api/accounts/{}/reconnect", id),
            &serde_json::json!({}),
        )
        .await
    }

    async fn list_webhooks(&self, id: &str) -> ApiResult<Vec<Webhook>> {
        self.get_json(&format!("/api/accounts/{}/webhooks", id)).await
    }

    async fn save_webhook(&self, id: &str, draft: &WebhookDraft) -> ApiResult<Webhook> {
        self.post_json(&format!("/api/accounts/{}/webhooks", id), draft).await
    }

    async fn delete_webhook(&self, id: &str, webhook_id: &str) -> ApiResult<()> {
        self.delete_unit(&format!("/api/accounts/{}/webhooks/{}", id, webhook_id))
            .await
    }

    async fn test_webhook(&self, id: &str, webhook_id: &str) -> ApiResult<()> {
        self.post_unit(
            &format!("/api/accounts/{}/webhooks/{}/test", id, webhook_id),
            &serde_json::json!({}),
        )
        .await
    }

    async fn chatbot(&self, id: &str) -> ApiResult<ChatbotConfig> {
        self.get_json(&format!("/api/accounts/{}/chatbot", id)).await
    }

    async fn save_chatbot(&self, cfg: &ChatbotConfig) -> ApiResult<()> {
        self.post_unit(&format!("/api/accounts/{}/chatbot", cfg.account_id), cfg)
            .await
    }

    async fn test_chatbot(&self, id: &str, prompt: &str) -> ApiResult<String> {
        let body: ReplyBody = self
            .post_json(
                &format!("/api/accounts/{}/chatbot/test", id),
                &PromptBody { prompt },
            )
            .await?;
        Ok(body.reply)
    }

    async fn recent_messages(&self, limit: usize) -> ApiResult<Vec<serde_json::Value>> {
        self.get_json(&format!("/api/messages?limit={}", limit)).await
    }

    async fn health(&self) -> ApiResult<HealthReport> {
        self.get_json("/api/health").await
    }

    async fn service_logs(&self, limit: usize) -> ApiResult<Vec<String>> {
        self.get_json(&format!("/api/logs?limit={}", limit)).await
    }

    async fn subscribe_push(&self) -> ApiResult<StreamHandle<PushEvent>> {
        let url = self.push_url()?;
        Ok(push::subscribe(url))
    }
}
