//! Gatedeck public API façade.
//!
//! This crate defines the stable trait and types frontends depend on.
//! Implementations can be in-process doubles (tests) or the HTTP/WS
//! client in gatedeck-client.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use gatedeck_core::{
    Account, AccountId, ChatbotConfig, GatewayStats, HealthReport, PairingArtifact, SessionUser,
    Webhook, WebhookDraft,
};

pub use gatedeck_core::FieldError;

/// API errors suitable for transport and for surfacing policy: only
/// `NotAuthenticated` terminates the session; everything else is local
/// to the action that raised it.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum ApiError {
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("network: {0}")]
    Network(String),
    #[error("validation: {}", format_fields(.0))]
    Validation(Vec<FieldError>),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ApiError {
    /// Transient failures keep stale data and surface a dismissible
    /// alert; nothing else retries implicitly.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

fn format_fields(errs: &[FieldError]) -> String {
    errs.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Event pushed over the persistent channel. Wire frames are JSON
/// objects tagged by `event`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    Connect,
    Disconnect,
    Qr {
        account_id: AccountId,
        artifact: PairingArtifact,
    },
    Authenticated {
        account_id: AccountId,
    },
    Ready {
        account_id: AccountId,
    },
    Disconnected {
        account_id: AccountId,
    },
    Message {
        account_id: AccountId,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

impl PushEvent {
    /// Account the event concerns, when it carries one.
    pub fn account_id(&self) -> Option<&str> {
        match self {
            PushEvent::Qr { account_id, .. }
            | PushEvent::Authenticated { account_id }
            | PushEvent::Ready { account_id }
            | PushEvent::Disconnected { account_id }
            | PushEvent::Message { account_id, .. } => Some(account_id),
            PushEvent::Connect | PushEvent::Disconnect => None,
        }
    }
}

/// Response of the request-pairing call. A backend that is already
/// paired answers `ready` and no artifact will follow.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PairingRequested {
    #[serde(default)]
    pub status: Option<gatedeck_core::AccountStatus>,
}

/// Cancellation handle for an in-flight streaming operation.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    pub fn new(tx: oneshot::Sender<()>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn cancel(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Result of starting a streaming operation.
pub struct StreamHandle<T> {
    pub rx: mpsc::Receiver<T>,
    pub cancel: CancelHandle,
}

/// Declarative gateway surface consumed by the console.
#[async_trait::async_trait]
pub trait GatewayApi: Send + Sync {
    // session
    async fn session(&self) -> ApiResult<SessionUser>;
    async fn logout(&self) -> ApiResult<()>;

    // accounts
    async fn list_accounts(&self) -> ApiResult<Vec<Account>>;
    async fn stats(&self) -> ApiResult<GatewayStats>;
    async fn create_account(&self, name: &str) -> ApiResult<Account>;
    async fn delete_account(&self, id: &str) -> ApiResult<()>;

    // pairing / connection
    async fn pairing_code(&self, id: &str) -> ApiResult<Option<PairingArtifact>>;
    async fn request_pairing(&self, id: &str) -> ApiResult<PairingRequested>;
    async fn reconnect(&self, id: &str) -> ApiResult<()>;

    // webhooks
    async fn list_webhooks(&self, id: &str) -> ApiResult<Vec<Webhook>>;
    async fn save_webhook(&self, id: &str, draft: &WebhookDraft) -> ApiResult<Webhook>;
    async fn delete_webhook(&self, id: &str, webhook_id: &str) -> ApiResult<()>;
    async fn test_webhook(&self, id: &str, webhook_id: &str) -> ApiResult<()>;

    // chatbot
    async fn chatbot(&self, id: &str) -> ApiResult<ChatbotConfig>;
    async fn save_chatbot(&self, cfg: &ChatbotConfig) -> ApiResult<()>;
    async fn test_chatbot(&self, id: &str, prompt: &str) -> ApiResult<String>;

    // diagnostics
    async fn recent_messages(&self, limit: usize) -> ApiResult<Vec<serde_json::Value>>;
    async fn health(&self) -> ApiResult<HealthReport>;
    async fn service_logs(&self, limit: usize) -> ApiResult<Vec<String>>;

    /// Open the push channel. The stream ends only on cancel or a
    /// non-recoverable transport failure.
    async fn subscribe_push(&self) -> ApiResult<StreamHandle<PushEvent>>;
}
