//! Gatedeck core types: accounts, snapshots, notifications.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod config;

pub use config::{ChatbotConfig, FieldError, Webhook, WebhookDraft, WebhookEvent};

/// Stable backend-assigned account identifier.
pub type AccountId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Initializing,
    QrPending,
    Authenticated,
    Ready,
    Disconnected,
}

impl AccountStatus {
    /// Whether the reconnect affordance is offered for this status.
    pub fn can_reconnect(self) -> bool {
        !matches!(self, AccountStatus::Ready)
    }

    /// Whether a pairing artifact may be requested for this status.
    pub fn can_pair(self) -> bool {
        !matches!(self, AccountStatus::Ready)
    }
}

impl Default for AccountStatus {
    fn default() -> Self {
        AccountStatus::Initializing
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccountStatus::Initializing => "initializing",
            AccountStatus::QrPending => "qr_pending",
            AccountStatus::Authenticated => "authenticated",
            AccountStatus::Ready => "ready",
            AccountStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WebhookSummary {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub active: usize,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChatbotSummary {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Per-account feature summary. Backends may omit any subfield; missing
/// pieces default so rendering never fails on a partial object.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AccountFeatures {
    #[serde(default)]
    pub webhooks: WebhookSummary,
    #[serde(default)]
    pub chatbot: ChatbotSummary,
}

impl AccountFeatures {
    /// Clamp derived counters to a consistent shape: `active <= count`.
    pub fn normalize(&mut self) {
        if self.webhooks.active > self.webhooks.count {
            self.webhooks.active = self.webhooks.count;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub features: AccountFeatures,
    #[serde(default)]
    pub created_at: i64,
}

impl Account {
    /// Case-insensitive substring match over name, phone and id.
    pub fn matches(&self, needle_lower: &str) -> bool {
        if needle_lower.is_empty() {
            return true;
        }
        if self.name.to_lowercase().contains(needle_lower) {
            return true;
        }
        if self.id.to_lowercase().contains(needle_lower) {
            return true;
        }
        self.phone_number
            .as_deref()
            .map(|p| p.to_lowercase().contains(needle_lower))
            .unwrap_or(false)
    }
}

/// The wholesale-replaced account world. Readers hold an `Arc` to one of
/// these; a refresh never mutates a published snapshot in place.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccountSnapshot {
    pub epoch: u64,
    pub accounts: Vec<Account>,
}

impl AccountSnapshot {
    pub fn get(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }
}

/// Aggregate gateway counters from the stats endpoint. All fields
/// default: an older backend that omits a counter renders as zero.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GatewayStats {
    #[serde(default)]
    pub accounts_total: usize,
    #[serde(default)]
    pub accounts_ready: usize,
    #[serde(default)]
    pub messages_today: u64,
    #[serde(default)]
    pub webhook_deliveries: u64,
}

/// Opaque one-time pairing payload (rendered, never interpreted).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairingArtifact(pub String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
    Message,
    Connection,
}

/// Operator-facing log entry. The log itself is capped and persisted by
/// gatedeck-persist; this is just the record shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
    pub created_label: String,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionUser {
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HealthReport {
    #[serde(default)]
    pub healthy: bool,
    #[serde(default)]
    pub uptime_secs: u64,
    #[serde(default)]
    pub version: Option<String>,
}
