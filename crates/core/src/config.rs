//! Webhook and chatbot configuration records, with the field-level
//! validation that must run before any network call.

use serde::{Deserialize, Serialize};

use crate::AccountId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WebhookEvent {
    #[serde(rename = "message")]
    Message,
    #[serde(rename = "message_ack")]
    MessageAck,
    #[serde(rename = "*")]
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Webhook {
    pub id: String,
    pub account_id: AccountId,
    pub url: String,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: i64,
}

/// Unsaved webhook as entered in the console. The backend assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WebhookDraft {
    pub url: String,
    #[serde(default)]
    pub events: Vec<WebhookEvent>,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

/// One rejected field, rendered verbatim next to the input it names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatbotConfig {
    pub account_id: AccountId,
    pub provider: String,
    pub model: String,
    /// Write-only from the console's perspective; see [`ChatbotConfig::redacted`].
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub is_active: bool,
}

fn default_temperature() -> f32 {
    0.7
}

impl ChatbotConfig {
    /// Client-side checks that must reject a save before it reaches the
    /// network: an active bot needs a key, temperature stays in [0, 2].
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errs = Vec::new();
        if self.is_active && self.api_key.trim().is_empty() {
            errs.push(FieldError {
                field: "api_key".into(),
                message: "API key is required when the chatbot is enabled".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            errs.push(FieldError {
                field: "temperature".into(),
                message: "temperature must be between 0 and 2".into(),
            });
        }
        if self.provider.trim().is_empty() {
            errs.push(FieldError {
                field: "provider".into(),
                message: "provider is required".into(),
            });
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(errs)
        }
    }

    /// Copy safe to cross the renderer seam: the key never leaves the
    /// controller in readable form.
    pub fn redacted(&self) -> ChatbotConfig {
        let mut c = self.clone();
        if !c.api_key.is_empty() {
            c.api_key = "••••••••".into();
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ChatbotConfig {
        ChatbotConfig {
            account_id: "acc-1".into(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key: "sk-test".into(),
            system_prompt: String::new(),
            temperature: 0.7,
            is_active: true,
        }
    }

    #[test]
    fn active_requires_api_key() {
        let mut c = cfg();
        c.api_key = " ".into();
        let errs = c.validate().unwrap_err();
        assert!(errs.iter().any(|e| e.field == "api_key"));
    }

    #[test]
    fn inactive_allows_empty_key() {
        let mut c = cfg();
        c.api_key = String::new();
        c.is_active = false;
        assert!(c.validate().is_ok());
    }

    #[test]
    fn temperature_bounds() {
        let mut c = cfg();
        c.temperature = 2.1;
        assert!(c.validate().is_err());
        c.temperature = 2.0;
        assert!(c.validate().is_ok());
        c.temperature = -0.1;
        assert!(c.validate().is_err());
    }

    #[test]
    fn redacted_hides_key() {
        let c = cfg().redacted();
        assert!(!c.api_key.contains("sk-"));
    }

    #[test]
    fn webhook_event_wire_names() {
        assert_eq!(serde_json::to_string(&WebhookEvent::All).unwrap(), "\"*\"");
        let e: WebhookEvent = serde_json::from_str("\"message_ack\"").unwrap();
        assert_eq!(e, WebhookEvent::MessageAck);
    }
}
