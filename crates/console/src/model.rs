#![forbid(unsafe_code)]

use std::time::Instant;

use rustc_hash::FxHashMap;

use gatedeck_core::{AccountId, AccountStatus, PairingArtifact};

/// The single open pairing view. At most one exists at a time; the
/// account-id match rule in the lifecycle guards it against artifacts
/// pushed for other accounts.
#[derive(Debug, Clone)]
pub struct PairingView {
    pub account_id: AccountId,
    pub phase: PairingPhase,
    pub opened_at: Instant,
}

#[derive(Debug, Clone)]
pub enum PairingPhase {
    /// Pairing requested; waiting for the artifact over the push
    /// channel. Rendered as a loading affordance.
    Requested,
    /// Artifact on screen.
    Displayed {
        artifact: PairingArtifact,
        displayed_at: Instant,
    },
}

impl PairingView {
    pub fn artifact(&self) -> Option<&PairingArtifact> {
        match &self.phase {
            PairingPhase::Displayed { artifact, .. } => Some(artifact),
            PairingPhase::Requested => None,
        }
    }
}

/// Push-reported statuses that arrived since the last applied refresh.
/// The snapshot itself is only ever replaced wholesale by the registry;
/// this overlay is what makes status events visible immediately.
pub type StatusOverlay = FxHashMap<AccountId, AccountStatus>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Info,
    Success,
    Warn,
    Error,
}

/// Transient, auto-dismissing, non-blocking operator alert.
#[derive(Debug, Clone)]
pub struct Alert {
    pub text: String,
    pub kind: AlertKind,
    pub created: Instant,
    pub duration_ms: u64,
}

impl Alert {
    pub fn new(text: impl Into<String>, kind: AlertKind) -> Self {
        let duration_ms = match kind {
            AlertKind::Error => 5000,
            AlertKind::Warn => 4000,
            _ => 3000,
        };
        Self { text: text.into(), kind, created: Instant::now(), duration_ms }
    }

    pub fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.created).as_millis() >= self.duration_ms as u128
    }
}
