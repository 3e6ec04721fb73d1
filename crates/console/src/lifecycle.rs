//! Per-account connection lifecycle: pairing-view management, status
//! transitions, reconnect and delete.
//!
//! The one correctness guarantee that matters here: an artifact pushed
//! for account B while the operator is looking at account A's pairing
//! view is never rendered.

#![forbid(unsafe_code)]

use std::time::Instant;

use metrics::counter;
use tracing::{debug, info, warn};

use gatedeck_api::ApiError;
use gatedeck_core::{AccountStatus, NotificationKind, PairingArtifact};

use crate::model::{AlertKind, PairingPhase, PairingView};
use crate::Console;

impl Console {
    /// Current pairing view, if any.
    pub fn pairing_view(&self) -> Option<PairingView> {
        self.pairing.lock().ok().and_then(|p| p.clone())
    }

    /// Open the pairing view for an account and ask the backend for a
    /// code. A `ready` answer short-circuits: the account is already
    /// connected and no artifact will follow.
    pub async fn open_pairing(&self, id: &str) {
        if self.effective_status(id) == Some(AccountStatus::Ready) {
            self.alert("account is already connected", AlertKind::Info);
            return;
        }
        let view = PairingView {
            account_id: id.to_string(),
            phase: PairingPhase::Requested,
            opened_at: Instant::now(),
        };
        if let Ok(mut p) = self.pairing.lock() {
            *p = Some(view.clone());
        }
        self.renderer.render_pairing(&view);

        // A code may already be waiting from an earlier attempt.
        match self.api.pairing_code(id).await {
            Ok(Some(artifact)) => {
                self.on_qr(id, artifact);
                return;
            }
            Ok(None) => {}
            Err(ApiError::NotAuthenticated) => {
                self.end_session().await;
                return;
            }
            Err(e) => debug!(account = %id, error = %e, "cached pairing code lookup failed"),
        }

        match self.api.request_pairing(id).await {
            Ok(r) if r.status == Some(AccountStatus::Ready) => {
                info!(account = %id, "pairing skipped; backend reports ready");
                self.close_pairing();
                self.set_overlay_status(id, AccountStatus::Ready);
                self.alert("account connected", AlertKind::Success);
                self.kick_refresh();
                self.render_accounts_now();
            }
            Ok(_) => {
                // stay in Requested; the artifact arrives via push
            }
            Err(ApiError::NotAuthenticated) => self.end_session().await,
            Err(e) => {
                warn!(account = %id, error = %e, "pairing request failed");
                self.close_pairing();
                self.alert(format!("pairing request failed: {}", e), AlertKind::Error);
            }
        }
    }

    pub fn close_pairing(&self) {
        if let Ok(mut p) = self.pairing.lock() {
            if p.take().is_some() {
                self.renderer.clear_pairing();
            }
        }
    }

    /// Push-delivered artifact. Applied only when it targets the
    /// account whose pairing view is open; anything else belongs to a
    /// background reconnect and is dropped.
    pub fn on_qr(&self, account_id: &str, artifact: PairingArtifact) {
        let Ok(mut p) = self.pairing.lock() else { return };
        match p.as_mut() {
            Some(view) if view.account_id == account_id => {
                view.phase = PairingPhase::Displayed {
                    artifact,
                    displayed_at: Instant::now(),
                };
                let view = view.clone();
                drop(p);
                self.renderer.render_pairing(&view);
            }
            Some(view) => {
                counter!("pairing_qr_dropped_total", 1u64);
                debug!(
                    viewed = %view.account_id,
                    pushed = %account_id,
                    "qr for non-viewed account dropped"
                );
            }
            None => {
                counter!("pairing_qr_dropped_total", 1u64);
                debug!(pushed = %account_id, "qr with no pairing view open dropped");
            }
        }
    }

    /// Status change reported over the push channel. Recorded in the
    /// overlay and reconciled by the debounced refresh; the event
    /// payload never rewrites the pairing artifact.
    pub fn on_status(&self, account_id: &str, status: AccountStatus) {
        info!(account = %account_id, status = %status, "status event");
        self.set_overlay_status(account_id, status);

        let viewed = self
            .pairing
            .lock()
            .ok()
            .and_then(|p| p.as_ref().map(|v| v.account_id.clone()));
        if viewed.as_deref() == Some(account_id) {
            match status {
                // pairing attempt resolved, one way or the other; a
                // consumed artifact must never stay on screen
                AccountStatus::Authenticated
                | AccountStatus::Ready
                | AccountStatus::Disconnected => self.close_pairing(),
                _ => {}
            }
        }

        let (kind, title) = match status {
            AccountStatus::Ready => (NotificationKind::Success, "Account connected"),
            AccountStatus::Authenticated => (NotificationKind::Connection, "Account authenticated"),
            AccountStatus::Disconnected => (NotificationKind::Warning, "Account disconnected"),
            _ => (NotificationKind::Connection, "Account status changed"),
        };
        self.notify(kind, title, format!("{}: {}", account_id, status));
        let alert_kind = match status {
            AccountStatus::Ready => AlertKind::Success,
            AccountStatus::Disconnected => AlertKind::Warn,
            _ => AlertKind::Info,
        };
        self.alert(format!("{}: {}", account_id, status), alert_kind);

        self.kick_refresh();
        self.render_accounts_now();
    }

    fn set_overlay_status(&self, account_id: &str, status: AccountStatus) {
        if let Ok(mut ov) = self.overlay.lock() {
            ov.insert(account_id.to_string(), status);
        }
    }

    /// Reconnect a non-ready account. No optimistic transition: failure
    /// alerts and leaves state exactly as it was.
    pub async fn reconnect_account(&self, id: &str) -> bool {
        if self.effective_status(id) == Some(AccountStatus::Ready) {
            self.alert("account is already connected", AlertKind::Info);
            return false;
        }
        match self.api.reconnect(id).await {
            Ok(()) => {
                info!(account = %id, "reconnect requested");
                self.alert("reconnect requested", AlertKind::Info);
                self.kick_refresh();
                true
            }
            Err(ApiError::NotAuthenticated) => {
                self.end_session().await;
                false
            }
            Err(e) => {
                warn!(account = %id, error = %e, "reconnect failed");
                self.alert(format!("reconnect failed: {}", e), AlertKind::Error);
                false
            }
        }
    }

    /// Irreversible. Without explicit confirmation no call is issued and
    /// the account persists.
    pub async fn delete_account(&self, id: &str, confirmed: bool) -> bool {
        if !confirmed {
            debug!(account = %id, "delete not confirmed; no call issued");
            return false;
        }
        match self.api.delete_account(id).await {
            Ok(()) => {
                self.registry.remove(id);
                if let Ok(mut ov) = self.overlay.lock() {
                    ov.remove(id);
                }
                self.cache.evict(id);
                if self.pairing_view().map(|v| v.account_id) == Some(id.to_string()) {
                    self.close_pairing();
                }
                self.notify(NotificationKind::Info, "Account deleted", id.to_string());
                self.alert("account deleted", AlertKind::Success);
                self.kick_refresh();
                self.render_accounts_now();
                true
            }
            Err(ApiError::NotAuthenticated) => {
                self.end_session().await;
                false
            }
            Err(e) => {
                warn!(account = %id, error = %e, "delete failed");
                self.alert(format!("delete failed: {}", e), AlertKind::Error);
                false
            }
        }
    }
}
