//! Realtime event bus: one subscription to the push channel at
//! startup, demultiplexed by event type and account id.

#![forbid(unsafe_code)]

use std::sync::Arc;

use tracing::{info, warn};

use gatedeck_api::PushEvent;
use gatedeck_core::{AccountStatus, NotificationKind};

use crate::model::AlertKind;
use crate::Console;

pub(crate) fn spawn(console: Arc<Console>) {
    tokio::spawn(async move {
        let mut shutdown = console.shutdown_signal();
        let handle = match console.api.subscribe_push().await {
            Ok(h) => h,
            Err(e) => {
                warn!(error = %e, "push subscription failed; poll remains the only sync channel");
                console.alert(
                    "realtime channel unavailable; falling back to polling",
                    AlertKind::Warn,
                );
                return;
            }
        };
        let mut rx = handle.rx;
        let cancel = handle.cancel;
        info!("event bus attached to push channel");
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    cancel.cancel();
                    break;
                }
                ev = rx.recv() => {
                    match ev {
                        Some(ev) => console.handle_push(ev).await,
                        None => {
                            warn!("push channel closed; reconciliation poll covers the gap");
                            break;
                        }
                    }
                }
            }
        }
    });
}

impl Console {
    /// Route one push event. Each arm is side-effect-only; a failing
    /// arm logs and never blocks delivery of the next event.
    pub async fn handle_push(&self, ev: PushEvent) {
        match ev {
            PushEvent::Connect => {
                self.notify(
                    NotificationKind::Connection,
                    "Gateway connected",
                    "push channel established".into(),
                );
            }
            PushEvent::Disconnect => {
                self.notify(
                    NotificationKind::Warning,
                    "Gateway connection lost",
                    "push channel dropped; reconnecting".into(),
                );
                self.alert("realtime connection lost", AlertKind::Warn);
            }
            PushEvent::Qr { account_id, artifact } => {
                self.on_qr(&account_id, artifact);
            }
            PushEvent::Authenticated { account_id } => {
                self.on_status(&account_id, AccountStatus::Authenticated);
            }
            PushEvent::Ready { account_id } => {
                self.on_status(&account_id, AccountStatus::Ready);
            }
            PushEvent::Disconnected { account_id } => {
                self.on_status(&account_id, AccountStatus::Disconnected);
            }
            PushEvent::Message { account_id, payload } => {
                let preview = payload
                    .get("body")
                    .and_then(|v| v.as_str())
                    .unwrap_or("new message")
                    .chars()
                    .take(80)
                    .collect::<String>();
                self.notify(NotificationKind::Message, "Message received", {
                    format!("{}: {}", account_id, preview)
                });
            }
        }
    }
}
