//! Gatedeck console controller.
//!
//! Owns the view-facing state (pairing view, status overlay, alerts,
//! filter), drives the account registry, and reconciles three input
//! channels: user commands, push events, and the fixed-interval poll.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{info, warn};

use gatedeck_api::{ApiError, ApiResult, GatewayApi};
use gatedeck_core::{AccountStatus, Notification, NotificationKind};
use gatedeck_persist::{NotificationLog, SessionPrefs, PREF_AUTHENTICATED, PREF_USERNAME};
use gatedeck_store::{AccountRegistry, ConfigCache};

mod bus;
mod commands;
mod debounce;
mod lifecycle;
mod model;
mod render;
mod scheduler;

pub use commands::{Command, CommandOutcome};
pub use debounce::Debouncer;
pub use model::{Alert, AlertKind, PairingPhase, PairingView, StatusOverlay};
pub use render::{NullRenderer, Renderer};
pub use scheduler::run as run_reconciliation;

fn refresh_debounce_ms() -> u64 {
    std::env::var("GATEDECK_REFRESH_DEBOUNCE_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(2000)
}

pub struct Console {
    api: Arc<dyn GatewayApi>,
    registry: Arc<AccountRegistry>,
    cache: ConfigCache,
    log: Arc<dyn NotificationLog>,
    prefs: Arc<dyn SessionPrefs>,
    renderer: Arc<dyn Renderer>,
    pairing: Mutex<Option<PairingView>>,
    overlay: Mutex<StatusOverlay>,
    alerts: Mutex<Vec<Alert>>,
    filter: Mutex<String>,
    refresh_debounce: Debouncer,
    shutdown_tx: watch::Sender<bool>,
    weak: Weak<Console>,
}

impl Console {
    pub fn new(
        api: Arc<dyn GatewayApi>,
        log: Arc<dyn NotificationLog>,
        prefs: Arc<dyn SessionPrefs>,
        renderer: Arc<dyn Renderer>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new_cyclic(|weak| Self {
            registry: Arc::new(AccountRegistry::new(api.clone())),
            api,
            cache: ConfigCache::new(),
            log,
            prefs,
            renderer,
            pairing: Mutex::new(None),
            overlay: Mutex::new(StatusOverlay::default()),
            alerts: Mutex::new(Vec::new()),
            filter: Mutex::new(String::new()),
            refresh_debounce: Debouncer::new(Duration::from_millis(refresh_debounce_ms())),
            shutdown_tx,
            weak: weak.clone(),
        })
    }

    pub fn registry(&self) -> &AccountRegistry {
        &self.registry
    }

    /// Session check, initial refresh, then the long-lived tasks: the
    /// push-event bus and the reconciliation poll.
    pub async fn start(&self) -> ApiResult<()> {
        let user = match self.api.session().await {
            Ok(u) => u,
            Err(ApiError::NotAuthenticated) => {
                self.end_session().await;
                return Err(ApiError::NotAuthenticated);
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = self.prefs.set_pref(PREF_AUTHENTICATED, "1") {
            warn!(error = %e, "persisting auth flag failed");
        }
        if let Err(e) = self.prefs.set_pref(PREF_USERNAME, &user.username) {
            warn!(error = %e, "persisting username failed");
        }
        info!(user = %user.username, "session established");

        self.refresh_now().await;
        self.render_unread_badge();

        if let Some(me) = self.weak.upgrade() {
            bus::spawn(me.clone());
            scheduler::spawn(me);
        }
        Ok(())
    }

    /// Immediate full refresh. `Network` keeps the stale snapshot and
    /// raises a dismissible alert; `NotAuthenticated` ends the session.
    pub async fn refresh_now(&self) {
        match self.registry.refresh().await {
            Ok(_) => {
                // the refresh is ground truth; push-reported statuses
                // older than it are superseded
                if let Ok(mut ov) = self.overlay.lock() {
                    ov.clear();
                }
                self.render_accounts_now();
            }
            Err(ApiError::NotAuthenticated) => self.end_session().await,
            Err(e) if e.is_transient() => {
                self.alert(format!("refresh failed: {}", e), AlertKind::Warn);
            }
            Err(e) => {
                self.alert(format!("refresh failed: {}", e), AlertKind::Error);
            }
        }
    }

    /// Debounced refresh used by push handlers: several accounts
    /// changing state together produce one request, not a storm.
    pub fn kick_refresh(&self) {
        let Some(me) = self.weak.upgrade() else { return };
        self.refresh_debounce.schedule(move || async move {
            me.refresh_now().await;
        });
    }

    pub fn set_filter(&self, query: &str) {
        if let Ok(mut f) = self.filter.lock() {
            *f = query.to_string();
        }
        self.render_accounts_now();
    }

    pub(crate) fn render_accounts_now(&self) {
        let filter = self.filter.lock().map(|f| f.clone()).unwrap_or_default();
        let visible = self.registry.filter(&filter);
        let overlay = self
            .overlay
            .lock()
            .map(|o| o.clone())
            .unwrap_or_default();
        self.renderer.render_accounts(&visible, &overlay);
    }

    /// Status as the operator should see it right now: push-reported
    /// overlay first, last refreshed snapshot otherwise.
    pub fn effective_status(&self, id: &str) -> Option<AccountStatus> {
        if let Ok(ov) = self.overlay.lock() {
            if let Some(s) = ov.get(id) {
                return Some(*s);
            }
        }
        self.registry.current().get(id).map(|a| a.status)
    }

    pub(crate) fn alert(&self, text: impl Into<String>, kind: AlertKind) {
        let alert = Alert::new(text, kind);
        self.renderer.render_alert(&alert);
        if let Ok(mut alerts) = self.alerts.lock() {
            let now = Instant::now();
            alerts.retain(|a| !a.expired(now));
            alerts.push(alert);
        }
    }

    /// Live (non-expired) alerts, pruned on read.
    pub fn alerts(&self) -> Vec<Alert> {
        let now = Instant::now();
        match self.alerts.lock() {
            Ok(mut alerts) => {
                alerts.retain(|a| !a.expired(now));
                alerts.clone()
            }
            Err(_) => Vec::new(),
        }
    }

    pub(crate) fn notify(&self, kind: NotificationKind, title: &str, description: String) {
        let n = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            title: title.to_string(),
            description,
            created_label: chrono::Local::now().format("%H:%M").to_string(),
            read: false,
        };
        if let Err(e) = self.log.add(&n) {
            warn!(error = %e, "persisting notification failed");
        }
        self.render_unread_badge();
    }

    pub(crate) fn render_unread_badge(&self) {
        match self.log.unread_count() {
            Ok(n) => self.renderer.render_unread_badge(n),
            Err(e) => warn!(error = %e, "unread count failed"),
        }
    }

    /// The sole hard exit: clear persisted auth, redirect, stop tasks.
    pub async fn end_session(&self) {
        info!("session ended; redirecting to login");
        if let Err(e) = self.prefs.clear_auth() {
            warn!(error = %e, "clearing auth prefs failed");
        }
        self.refresh_debounce.cancel();
        self.renderer.redirect_to_login();
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Block until the session ends (logout or auth loss).
    pub async fn wait_shutdown(&self) {
        let mut rx = self.shutdown_signal();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}
