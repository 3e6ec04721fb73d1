//! Gatedeck store: the authoritative in-memory account snapshot and the
//! per-account chatbot config cache.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use metrics::{counter, histogram};
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use gatedeck_api::{ApiError, ApiResult, GatewayApi};
use gatedeck_core::{Account, AccountId, AccountSnapshot, ChatbotConfig, GatewayStats};

/// Owner of the account world. The snapshot is replaced wholesale on
/// every refresh; readers hold `Arc`s and can never observe a list that
/// mixes pre- and post-refresh entries.
pub struct AccountRegistry {
    api: Arc<dyn GatewayApi>,
    snap: Arc<ArcSwap<AccountSnapshot>>,
    stats: Arc<ArcSwap<GatewayStats>>,
    epoch_tx: watch::Sender<u64>,
    epoch_rx: watch::Receiver<u64>,
}

impl AccountRegistry {
    pub fn new(api: Arc<dyn GatewayApi>) -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self {
            api,
            snap: Arc::new(ArcSwap::from_pointee(AccountSnapshot::default())),
            stats: Arc::new(ArcSwap::from_pointee(GatewayStats::default())),
            epoch_tx,
            epoch_rx,
        }
    }

    pub fn current(&self) -> Arc<AccountSnapshot> {
        self.snap.load_full()
    }

    pub fn stats(&self) -> Arc<GatewayStats> {
        self.stats.load_full()
    }

    /// Receiver that observes every published epoch bump.
    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_rx.clone()
    }

    /// Fetch accounts and stats, then swap in a fresh snapshot.
    ///
    /// Refreshes are idempotent and last-writer-wins: two racing calls
    /// both publish complete snapshots and the later store is the one
    /// readers end up with. On `Network` the previous snapshot stays
    /// untouched (stale beats empty); `NotAuthenticated` propagates to
    /// the session-termination path.
    pub async fn refresh(&self) -> ApiResult<Arc<AccountSnapshot>> {
        let t0 = Instant::now();
        let (accounts_res, stats_res) =
            tokio::join!(self.api.list_accounts(), self.api.stats());

        let mut accounts = match accounts_res {
            Ok(v) => v,
            Err(e) => {
                counter!("registry_refresh_failed_total", 1u64);
                if e.is_transient() {
                    warn!(error = %e, "refresh failed; keeping stale snapshot");
                }
                return Err(e);
            }
        };
        for a in accounts.iter_mut() {
            a.features.normalize();
        }

        // Stats are best-effort alongside the list; a failed stats call
        // does not invalidate a good account list.
        match stats_res {
            Ok(s) => self.stats.store(Arc::new(s)),
            Err(ApiError::NotAuthenticated) => return Err(ApiError::NotAuthenticated),
            Err(e) => debug!(error = %e, "stats fetch failed; keeping previous stats"),
        }

        let epoch = self.snap.load().epoch + 1;
        let next = Arc::new(AccountSnapshot { epoch, accounts });
        self.snap.store(next.clone());
        let _ = self.epoch_tx.send(epoch);
        histogram!("registry_refresh_ms", t0.elapsed().as_secs_f64() * 1000.0);
        counter!("registry_refresh_total", 1u64);
        info!(epoch, accounts = next.accounts.len(), took_ms = %t0.elapsed().as_millis(), "registry refreshed");
        Ok(next)
    }

    /// Pure projection for the search box; does not touch the snapshot.
    pub fn filter(&self, query: &str) -> Vec<Account> {
        let needle = query.trim().to_lowercase();
        self.current()
            .accounts
            .iter()
            .filter(|a| a.matches(&needle))
            .cloned()
            .collect()
    }

    /// The delete path: the only snapshot writer besides `refresh`.
    pub fn remove(&self, id: &str) {
        let cur = self.snap.load_full();
        let accounts: Vec<Account> =
            cur.accounts.iter().filter(|a| a.id != id).cloned().collect();
        if accounts.len() == cur.accounts.len() {
            return;
        }
        let epoch = cur.epoch + 1;
        self.snap.store(Arc::new(AccountSnapshot { epoch, accounts }));
        let _ = self.epoch_tx.send(epoch);
        info!(account = %id, epoch, "account removed from registry");
    }
}

/// Last-known chatbot configuration per account, volatile for the
/// session. Read-through: the console renders from here instantly and
/// overwrites when the network fetch lands.
#[derive(Default)]
pub struct ConfigCache {
    map: Mutex<FxHashMap<AccountId, ChatbotConfig>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ChatbotConfig> {
        self.map.lock().ok()?.get(id).cloned()
    }

    pub fn put(&self, cfg: ChatbotConfig) {
        if let Ok(mut m) = self.map.lock() {
            m.insert(cfg.account_id.clone(), cfg);
        }
    }

    pub fn evict(&self, id: &str) {
        if let Ok(mut m) = self.map.lock() {
            m.remove(id);
        }
    }
}
