//! Cross-component scenarios: pairing race guard, lifecycle flow,
//! confirmation gating, reconciliation polling.

#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatedeck_api::{
    ApiError, ApiResult, GatewayApi, PairingRequested, PushEvent, StreamHandle,
};
use gatedeck_console::{
    Alert, AlertKind, Command, CommandOutcome, Console, PairingPhase, PairingView, Renderer,
    StatusOverlay,
};
use gatedeck_core::{
    Account, AccountFeatures, AccountStatus, ChatbotConfig, GatewayStats, HealthReport,
    Notification, PairingArtifact, SessionUser, Webhook, WebhookDraft,
};
use gatedeck_persist::{NotificationLog, SessionPrefs, NOTIFICATION_CAP};

fn acc(id: &str, name: &str, status: AccountStatus) -> Account {
    Account {
        id: id.into(),
        name: name.into(),
        status,
        phone_number: None,
        features: AccountFeatures::default(),
        created_at: 0,
    }
}

/// Scripted gateway: canned responses plus a call log, so tests can
/// assert that a path issued no network call at all.
#[derive(Default)]
struct ScriptedApi {
    accounts: Mutex<Vec<Account>>,
    calls: Mutex<Vec<String>>,
    fail_delete: bool,
    fail_reconnect: bool,
    pairing_status: Mutex<Option<AccountStatus>>,
}

impl ScriptedApi {
    fn with_accounts(accounts: Vec<Account>) -> Self {
        Self { accounts: Mutex::new(accounts), ..Default::default() }
    }

    fn log_call(&self, what: impl Into<String>) {
        self.calls.lock().unwrap().push(what.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_matching(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }
}

#[async_trait::async_trait]
impl GatewayApi for ScriptedApi {
    async fn session(&self) -> ApiResult<SessionUser> {
        self.log_call("session");
        Ok(SessionUser { username: "operator".into(), display_name: None })
    }
    async fn logout(&self) -> ApiResult<()> {
        self.log_call("logout");
        Ok(())
    }
    async fn list_accounts(&self) -> ApiResult<Vec<Account>> {
        self.log_call("list_accounts");
        Ok(self.accounts.lock().unwrap().clone())
    }
    async fn stats(&self) -> ApiResult<GatewayStats> {
        self.log_call("stats");
        Ok(GatewayStats::default())
    }
    async fn create_account(&self, name: &str) -> ApiResult<Account> {
        self.log_call(format!("create:{}", name));
        let a = acc("acc-new", name, AccountStatus::Initializing);
        self.accounts.lock().unwrap().push(a.clone());
        Ok(a)
    }
    async fn delete_account(&self, id: &str) -> ApiResult<()> {
        self.log_call(format!("delete:{}", id));
        if self.fail_delete {
            return Err(ApiError::Conflict("account busy".into()));
        }
        self.accounts.lock().unwrap().retain(|a| a.id != id);
        Ok(())
    }
    async fn pairing_code(&self, id: &str) -> ApiResult<Option<PairingArtifact>> {
        self.log_call(format!("pairing_code:{}", id));
        Ok(None)
    }
    async fn request_pairing(&self, id: &str) -> ApiResult<PairingRequested> {
        self.log_call(format!("request_pairing:{}", id));
        Ok(PairingRequested { status: self.pairing_status.lock().unwrap().clone() })
    }
    async fn reconnect(&self, id: &str) -> ApiResult<()> {
        self.log_call(format!("reconnect:{}", id));
        if self.fail_reconnect {
            return Err(ApiError::Internal("gateway refused".into()));
        }
        Ok(())
    }
    async fn list_webhooks(&self, _id: &str) -> ApiResult<Vec<Webhook>> {
        Ok(Vec::new())
    }
    async fn save_webhook(&self, id: &str, _draft: &WebhookDraft) -> ApiResult<Webhook> {
        self.log_call(format!("save_webhook:{}", id));
        Err(ApiError::Internal("not scripted".into()))
    }
    async fn delete_webhook(&self, _id: &str, _webhook_id: &str) -> ApiResult<()> {
        Ok(())
    }
    async fn test_webhook(&self, _id: &str, _webhook_id: &str) -> ApiResult<()> {
        Ok(())
    }
    async fn chatbot(&self, id: &str) -> ApiResult<ChatbotConfig> {
        self.log_call(format!("chatbot:{}", id));
        Err(ApiError::NotFound("no chatbot".into()))
    }
    async fn save_chatbot(&self, cfg: &ChatbotConfig) -> ApiResult<()> {
        self.log_call(format!("save_chatbot:{}", cfg.account_id));
        Ok(())
    }
    async fn test_chatbot(&self, _id: &str, _prompt: &str) -> ApiResult<String> {
        Ok("pong".into())
    }
    async fn recent_messages(&self, _limit: usize) -> ApiResult<Vec<serde_json::Value>> {
        Ok(Vec::new())
    }
    async fn health(&self) -> ApiResult<HealthReport> {
        Ok(HealthReport::default())
    }
    async fn service_logs(&self, _limit: usize) -> ApiResult<Vec<String>> {
        Ok(Vec::new())
    }
    async fn subscribe_push(&self) -> ApiResult<StreamHandle<PushEvent>> {
        Err(ApiError::Internal("tests drive handle_push directly".into()))
    }
}

/// In-memory notification log with the same cap semantics as sqlite.
#[derive(Default)]
struct MemLog {
    items: Mutex<Vec<Notification>>,
}

impl NotificationLog for MemLog {
    fn add(&self, n: &Notification) -> anyhow::Result<()> {
        let mut items = self.items.lock().unwrap();
        items.insert(0, n.clone());
        items.truncate(NOTIFICATION_CAP);
        Ok(())
    }
    fn list(&self) -> anyhow::Result<Vec<Notification>> {
        Ok(self.items.lock().unwrap().clone())
    }
    fn dismiss(&self, id: &str) -> anyhow::Result<bool> {
        let mut items = self.items.lock().unwrap();
        let before = items.len();
        items.retain(|n| n.id != id);
        Ok(items.len() < before)
    }
    fn mark_all_read(&self) -> anyhow::Result<()> {
        for n in self.items.lock().unwrap().iter_mut() {
            n.read = true;
        }
        Ok(())
    }
    fn clear(&self) -> anyhow::Result<()> {
        self.items.lock().unwrap().clear();
        Ok(())
    }
    fn unread_count(&self) -> anyhow::Result<usize> {
        Ok(self.items.lock().unwrap().iter().filter(|n| !n.read).count())
    }
}

#[derive(Default)]
struct MemPrefs {
    map: Mutex<std::collections::HashMap<String, String>>,
}

impl SessionPrefs for MemPrefs {
    fn set_pref(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.map.lock().unwrap().insert(key.into(), value.into());
        Ok(())
    }
    fn get_pref(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }
    fn clear_auth(&self) -> anyhow::Result<()> {
        let mut m = self.map.lock().unwrap();
        m.remove(gatedeck_persist::PREF_AUTHENTICATED);
        m.remove(gatedeck_persist::PREF_USERNAME);
        Ok(())
    }
}

/// Records everything the console asks it to draw.
#[derive(Default)]
struct RecordingRenderer {
    pairing: Mutex<Option<PairingView>>,
    pairing_clears: Mutex<usize>,
    accounts: Mutex<Vec<Account>>,
    overlay: Mutex<StatusOverlay>,
    alerts: Mutex<Vec<Alert>>,
    redirects: Mutex<usize>,
}

impl RecordingRenderer {
    fn displayed_artifact(&self) -> Option<String> {
        self.pairing
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|v| v.artifact().map(|a| a.0.clone()))
    }
}

impl Renderer for RecordingRenderer {
    fn render_accounts(&self, visible: &[Account], overlay: &StatusOverlay) {
        *self.accounts.lock().unwrap() = visible.to_vec();
        *self.overlay.lock().unwrap() = overlay.clone();
    }
    fn render_pairing(&self, view: &PairingView) {
        *self.pairing.lock().unwrap() = Some(view.clone());
    }
    fn clear_pairing(&self) {
        *self.pairing.lock().unwrap() = None;
        *self.pairing_clears.lock().unwrap() += 1;
    }
    fn render_alert(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
    fn render_unread_badge(&self, _unread: usize) {}
    fn render_chatbot(&self, _account_id: &str, _cfg: &ChatbotConfig) {}
    fn redirect_to_login(&self) {
        *self.redirects.lock().unwrap() += 1;
    }
}

struct Rig {
    api: Arc<ScriptedApi>,
    renderer: Arc<RecordingRenderer>,
    prefs: Arc<MemPrefs>,
    log: Arc<MemLog>,
    console: Arc<Console>,
}

fn rig(api: ScriptedApi) -> Rig {
    let api = Arc::new(api);
    let renderer = Arc::new(RecordingRenderer::default());
    let prefs = Arc::new(MemPrefs::default());
    let log = Arc::new(MemLog::default());
    let console = Console::new(api.clone(), log.clone(), prefs.clone(), renderer.clone());
    Rig { api, renderer, prefs, log, console }
}

#[tokio::test]
async fn qr_for_other_account_never_touches_open_view() {
    let r = rig(ScriptedApi::with_accounts(vec![
        acc("a", "Support", AccountStatus::QrPending),
        acc("b", "Sales", AccountStatus::Disconnected),
    ]));
    r.console.refresh_now().await;
    r.console.open_pairing("a").await;

    // artifact for B arrives mid-view: must be discarded
    r.console
        .handle_push(PushEvent::Qr {
            account_id: "b".into(),
            artifact: PairingArtifact("b-code".into()),
        })
        .await;
    assert!(r.renderer.displayed_artifact().is_none());
    let view = r.console.pairing_view().expect("view still open");
    assert_eq!(view.account_id, "a");
    assert!(matches!(view.phase, PairingPhase::Requested));

    // the right artifact lands
    r.console
        .handle_push(PushEvent::Qr {
            account_id: "a".into(),
            artifact: PairingArtifact("a-code".into()),
        })
        .await;
    assert_eq!(r.renderer.displayed_artifact().as_deref(), Some("a-code"));
}

#[tokio::test]
async fn ready_event_closes_pairing_and_hides_reconnect() {
    let r = rig(ScriptedApi::with_accounts(vec![acc(
        "a",
        "Support",
        AccountStatus::QrPending,
    )]));
    r.console.refresh_now().await;
    r.console.open_pairing("a").await;
    r.console
        .handle_push(PushEvent::Qr {
            account_id: "a".into(),
            artifact: PairingArtifact("a-code".into()),
        })
        .await;

    r.console.handle_push(PushEvent::Ready { account_id: "a".into() }).await;

    assert!(r.console.pairing_view().is_none());
    assert_eq!(r.console.effective_status("a"), Some(AccountStatus::Ready));
    assert!(!AccountStatus::Ready.can_reconnect());
    // the event left a notification behind
    assert!(r.log.list().unwrap().iter().any(|n| n.title == "Account connected"));
}

#[tokio::test]
async fn authenticated_event_closes_viewed_pairing() {
    let r = rig(ScriptedApi::with_accounts(vec![acc(
        "a",
        "Support",
        AccountStatus::QrPending,
    )]));
    r.console.refresh_now().await;
    r.console.open_pairing("a").await;
    r.console
        .handle_push(PushEvent::Qr {
            account_id: "a".into(),
            artifact: PairingArtifact("a-code".into()),
        })
        .await;

    // the phone scanned the code; it is consumed and must come down
    r.console
        .handle_push(PushEvent::Authenticated { account_id: "a".into() })
        .await;

    assert!(r.console.pairing_view().is_none());
    assert!(r.renderer.displayed_artifact().is_none());
    assert_eq!(
        r.console.effective_status("a"),
        Some(AccountStatus::Authenticated)
    );
}

#[tokio::test]
async fn failed_reconnect_alerts_and_leaves_state_unchanged() {
    let mut api = ScriptedApi::with_accounts(vec![acc(
        "a",
        "Support",
        AccountStatus::Disconnected,
    )]);
    api.fail_reconnect = true;
    let r = rig(api);
    r.console.refresh_now().await;

    let out = r
        .console
        .dispatch(Command::Reconnect { account_id: "a".into() })
        .await;
    assert_eq!(out, CommandOutcome::Failed);
    assert_eq!(r.api.calls_matching("reconnect:a"), 1);
    // no optimistic transition
    assert_eq!(
        r.console.effective_status("a"),
        Some(AccountStatus::Disconnected)
    );
    assert!(r
        .renderer
        .alerts
        .lock()
        .unwrap()
        .iter()
        .any(|a| a.kind == AlertKind::Error));
}

#[tokio::test]
async fn request_pairing_ready_short_circuit_skips_artifact() {
    let api = ScriptedApi::with_accounts(vec![acc("a", "Support", AccountStatus::Disconnected)]);
    *api.pairing_status.lock().unwrap() = Some(AccountStatus::Ready);
    let r = rig(api);
    r.console.refresh_now().await;
    r.console.open_pairing("a").await;

    assert!(r.console.pairing_view().is_none());
    assert_eq!(r.console.effective_status("a"), Some(AccountStatus::Ready));
}

#[tokio::test]
async fn delete_without_confirmation_issues_no_call() {
    let r = rig(ScriptedApi::with_accounts(vec![acc(
        "a",
        "Support",
        AccountStatus::Ready,
    )]));
    r.console.refresh_now().await;

    let out = r
        .console
        .dispatch(Command::DeleteAccount { account_id: "a".into(), confirmed: false })
        .await;
    assert_eq!(out, CommandOutcome::ConfirmationRequired);
    assert_eq!(r.api.calls_matching("delete:"), 0);
    assert_eq!(r.console.registry().current().accounts.len(), 1);

    let out = r
        .console
        .dispatch(Command::DeleteAccount { account_id: "a".into(), confirmed: true })
        .await;
    assert_eq!(out, CommandOutcome::Done);
    assert_eq!(r.api.calls_matching("delete:"), 1);
    assert!(r.console.registry().current().accounts.is_empty());
}

#[tokio::test]
async fn failed_delete_keeps_account_and_reenables() {
    let mut api = ScriptedApi::with_accounts(vec![acc("a", "Support", AccountStatus::Ready)]);
    api.fail_delete = true;
    let r = rig(api);
    r.console.refresh_now().await;

    let out = r
        .console
        .dispatch(Command::DeleteAccount { account_id: "a".into(), confirmed: true })
        .await;
    assert_eq!(out, CommandOutcome::Failed);
    assert_eq!(r.console.registry().current().accounts.len(), 1);
    assert!(!r.renderer.alerts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn invalid_chatbot_config_rejected_before_network() {
    let r = rig(ScriptedApi::with_accounts(vec![acc(
        "a",
        "Support",
        AccountStatus::Ready,
    )]));
    let cfg = ChatbotConfig {
        account_id: "a".into(),
        provider: "openai".into(),
        model: "gpt-4o-mini".into(),
        api_key: String::new(),
        system_prompt: String::new(),
        temperature: 0.7,
        is_active: true,
    };
    let out = r.console.dispatch(Command::SaveChatbot { config: cfg }).await;
    match out {
        CommandOutcome::Rejected(errs) => {
            assert!(errs.iter().any(|e| e.field == "api_key"));
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
    assert_eq!(r.api.calls_matching("save_chatbot"), 0);
}

#[tokio::test]
async fn create_flow_starts_pairing_for_new_account() {
    let r = rig(ScriptedApi::default());
    let out = r
        .console
        .dispatch(Command::CreateAccount { name: "Support".into() })
        .await;
    assert_eq!(out, CommandOutcome::Done);
    assert_eq!(r.api.calls_matching("create:Support"), 1);
    assert_eq!(r.api.calls_matching("request_pairing:acc-new"), 1);
    let view = r.console.pairing_view().expect("pairing view opened");
    assert_eq!(view.account_id, "acc-new");

    // artifact arrives over push for the new account
    r.console
        .handle_push(PushEvent::Qr {
            account_id: "acc-new".into(),
            artifact: PairingArtifact("fresh-code".into()),
        })
        .await;
    assert_eq!(r.renderer.displayed_artifact().as_deref(), Some("fresh-code"));
}

#[tokio::test(start_paused = true)]
async fn reconciliation_polls_at_t0_and_every_period() {
    let r = rig(ScriptedApi::with_accounts(vec![acc(
        "a",
        "Support",
        AccountStatus::Ready,
    )]));
    let console = r.console.clone();
    tokio::spawn(gatedeck_console::run_reconciliation(
        console,
        Duration::from_secs(60),
    ));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(r.api.calls_matching("list_accounts"), 1, "t=0 poll");

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(r.api.calls_matching("list_accounts"), 2, "t=60 poll");

    // no push traffic at all, registry still tracks backend truth
    r.api.accounts.lock().unwrap().clear();
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(r.console.registry().current().accounts.is_empty());
}

#[tokio::test]
async fn not_authenticated_clears_auth_and_redirects() {
    let r = rig(ScriptedApi::default());
    r.prefs.set_pref(gatedeck_persist::PREF_AUTHENTICATED, "1").unwrap();

    // simulate auth loss on an arbitrary call path
    r.console.dispatch(Command::Logout).await;

    assert!(r
        .prefs
        .get_pref(gatedeck_persist::PREF_AUTHENTICATED)
        .unwrap()
        .is_none());
    assert_eq!(*r.renderer.redirects.lock().unwrap(), 1);
    assert!(*r.console.shutdown_signal().borrow());
}

#[tokio::test]
async fn status_overlay_cleared_by_next_refresh() {
    let r = rig(ScriptedApi::with_accounts(vec![acc(
        "a",
        "Support",
        AccountStatus::QrPending,
    )]));
    r.console.refresh_now().await;
    r.console
        .handle_push(PushEvent::Disconnected { account_id: "a".into() })
        .await;
    assert_eq!(
        r.console.effective_status("a"),
        Some(AccountStatus::Disconnected)
    );

    // backend now reports ready; the refresh is ground truth
    r.api.accounts.lock().unwrap()[0].status = AccountStatus::Ready;
    r.console.refresh_now().await;
    assert_eq!(r.console.effective_status("a"), Some(AccountStatus::Ready));
}

#[tokio::test]
async fn message_events_only_notify() {
    let r = rig(ScriptedApi::with_accounts(vec![acc(
        "a",
        "Support",
        AccountStatus::Ready,
    )]));
    r.console.refresh_now().await;
    let calls_before = r.api.calls_matching("list_accounts");
    r.console
        .handle_push(PushEvent::Message {
            account_id: "a".into(),
            payload: serde_json::json!({"body": "hello there"}),
        })
        .await;
    assert!(r
        .log
        .list()
        .unwrap()
        .iter()
        .any(|n| n.description.contains("hello there")));
    // no immediate refresh for message traffic
    assert_eq!(r.api.calls_matching("list_accounts"), calls_before);
}
