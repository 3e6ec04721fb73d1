#![forbid(unsafe_code)]

use gatedeck_core::{Account, ChatbotConfig};

use crate::model::{Alert, PairingView, StatusOverlay};

/// The narrow seam to the presentation layer. The console decides what
/// is visible; implementations decide how it looks. Page layout, table
/// markup, charts and theming all live behind this trait.
pub trait Renderer: Send + Sync {
    /// Account rows after filtering, with push-reported statuses that a
    /// refresh has not yet confirmed.
    fn render_accounts(&self, visible: &[Account], overlay: &StatusOverlay);

    /// The open pairing view, loading affordance or artifact.
    fn render_pairing(&self, view: &PairingView);
    fn clear_pairing(&self);

    fn render_alert(&self, alert: &Alert);
    fn render_unread_badge(&self, unread: usize);

    /// Chatbot form population; `cfg` is already redacted.
    fn render_chatbot(&self, account_id: &str, cfg: &ChatbotConfig);

    /// The sole hard exit: persisted auth state is already cleared when
    /// this fires.
    fn redirect_to_login(&self);
}

/// No-op renderer for headless use.
#[derive(Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render_accounts(&self, _visible: &[Account], _overlay: &StatusOverlay) {}
    fn render_pairing(&self, _view: &PairingView) {}
    fn clear_pairing(&self) {}
    fn render_alert(&self, _alert: &Alert) {}
    fn render_unread_badge(&self, _unread: usize) {}
    fn render_chatbot(&self, _account_id: &str, _cfg: &ChatbotConfig) {}
    fn redirect_to_login(&self) {}
}
