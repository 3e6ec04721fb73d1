//! Explicit command dispatch: every operator action arrives here as a
//! named command carrying the ids it concerns. The state machine never
//! learns where a click came from.

#![forbid(unsafe_code)]

use tracing::warn;

use gatedeck_api::{ApiError, FieldError};
use gatedeck_core::{AccountId, ChatbotConfig, NotificationKind, WebhookDraft};

use crate::model::AlertKind;
use crate::Console;

#[derive(Debug, Clone)]
pub enum Command {
    Refresh,
    Filter { query: String },
    CreateAccount { name: String },
    OpenPairing { account_id: AccountId },
    ClosePairing,
    Reconnect { account_id: AccountId },
    DeleteAccount { account_id: AccountId, confirmed: bool },
    SaveWebhook { account_id: AccountId, draft: WebhookDraft },
    DeleteWebhook { account_id: AccountId, webhook_id: String },
    TestWebhook { account_id: AccountId, webhook_id: String },
    OpenChatbot { account_id: AccountId },
    SaveChatbot { config: ChatbotConfig },
    TestChatbot { account_id: AccountId, prompt: String },
    DismissNotification { id: String },
    MarkAllRead,
    ClearNotifications,
    Logout,
}

/// What the shell should do with the affordance that fired the command.
/// Every failure re-enables it so the operator can retry.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Done,
    /// Destructive action fired without confirmation; nothing was sent.
    ConfirmationRequired,
    /// Rejected client-side before any network call.
    Rejected(Vec<FieldError>),
    /// Backend said no; alert already raised, affordance re-enabled.
    Failed,
}

impl Console {
    pub async fn dispatch(&self, cmd: Command) -> CommandOutcome {
        match cmd {
            Command::Refresh => {
                self.refresh_now().await;
                CommandOutcome::Done
            }
            Command::Filter { query } => {
                self.set_filter(&query);
                CommandOutcome::Done
            }
            Command::CreateAccount { name } => match self.api.create_account(&name).await {
                Ok(acc) => {
                    self.notify(NotificationKind::Success, "Account created", acc.name.clone());
                    self.alert(format!("account \"{}\" created", acc.name), AlertKind::Success);
                    self.refresh_now().await;
                    // a fresh account starts its pairing flow immediately
                    self.open_pairing(&acc.id).await;
                    CommandOutcome::Done
                }
                Err(e) => self.fail(e).await,
            },
            Command::OpenPairing { account_id } => {
                self.open_pairing(&account_id).await;
                CommandOutcome::Done
            }
            Command::ClosePairing => {
                self.close_pairing();
                CommandOutcome::Done
            }
            Command::Reconnect { account_id } => {
                if self.reconnect_account(&account_id).await {
                    CommandOutcome::Done
                } else {
                    CommandOutcome::Failed
                }
            }
            Command::DeleteAccount { account_id, confirmed } => {
                if !confirmed {
                    return CommandOutcome::ConfirmationRequired;
                }
                if self.delete_account(&account_id, true).await {
                    CommandOutcome::Done
                } else {
                    CommandOutcome::Failed
                }
            }
            Command::SaveWebhook { account_id, draft } => {
                match self.api.save_webhook(&account_id, &draft).await {
                    Ok(wh) => {
                        self.alert(format!("webhook saved: {}", wh.url), AlertKind::Success);
                        self.kick_refresh();
                        CommandOutcome::Done
                    }
                    Err(ApiError::Validation(errs)) => {
                        // backend field messages render verbatim
                        CommandOutcome::Rejected(errs)
                    }
                    Err(e) => self.fail(e).await,
                }
            }
            Command::DeleteWebhook { account_id, webhook_id } => {
                match self.api.delete_webhook(&account_id, &webhook_id).await {
                    Ok(()) => {
                        self.alert("webhook deleted", AlertKind::Success);
                        self.kick_refresh();
                        CommandOutcome::Done
                    }
                    Err(e) => self.fail(e).await,
                }
            }
            Command::TestWebhook { account_id, webhook_id } => {
                match self.api.test_webhook(&account_id, &webhook_id).await {
                    Ok(()) => {
                        self.alert("test delivery sent", AlertKind::Success);
                        CommandOutcome::Done
                    }
                    Err(e) => self.fail(e).await,
                }
            }
            Command::OpenChatbot { account_id } => {
                // instant population from cache, then the fetch overwrites
                if let Some(cached) = self.cache.get(&account_id) {
                    self.renderer.render_chatbot(&account_id, &cached.redacted());
                }
                match self.api.chatbot(&account_id).await {
                    Ok(cfg) => {
                        self.renderer.render_chatbot(&account_id, &cfg.redacted());
                        self.cache.put(cfg);
                        CommandOutcome::Done
                    }
                    Err(ApiError::NotFound(_)) => {
                        // no config yet; the cached (or empty) form stands
                        CommandOutcome::Done
                    }
                    Err(e) => self.fail(e).await,
                }
            }
            Command::SaveChatbot { config } => {
                if let Err(errs) = config.validate() {
                    return CommandOutcome::Rejected(errs);
                }
                match self.api.save_chatbot(&config).await {
                    Ok(()) => {
                        self.renderer
                            .render_chatbot(&config.account_id, &config.redacted());
                        self.cache.put(config);
                        self.alert("chatbot configuration saved", AlertKind::Success);
                        CommandOutcome::Done
                    }
                    Err(ApiError::Validation(errs)) => CommandOutcome::Rejected(errs),
                    Err(e) => self.fail(e).await,
                }
            }
            Command::TestChatbot { account_id, prompt } => {
                match self.api.test_chatbot(&account_id, &prompt).await {
                    Ok(reply) => {
                        self.alert(format!("chatbot reply: {}", reply), AlertKind::Info);
                        CommandOutcome::Done
                    }
                    Err(e) => self.fail(e).await,
                }
            }
            Command::DismissNotification { id } => {
                match self.log.dismiss(&id) {
                    Ok(_removed) => self.render_unread_badge(),
                    Err(e) => warn!(error = %e, "dismiss failed"),
                }
                CommandOutcome::Done
            }
            Command::MarkAllRead => {
                if let Err(e) = self.log.mark_all_read() {
                    warn!(error = %e, "mark all read failed");
                }
                self.render_unread_badge();
                CommandOutcome::Done
            }
            Command::ClearNotifications => {
                if let Err(e) = self.log.clear() {
                    warn!(error = %e, "clearing notifications failed");
                }
                self.render_unread_badge();
                CommandOutcome::Done
            }
            Command::Logout => {
                if let Err(e) = self.api.logout().await {
                    warn!(error = %e, "logout call failed; ending session anyway");
                }
                self.end_session().await;
                CommandOutcome::Done
            }
        }
    }

    /// Shared failure path: session loss redirects, everything else
    /// alerts and re-enables the affordance.
    async fn fail(&self, e: ApiError) -> CommandOutcome {
        match e {
            ApiError::NotAuthenticated => {
                self.end_session().await;
                CommandOutcome::Failed
            }
            e => {
                let kind = if e.is_transient() { AlertKind::Warn } else { AlertKind::Error };
                self.alert(e.to_string(), kind);
                CommandOutcome::Failed
            }
        }
    }
}
