use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::kubernetes::NamespaceSource;
use crate::parsing::{parse_command, BotCommand, CallbackPayload, MAX_CALLBACK_DATA_BYTES};
use crate::pause_store::PauseStore;
use crate::telegram::ChatTransport;
use crate::types::{Action, Inbound, MenuOption};

pub const ACCESS_DENIED: &str = "⛔ Access denied";
pub const GREETING: &str = "🚀 K8s monitoring bot is active!";
pub const HELP: &str = "/pause - silence alerts for a namespace\n\
/resume - re-enable alerts for a paused namespace\n\
/status - list paused namespaces";

/// Where an operator conversation stands after one input. The menu itself
/// carries the pending action, so nothing is kept between messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingNamespaceSelection(Action),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Denied,
    Greeted,
    Help,
    Status(Vec<String>),
    MenuShown { action: Action, namespaces: Vec<String> },
    NothingToSelect(Action),
    Applied { action: Action, namespace: String },
    Failed,
    Ignored,
}

impl CommandOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            CommandOutcome::MenuShown { action, .. } => SessionState::AwaitingNamespaceSelection(*action),
            _ => SessionState::Idle,
        }
    }
}

/// Operator command handling: authorization, namespace menus and pause
/// store mutation.
pub struct CommandInterface {
    allowed: HashSet<i64>,
    store: Arc<dyn PauseStore>,
    namespaces: Arc<dyn NamespaceSource>,
    transport: Arc<dyn ChatTransport>,
    pause_duration: Duration,
}

impl CommandInterface {
    pub fn new(
        allowed: HashSet<i64>,
        store: Arc<dyn PauseStore>,
        namespaces: Arc<dyn NamespaceSource>,
        transport: Arc<dyn ChatTransport>,
        pause_duration: Duration,
    ) -> Self {
        Self {
            allowed,
            store,
            namespaces,
            transport,
            pause_duration,
        }
    }

    pub fn is_authorized(&self, sender: i64) -> bool {
        self.allowed.contains(&sender)
    }

    pub async fn handle(&self, inbound: Inbound) -> CommandOutcome {
        if !self.is_authorized(inbound.sender()) {
            info!("rejecting input from unauthorized sender {}", inbound.sender());
            match &inbound {
                Inbound::Message { chat_id, .. } => self.reply(*chat_id, ACCESS_DENIED).await,
                Inbound::Callback { callback_id, .. } => self.ack(callback_id, Some(ACCESS_DENIED)).await,
            }
            return CommandOutcome::Denied;
        }

        match inbound {
            Inbound::Message { chat_id, text, .. } => self.handle_message(chat_id, &text).await,
            Inbound::Callback {
                callback_id,
                chat_id,
                message_id,
                data,
                ..
            } => self.handle_callback(&callback_id, chat_id, message_id, &data).await,
        }
    }

    async fn handle_message(&self, chat_id: i64, text: &str) -> CommandOutcome {
        match parse_command(text) {
            Some(BotCommand::Start) => {
                self.reply(chat_id, GREETING).await;
                CommandOutcome::Greeted
            }
            Some(BotCommand::Help) => {
                self.reply(chat_id, HELP).await;
                CommandOutcome::Help
            }
            Some(BotCommand::Pause) => match self.namespaces.namespaces().await {
                Ok(namespaces) => self.show_menu(chat_id, Action::Pause, namespaces).await,
                Err(e) => {
                    error!("failed to list namespaces: {:#}", e);
                    self.reply(chat_id, "❌ Could not list namespaces, try again later.").await;
                    CommandOutcome::Failed
                }
            },
            Some(BotCommand::Resume) => match self.store.paused_namespaces().await {
                Ok(paused) => self.show_menu(chat_id, Action::Resume, paused).await,
                Err(e) => {
                    error!("failed to list paused namespaces: {}", e);
                    self.reply(chat_id, "❌ Could not read pause state, try again later.").await;
                    CommandOutcome::Failed
                }
            },
            Some(BotCommand::Status) => match self.store.paused_namespaces().await {
                Ok(paused) => {
                    let text = if paused.is_empty() {
                        "🔔 All namespaces are alerting.".to_string()
                    } else {
                        format!("🔇 Paused namespaces:\n{}", paused.join("\n"))
                    };
                    self.reply(chat_id, &text).await;
                    CommandOutcome::Status(paused)
                }
                Err(e) => {
                    error!("failed to list paused namespaces: {}", e);
                    self.reply(chat_id, "❌ Could not read pause state, try again later.").await;
                    CommandOutcome::Failed
                }
            },
            Some(BotCommand::Unknown(cmd)) => {
                debug!("ignoring unknown command /{}", cmd);
                CommandOutcome::Ignored
            }
            None => CommandOutcome::Ignored,
        }
    }

    async fn show_menu(&self, chat_id: i64, action: Action, namespaces: Vec<String>) -> CommandOutcome {
        let options: Vec<MenuOption> = namespaces
            .iter()
            .filter_map(|ns| {
                let payload = CallbackPayload::new(action, ns.as_str()).encode();
                if payload.len() > MAX_CALLBACK_DATA_BYTES {
                    warn!("namespace {} is too long for a menu button, leaving it out", ns);
                    return None;
                }
                Some(MenuOption {
                    label: ns.clone(),
                    payload,
                })
            })
            .collect();

        if options.is_empty() {
            let text = match action {
                Action::Pause => "No namespaces available.",
                Action::Resume => "No paused namespaces.",
            };
            self.reply(chat_id, text).await;
            return CommandOutcome::NothingToSelect(action);
        }

        let prompt = match action {
            Action::Pause => "Select namespace to pause alerts:",
            Action::Resume => "Select namespace to resume alerts:",
        };
        if let Err(e) = self.transport.send_menu(chat_id, prompt, &options).await {
            error!("failed to send {} menu: {:#}", action, e);
        }
        CommandOutcome::MenuShown {
            action,
            namespaces: options.into_iter().map(|o| o.label).collect(),
        }
    }

    async fn handle_callback(
        &self,
        callback_id: &str,
        chat_id: Option<i64>,
        message_id: Option<i64>,
        data: &str,
    ) -> CommandOutcome {
        let Some(payload) = CallbackPayload::parse(data) else {
            debug!("ignoring malformed callback payload {:?}", data);
            self.ack(callback_id, None).await;
            return CommandOutcome::Ignored;
        };

        let result = match payload.action {
            Action::Pause => self.store.pause(&payload.namespace, self.pause_duration).await,
            Action::Resume => self.store.resume(&payload.namespace).await,
        };

        let text = match &result {
            Ok(()) => {
                info!("{} applied to namespace {}", payload.action, payload.namespace);
                match payload.action {
                    Action::Pause => format!(
                        "🔇 Alerts for {} paused for {} minutes.",
                        payload.namespace,
                        self.pause_duration.as_secs() / 60
                    ),
                    Action::Resume => format!("🔔 Alerts for {} resumed.", payload.namespace),
                }
            }
            Err(e) => {
                error!("failed to {} namespace {}: {}", payload.action, payload.namespace, e);
                format!("❌ Failed to {} {}, try again later.", payload.action, payload.namespace)
            }
        };

        self.ack(callback_id, None).await;
        match (chat_id, message_id) {
            (Some(chat_id), Some(message_id)) => {
                if let Err(e) = self.transport.edit_text(chat_id, message_id, &text).await {
                    warn!("failed to edit menu message, sending a new one: {:#}", e);
                    self.reply(chat_id, &text).await;
                }
            }
            (Some(chat_id), None) => self.reply(chat_id, &text).await,
            _ => {}
        }

        match result {
            Ok(()) => CommandOutcome::Applied {
                action: payload.action,
                namespace: payload.namespace,
            },
            Err(_) => CommandOutcome::Failed,
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            error!("failed to reply to chat {}: {:#}", chat_id, e);
        }
    }

    async fn ack(&self, callback_id: &str, text: Option<&str>) {
        if let Err(e) = self.transport.acknowledge(callback_id, text).await {
            warn!("failed to answer callback {}: {:#}", callback_id, e);
        }
    }

    /// Consume operator input one item at a time until the channel closes or
    /// shutdown is signalled.
    pub async fn run(&self, mut inbound: mpsc::Receiver<Inbound>, mut shutdown: watch::Receiver<bool>) {
        info!("command interface started");
        loop {
            let next = tokio::select! {
                _ = shutdown.changed() => break,
                next = inbound.recv() => match next {
                    Some(next) => next,
                    None => break,
                },
            };
            let outcome = self.handle(next).await;
            debug!("command outcome: {:?}", outcome);
        }
        info!("command interface stopped");
    }
}
