use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct Config {
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub alert_chat_id: i64,
    pub admin_user_ids: HashSet<i64>,
    pub excluded_namespaces: HashSet<String>,
    pub pause_menu_namespaces: Vec<String>,
    pub pause_duration: Duration,
    pub pause_store: PauseStoreKind,
    pub redis: RedisSettings,
    pub pod_field_selector: Option<String>,
    pub poll_timeout_seconds: u64,
    pub delivery_timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseStoreKind {
    Redis,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub key_prefix: String,
    /// Bound on one round trip, including connection setup.
    pub timeout: Duration,
}

/// Coarse pod lifecycle phase as reported in `status.phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodPhase::Pending => "Pending",
            PodPhase::Running => "Running",
            PodPhase::Succeeded => "Succeeded",
            PodPhase::Failed => "Failed",
            PodPhase::Unknown => "Unknown",
        }
    }

    pub fn from_status(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => PodPhase::Pending,
            Some("Running") => PodPhase::Running,
            Some("Succeeded") => PodPhase::Succeeded,
            Some("Failed") => PodPhase::Failed,
            _ => PodPhase::Unknown,
        }
    }
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerObservation {
    pub name: String,
    pub waiting_reason: Option<String>,
    pub terminated_exit_code: Option<i32>,
}

/// Snapshot of one pod as delivered by an add/update event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodObservation {
    pub namespace: String,
    pub name: String,
    pub phase: PodPhase,
    pub containers: Vec<ContainerObservation>,
    pub observed_at: DateTime<Utc>,
}

impl PodObservation {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            phase,
            containers: Vec::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_container(mut self, container: ContainerObservation) -> Self {
        self.containers.push(container);
        self
    }

    /// `namespace/name`
    pub fn identity(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Healthy,
    Problematic { reasons: Vec<String> },
}

impl Verdict {
    pub fn is_problematic(&self) -> bool {
        matches!(self, Verdict::Problematic { .. })
    }

    pub fn reasons(&self) -> &[String] {
        match self {
            Verdict::Healthy => &[],
            Verdict::Problematic { reasons } => reasons,
        }
    }
}

/// What an operator wants done to a namespace's alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Pause,
    Resume,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Pause => "pause",
            Action::Resume => "resume",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable entry of an inline button menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub label: String,
    pub payload: String,
}

/// Operator input after decoding from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message {
        sender: i64,
        chat_id: i64,
        text: String,
    },
    Callback {
        sender: i64,
        callback_id: String,
        chat_id: Option<i64>,
        message_id: Option<i64>,
        data: String,
    },
}

impl Inbound {
    pub fn sender(&self) -> i64 {
        match self {
            Inbound::Message { sender, .. } | Inbound::Callback { sender, .. } => *sender,
        }
    }
}
