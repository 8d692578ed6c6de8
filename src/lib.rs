// Public modules
pub mod types;
pub mod config;
pub mod parsing;
pub mod classifier;
pub mod pause_store;
pub mod telegram;
pub mod notifier;
pub mod kubernetes;
pub mod watcher;
pub mod commands;

// Re-export commonly used items
pub use types::*;
pub use config::{load_config, load_config_with_env, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use parsing::{decode_pod, CallbackPayload, DecodeError};
pub use classifier::classify;
pub use pause_store::{MemoryPauseStore, PauseStore, RedisPauseStore, StoreError};
pub use telegram::{ChatTransport, TelegramClient, TelegramError};
pub use notifier::{render_alert, ChatNotifier, Notifier};
pub use kubernetes::{ensure_cluster_reachable, KubeNamespaces, NamespaceSource, StaticNamespaces};
pub use watcher::{EventOutcome, EventWatcher};
pub use commands::{CommandInterface, CommandOutcome, SessionState};
