use anyhow::{anyhow, Context, Result};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::parsing::{parse_host_port, parse_id_list, parse_name_list};
use crate::types::{Config, PauseStoreKind, RedisSettings};

pub const DEFAULT_EXCLUDED_NAMESPACES: &str = "kube-system,kube-public";
pub const DEFAULT_FIELD_SELECTOR: &str = "status.phase!=Running,status.phase!=Succeeded";
const DEFAULT_REDIS_PORT: u16 = 6379;

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

pub fn load_config() -> Result<Config> {
    load_config_with_env(&SystemEnvironment)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let telegram_bot_token = env
        .get_var("TELEGRAM_BOT_TOKEN")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow!("TELEGRAM_BOT_TOKEN must be provided via Secret env"))?;

    let telegram_api_url = env
        .get_var("TELEGRAM_API_URL")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "https://api.telegram.org".to_string())
        .trim_end_matches('/')
        .to_string();

    let alert_chat_id: i64 = env
        .get_var("TELEGRAM_CHAT_ID")
        .ok_or_else(|| anyhow!("TELEGRAM_CHAT_ID env var must be set"))?
        .trim()
        .parse()
        .context("Invalid TELEGRAM_CHAT_ID")?;

    let admin_user_ids: HashSet<i64> =
        parse_id_list(&env.get_var("ADMIN_USER_IDS").unwrap_or_default())
            .context("Invalid ADMIN_USER_IDS")?
            .into_iter()
            .collect();

    let excluded_namespaces: HashSet<String> = parse_name_list(
        &env.get_var("EXCLUDED_NAMESPACES")
            .unwrap_or_else(|| DEFAULT_EXCLUDED_NAMESPACES.to_string()),
    )
    .into_iter()
    .collect();

    // Only feeds the /pause menu; alerting always covers every non-excluded namespace.
    let pause_menu_namespaces: Vec<String> =
        parse_name_list(&env.get_var("PAUSE_MENU_NAMESPACES").unwrap_or_default())
            .into_iter()
            .filter(|ns| !excluded_namespaces.contains(ns))
            .collect();

    let pause_minutes: u64 = env
        .get_var("PAUSE_DURATION_MINUTES")
        .unwrap_or_else(|| "60".to_string())
        .trim()
        .parse()
        .context("Invalid PAUSE_DURATION_MINUTES")?;
    if pause_minutes == 0 {
        return Err(anyhow!("PAUSE_DURATION_MINUTES must be greater than zero"));
    }

    let pause_store = match env
        .get_var("PAUSE_STORE")
        .unwrap_or_else(|| "redis".to_string())
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "redis" | "" => PauseStoreKind::Redis,
        "memory" => PauseStoreKind::Memory,
        other => return Err(anyhow!("Invalid PAUSE_STORE '{}' (expected redis or memory)", other)),
    };

    let (host, port) = parse_host_port(
        &env.get_var("REDIS_HOST")
            .unwrap_or_else(|| "redis-service:6379".to_string()),
        DEFAULT_REDIS_PORT,
    )
    .context("Invalid REDIS_HOST")?;

    let key_prefix = env
        .get_var("REDIS_KEY_PREFIX")
        .unwrap_or_else(|| "pause:".to_string());
    if key_prefix.trim().is_empty() {
        return Err(anyhow!("REDIS_KEY_PREFIX must not be empty"));
    }

    let redis_timeout_seconds: u64 = env
        .get_var("REDIS_TIMEOUT_SECONDS")
        .unwrap_or_else(|| "2".to_string())
        .trim()
        .parse()
        .context("Invalid REDIS_TIMEOUT_SECONDS")?;
    if redis_timeout_seconds == 0 {
        return Err(anyhow!("REDIS_TIMEOUT_SECONDS must be greater than zero"));
    }

    let redis = RedisSettings {
        host,
        port,
        password: env.get_var("REDIS_PASSWORD").filter(|p| !p.is_empty()),
        key_prefix,
        timeout: Duration::from_secs(redis_timeout_seconds),
    };

    let pod_field_selector = match env.get_var("POD_FIELD_SELECTOR") {
        Some(v) if v.trim().is_empty() => None,
        Some(v) => Some(v.trim().to_string()),
        None => Some(DEFAULT_FIELD_SELECTOR.to_string()),
    };

    let poll_timeout_seconds: u64 = env
        .get_var("POLL_TIMEOUT_SECONDS")
        .unwrap_or_else(|| "60".to_string())
        .trim()
        .parse()
        .context("Invalid POLL_TIMEOUT_SECONDS")?;

    let delivery_timeout_seconds: u64 = env
        .get_var("DELIVERY_TIMEOUT_SECONDS")
        .unwrap_or_else(|| "10".to_string())
        .trim()
        .parse()
        .context("Invalid DELIVERY_TIMEOUT_SECONDS")?;

    Ok(Config {
        telegram_bot_token,
        telegram_api_url,
        alert_chat_id,
        admin_user_ids,
        excluded_namespaces,
        pause_menu_namespaces,
        pause_duration: Duration::from_secs(pause_minutes * 60),
        pause_store,
        redis,
        pod_field_selector,
        poll_timeout_seconds,
        delivery_timeout_seconds,
    })
}
