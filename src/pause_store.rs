use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::types::RedisSettings;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("redis did not answer within {0:?}")]
    Timeout(Duration),
}

/// Per-namespace alert silencing with store-enforced expiry.
#[async_trait]
pub trait PauseStore: Send + Sync {
    /// Raw lookup; an absent or expired record is `Ok(false)`.
    async fn lookup(&self, namespace: &str) -> Result<bool, StoreError>;

    /// Create or refresh a pause record expiring `duration` from now.
    async fn pause(&self, namespace: &str, duration: Duration) -> Result<(), StoreError>;

    async fn resume(&self, namespace: &str) -> Result<(), StoreError>;

    /// Namespaces with a live pause record, sorted.
    async fn paused_namespaces(&self) -> Result<Vec<String>, StoreError>;

    /// Lookup that never fails: backend errors are logged and read as "not paused"
    /// so the alert still goes out.
    async fn is_paused(&self, namespace: &str) -> bool {
        match self.lookup(namespace).await {
            Ok(paused) => paused,
            Err(e) => {
                warn!("pause lookup for {} failed, alerting anyway: {}", namespace, e);
                false
            }
        }
    }
}

/// Value stored under a paused namespace's key.
const PAUSED_VALUE: &str = "true";

/// SCAN pattern matching every key under `prefix`, with glob metacharacters
/// in the prefix escaped so they match literally.
pub fn scan_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

/// Namespace encoded in `key`, if the key belongs to `prefix`.
pub fn namespace_from_key<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|ns| !ns.is_empty())
}

/// Keep the namespaces whose scanned key currently holds the paused marker.
/// `values` lines up with `keys` (MGET order); keys that expired between SCAN
/// and MGET come back as `None`.
pub fn live_namespaces(prefix: &str, keys: &[String], values: &[Option<String>]) -> Vec<String> {
    let mut namespaces: Vec<String> = keys
        .iter()
        .zip(values)
        .filter(|(_, value)| value.as_deref() == Some(PAUSED_VALUE))
        .filter_map(|(key, _)| namespace_from_key(prefix, key))
        .map(str::to_string)
        .collect();
    namespaces.sort();
    namespaces.dedup();
    namespaces
}

async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, redis::RedisError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => Ok(res?),
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}

/// Redis-backed store. Each pause is `SET <prefix><namespace> true EX <secs>`,
/// so expiry is handled by Redis itself. Every round trip is bounded by the
/// configured timeout.
#[derive(Clone)]
pub struct RedisPauseStore {
    conn: ConnectionManager,
    prefix: String,
    timeout: Duration,
}

impl RedisPauseStore {
    pub async fn connect(settings: &RedisSettings) -> Result<Self, StoreError> {
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(settings.host.clone(), settings.port),
            redis: RedisConnectionInfo {
                password: settings.password.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info)?;
        let conn = bounded(settings.timeout, ConnectionManager::new(client)).await?;
        Ok(Self {
            conn,
            prefix: settings.key_prefix.clone(),
            timeout: settings.timeout,
        })
    }

    /// Readiness check used at startup.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: String = bounded(self.timeout, redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }

    fn key(&self, namespace: &str) -> String {
        format!("{}{}", self.prefix, namespace)
    }
}

#[async_trait]
impl PauseStore for RedisPauseStore {
    async fn lookup(&self, namespace: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let key = self.key(namespace);
        let value: Option<String> =
            bounded(self.timeout, redis::cmd("GET").arg(&key).query_async(&mut conn)).await?;
        Ok(value.as_deref() == Some(PAUSED_VALUE))
    }

    async fn pause(&self, namespace: &str, duration: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        // EX rejects zero
        let seconds = duration.as_secs().max(1);
        let key = self.key(namespace);
        let _: () = bounded(
            self.timeout,
            redis::cmd("SET")
                .arg(&key)
                .arg(PAUSED_VALUE)
                .arg("EX")
                .arg(seconds)
                .query_async(&mut conn),
        )
        .await?;
        debug!("paused {} for {}s", namespace, seconds);
        Ok(())
    }

    async fn resume(&self, namespace: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let key = self.key(namespace);
        let removed: i64 =
            bounded(self.timeout, redis::cmd("DEL").arg(&key).query_async(&mut conn)).await?;
        debug!("resumed {} (removed {} key)", namespace, removed);
        Ok(())
    }

    async fn paused_namespaces(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let pattern = scan_pattern(&self.prefix);
        let mut cursor: u64 = 0;
        let mut keys: Vec<String> = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = bounded(
                self.timeout,
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(100)
                    .query_async(&mut conn),
            )
            .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let values: Vec<Option<String>> =
            bounded(self.timeout, redis::cmd("MGET").arg(&keys).query_async(&mut conn)).await?;
        Ok(live_namespaces(&self.prefix, &keys, &values))
    }
}

/// In-process store for single-replica deployments and tests. Deadlines use
/// tokio's clock, so a paused test runtime can drive expiry.
#[derive(Debug, Default)]
pub struct MemoryPauseStore {
    deadlines: Mutex<HashMap<String, Instant>>,
}

impl MemoryPauseStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PauseStore for MemoryPauseStore {
    async fn lookup(&self, namespace: &str) -> Result<bool, StoreError> {
        let mut deadlines = self.deadlines.lock().await;
        match deadlines.get(namespace) {
            Some(deadline) if *deadline > Instant::now() => Ok(true),
            Some(_) => {
                deadlines.remove(namespace);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn pause(&self, namespace: &str, duration: Duration) -> Result<(), StoreError> {
        self.deadlines
            .lock()
            .await
            .insert(namespace.to_string(), Instant::now() + duration);
        Ok(())
    }

    async fn resume(&self, namespace: &str) -> Result<(), StoreError> {
        self.deadlines.lock().await.remove(namespace);
        Ok(())
    }

    async fn paused_namespaces(&self) -> Result<Vec<String>, StoreError> {
        let mut deadlines = self.deadlines.lock().await;
        let now = Instant::now();
        deadlines.retain(|_, deadline| *deadline > now);
        let mut namespaces: Vec<String> = deadlines.keys().cloned().collect();
        namespaces.sort();
        Ok(namespaces)
    }
}
