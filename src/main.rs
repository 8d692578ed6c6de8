use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use kube::Client;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use kube_alert_operator::config::load_config;
use kube_alert_operator::kubernetes::{
    ensure_cluster_reachable, forward_pod_events, KubeNamespaces, NamespaceSource, StaticNamespaces,
};
use kube_alert_operator::pause_store::{MemoryPauseStore, PauseStore, RedisPauseStore};
use kube_alert_operator::telegram::{poll_updates, ChatTransport, TelegramClient};
use kube_alert_operator::{ChatNotifier, CommandInterface, EventWatcher, PauseStoreKind};

const CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cfg = load_config()?;
    info!("excluded namespaces = {:?}", cfg.excluded_namespaces);
    if cfg.admin_user_ids.is_empty() {
        warn!("ADMIN_USER_IDS is empty, every bot command will be denied");
    }

    let client = Client::try_default().await?;
    ensure_cluster_reachable(&client).await?;

    let store: Arc<dyn PauseStore> = match cfg.pause_store {
        PauseStoreKind::Redis => {
            let store = RedisPauseStore::connect(&cfg.redis)
                .await
                .context("Failed to connect to Redis")?;
            store.ping().await.context("Redis did not answer PING")?;
            info!("connected to Redis at {}:{}", cfg.redis.host, cfg.redis.port);
            Arc::new(store)
        }
        PauseStoreKind::Memory => {
            warn!("using in-memory pause store, pauses are lost on restart");
            Arc::new(MemoryPauseStore::new())
        }
    };

    let telegram = TelegramClient::new(
        &cfg.telegram_api_url,
        &cfg.telegram_bot_token,
        Duration::from_secs(cfg.delivery_timeout_seconds),
    )?;
    let me = telegram.get_me().await.context("Failed to authenticate Telegram bot")?;
    info!("authorized as bot {}", me.username.as_deref().unwrap_or("<unnamed>"));
    let transport: Arc<dyn ChatTransport> = Arc::new(telegram.clone());

    let namespaces: Arc<dyn NamespaceSource> = if cfg.pause_menu_namespaces.is_empty() {
        Arc::new(KubeNamespaces::new(client.clone(), cfg.excluded_namespaces.clone()))
    } else {
        Arc::new(StaticNamespaces(cfg.pause_menu_namespaces.clone()))
    };

    let notifier = Arc::new(ChatNotifier::new(
        transport.clone(),
        cfg.alert_chat_id,
        Duration::from_secs(cfg.delivery_timeout_seconds),
    ));
    let watcher = EventWatcher::new(cfg.excluded_namespaces.clone(), store.clone(), notifier);
    let commands = CommandInterface::new(
        cfg.admin_user_ids.clone(),
        store,
        namespaces,
        transport,
        cfg.pause_duration,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (pod_tx, pod_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let tasks = vec![
        tokio::spawn(forward_pod_events(
            client,
            cfg.pod_field_selector.clone(),
            pod_tx,
            shutdown_rx.clone(),
        )),
        tokio::spawn({
            let shutdown = shutdown_rx.clone();
            async move { watcher.run(pod_rx, shutdown).await }
        }),
        tokio::spawn(poll_updates(
            telegram,
            cfg.poll_timeout_seconds,
            cmd_tx,
            shutdown_rx.clone(),
        )),
        tokio::spawn(async move { commands.run(cmd_rx, shutdown_rx).await }),
    ];

    wait_for_shutdown_signal().await?;
    info!("shutdown requested, draining in-flight work");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            warn!("task ended abnormally: {}", e);
        }
    }
    info!("stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res.context("Failed to listen for SIGINT")?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .try_init();
}
