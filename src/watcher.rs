use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::classifier::classify;
use crate::notifier::Notifier;
use crate::pause_store::PauseStore;
use crate::types::{PodObservation, Verdict};

/// What happened to one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Excluded,
    Paused,
    Healthy,
    Notified,
}

/// Filters pod observations by exclusion and pause state, classifies the rest
/// and hands problematic ones to the notifier. Holds no per-pod state, so
/// repeated or resynced events are handled exactly like fresh ones.
pub struct EventWatcher {
    excluded: HashSet<String>,
    store: Arc<dyn PauseStore>,
    notifier: Arc<dyn Notifier>,
}

impl EventWatcher {
    pub fn new(
        excluded: HashSet<String>,
        store: Arc<dyn PauseStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            excluded,
            store,
            notifier,
        }
    }

    pub async fn handle(&self, pod: &PodObservation) -> EventOutcome {
        if self.excluded.contains(&pod.namespace) {
            return EventOutcome::Excluded;
        }
        if self.store.is_paused(&pod.namespace).await {
            debug!("alerts for {} are paused, skipping {}", pod.namespace, pod.name);
            return EventOutcome::Paused;
        }
        match classify(pod) {
            Verdict::Healthy => EventOutcome::Healthy,
            verdict => {
                self.notifier.notify(pod, &verdict).await;
                EventOutcome::Notified
            }
        }
    }

    /// Process observations one at a time, in delivery order, until the
    /// channel closes or shutdown is signalled.
    pub async fn run(&self, mut events: mpsc::Receiver<PodObservation>, mut shutdown: watch::Receiver<bool>) {
        info!("event watcher started");
        loop {
            let pod = tokio::select! {
                _ = shutdown.changed() => break,
                pod = events.recv() => match pod {
                    Some(pod) => pod,
                    None => break,
                },
            };
            self.handle(&pod).await;
        }
        info!("event watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pause_store::MemoryPauseStore;
    use crate::types::{ContainerObservation, PodPhase};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<(String, Vec<String>)>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, pod: &PodObservation, verdict: &Verdict) {
            self.seen
                .lock()
                .await
                .push((pod.identity(), verdict.reasons().to_vec()));
        }
    }

    fn setup() -> (EventWatcher, Arc<MemoryPauseStore>, Arc<RecordingNotifier>) {
        let store = Arc::new(MemoryPauseStore::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let excluded = HashSet::from(["kube-system".to_string()]);
        let watcher = EventWatcher::new(excluded, store.clone(), notifier.clone());
        (watcher, store, notifier)
    }

    #[tokio::test]
    async fn test_excluded_namespace_is_dropped() {
        let (watcher, _, notifier) = setup();
        let pod = PodObservation::new("kube-system", "coredns", PodPhase::Failed);
        assert_eq!(watcher.handle(&pod).await, EventOutcome::Excluded);
        assert!(notifier.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_paused_namespace_never_reaches_notifier() {
        let (watcher, store, notifier) = setup();
        store.pause("billing", Duration::from_secs(60)).await.unwrap();

        let pod = PodObservation::new("billing", "worker-1", PodPhase::Failed);
        assert_eq!(watcher.handle(&pod).await, EventOutcome::Paused);
        assert!(notifier.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_healthy_pod_is_not_reported() {
        let (watcher, _, notifier) = setup();
        // phase filter upstream is not trusted, running pods still get classified
        let pod = PodObservation::new("web", "api-0", PodPhase::Running);
        assert_eq!(watcher.handle(&pod).await, EventOutcome::Healthy);
        assert!(notifier.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_events_notify_each_time() {
        let (watcher, _, notifier) = setup();
        let pod = PodObservation::new("web", "api-0", PodPhase::Running).with_container(
            ContainerObservation {
                name: "api".into(),
                waiting_reason: Some("CrashLoopBackOff".into()),
                terminated_exit_code: None,
            },
        );
        assert_eq!(watcher.handle(&pod).await, EventOutcome::Notified);
        assert_eq!(watcher.handle(&pod).await, EventOutcome::Notified);

        let seen = notifier.seen.lock().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, vec!["api: CrashLoopBackOff".to_string()]);
    }

    #[tokio::test]
    async fn test_run_drains_channel_in_order_and_stops() {
        let (watcher, _, notifier) = setup();
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        tx.send(PodObservation::new("a", "p1", PodPhase::Failed)).await.unwrap();
        tx.send(PodObservation::new("kube-system", "p2", PodPhase::Failed)).await.unwrap();
        tx.send(PodObservation::new("b", "p3", PodPhase::Pending)).await.unwrap();
        drop(tx);

        watcher.run(rx, shutdown_rx).await;

        let seen = notifier.seen.lock().await;
        let ids: Vec<&str> = seen.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a/p1", "b/p3"]);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (watcher, _, _) = setup();
        let (_tx, rx) = mpsc::channel::<PodObservation>(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), watcher.run(rx, shutdown_rx))
            .await
            .unwrap();
    }
}
