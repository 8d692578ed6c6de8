use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::telegram::ChatTransport;
use crate::types::{PodObservation, Verdict};

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best-effort delivery; failures are the notifier's to log.
    async fn notify(&self, pod: &PodObservation, verdict: &Verdict);
}

pub fn render_alert(pod: &PodObservation, verdict: &Verdict) -> String {
    let mut lines = vec![
        format!("⚠️ Problematic pod: {}", pod.identity()),
        format!("Phase: {}", pod.phase),
    ];
    // the phase already has its own line
    lines.extend(
        verdict
            .reasons()
            .iter()
            .filter(|r| r.as_str() != pod.phase.as_str())
            .map(|r| format!("• {}", r)),
    );
    lines.push(format!(
        "Observed: {}",
        pod.observed_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    ));
    lines.join("\n")
}

/// Sends alerts to one fixed chat. Each delivery gets a single attempt bounded
/// by `timeout`.
pub struct ChatNotifier {
    transport: Arc<dyn ChatTransport>,
    destination: i64,
    timeout: Duration,
}

impl ChatNotifier {
    pub fn new(transport: Arc<dyn ChatTransport>, destination: i64, timeout: Duration) -> Self {
        Self {
            transport,
            destination,
            timeout,
        }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    async fn notify(&self, pod: &PodObservation, verdict: &Verdict) {
        let text = render_alert(pod, verdict);
        let send = self.transport.send_text(self.destination, &text);
        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(())) => info!("alert sent for {}", pod.identity()),
            Ok(Err(e)) => error!("failed to deliver alert for {}: {:#}", pod.identity(), e),
            Err(_) => warn!(
                "alert delivery for {} timed out after {:?}, dropped",
                pod.identity(),
                self.timeout
            ),
        }
    }
}
