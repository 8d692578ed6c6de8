use crate::types::{PodObservation, PodPhase, Verdict};

/// Container waiting reasons that mean the container cannot make progress on its own.
pub const CRITICAL_WAITING_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "InvalidImageName",
    "CreateContainerConfigError",
    "CreateContainerError",
    "RunContainerError",
];

pub fn is_critical_reason(reason: &str) -> bool {
    CRITICAL_WAITING_REASONS.contains(&reason)
}

/// Classify a pod snapshot. Every rule that fires contributes a reason.
pub fn classify(pod: &PodObservation) -> Verdict {
    let mut reasons = Vec::new();

    if !matches!(pod.phase, PodPhase::Running | PodPhase::Succeeded) {
        reasons.push(pod.phase.to_string());
    }

    for container in &pod.containers {
        if let Some(reason) = container.waiting_reason.as_deref() {
            if is_critical_reason(reason) {
                reasons.push(format!("{}: {}", container.name, reason));
            }
        }
        if let Some(code) = container.terminated_exit_code {
            if code != 0 {
                reasons.push(format!("{}: exit {}", container.name, code));
            }
        }
    }

    if reasons.is_empty() {
        Verdict::Healthy
    } else {
        Verdict::Problematic { reasons }
    }
}
