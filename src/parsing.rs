use chrono::Utc;
use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use thiserror::Error;

use crate::types::{Action, ContainerObservation, PodObservation, PodPhase};

/// Telegram rejects inline buttons whose callback data exceeds this many bytes.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("pod has no metadata.name")]
    MissingName,
    #[error("pod {0} has no metadata.namespace")]
    MissingNamespace(String),
}

/// Decode a cluster `Pod` into the observation the classifier works on.
pub fn decode_pod(pod: &Pod) -> Result<PodObservation, DecodeError> {
    let name = pod
        .metadata
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or(DecodeError::MissingName)?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| DecodeError::MissingNamespace(name.clone()))?;

    let status = pod.status.as_ref();
    let phase = PodPhase::from_status(status.and_then(|s| s.phase.as_deref()));
    let containers = status
        .and_then(|s| s.container_statuses.as_ref())
        .map(|statuses| statuses.iter().map(decode_container).collect())
        .unwrap_or_default();

    Ok(PodObservation {
        namespace,
        name,
        phase,
        containers,
        observed_at: Utc::now(),
    })
}

fn decode_container(cs: &ContainerStatus) -> ContainerObservation {
    let state = cs.state.as_ref();
    ContainerObservation {
        name: cs.name.clone(),
        waiting_reason: state
            .and_then(|s| s.waiting.as_ref())
            .and_then(|w| w.reason.clone()),
        terminated_exit_code: state
            .and_then(|s| s.terminated.as_ref())
            .map(|t| t.exit_code),
    }
}

/// Inline button payload of the form `<action>:<namespace>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub action: Action,
    pub namespace: String,
}

impl CallbackPayload {
    pub fn new(action: Action, namespace: impl Into<String>) -> Self {
        Self {
            action,
            namespace: namespace.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}:{}", self.action, self.namespace)
    }

    /// Returns `None` for anything that is not a well-formed payload.
    pub fn parse(data: &str) -> Option<Self> {
        let (action, namespace) = data.split_once(':')?;
        let action = match action {
            "pause" => Action::Pause,
            "resume" => Action::Resume,
            _ => return None,
        };
        let namespace = namespace.trim();
        if namespace.is_empty() || namespace.contains(':') {
            return None;
        }
        Some(Self::new(action, namespace))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Pause,
    Resume,
    Status,
    Help,
    Unknown(String),
}

/// Parse the leading `/command` (optionally `/command@botname`) of a message.
pub fn parse_command(text: &str) -> Option<BotCommand> {
    let first = text.trim().split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    let command = command.split('@').next().unwrap_or(command);
    Some(match command.to_ascii_lowercase().as_str() {
        "start" => BotCommand::Start,
        "pause" => BotCommand::Pause,
        "resume" => BotCommand::Resume,
        "status" => BotCommand::Status,
        "help" => BotCommand::Help,
        _ => BotCommand::Unknown(command.to_string()),
    })
}

/// Comma-separated integers; blank entries are skipped.
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>, std::num::ParseIntError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<i64>)
        .collect()
}

pub fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn parse_host_port(
    raw: &str,
    default_port: u16,
) -> Result<(String, u16), std::num::ParseIntError> {
    let raw = raw.trim();
    match raw.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), port.parse()?)),
        None => Ok((raw.to_string(), default_port)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateTerminated, ContainerStateWaiting, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn create_test_pod(namespace: Option<&str>, name: Option<&str>, phase: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: name.map(str::to_string),
                namespace: namespace.map(str::to_string),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: phase.map(str::to_string),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_pod_with_container_states() {
        let mut pod = create_test_pod(Some("billing"), Some("worker-1"), Some("Pending"));
        pod.status.as_mut().unwrap().container_statuses = Some(vec![
            ContainerStatus {
                name: "app".to_string(),
                state: Some(ContainerState {
                    waiting: Some(ContainerStateWaiting {
                        reason: Some("ImagePullBackOff".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            ContainerStatus {
                name: "sidecar".to_string(),
                state: Some(ContainerState {
                    terminated: Some(ContainerStateTerminated {
                        exit_code: 137,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]);

        let obs = decode_pod(&pod).unwrap();
        assert_eq!(obs.identity(), "billing/worker-1");
        assert_eq!(obs.phase, PodPhase::Pending);
        assert_eq!(obs.containers.len(), 2);
        assert_eq!(obs.containers[0].waiting_reason.as_deref(), Some("ImagePullBackOff"));
        assert_eq!(obs.containers[0].terminated_exit_code, None);
        assert_eq!(obs.containers[1].name, "sidecar");
        assert_eq!(obs.containers[1].terminated_exit_code, Some(137));
    }

    #[test]
    fn test_decode_pod_missing_identity() {
        let pod = create_test_pod(Some("billing"), None, Some("Failed"));
        assert_eq!(decode_pod(&pod), Err(DecodeError::MissingName));

        let pod = create_test_pod(None, Some("worker-1"), Some("Failed"));
        assert_eq!(
            decode_pod(&pod),
            Err(DecodeError::MissingNamespace("worker-1".to_string()))
        );
    }

    #[test]
    fn test_decode_pod_without_status_is_unknown_phase() {
        let mut pod = create_test_pod(Some("web"), Some("api-0"), None);
        pod.status = None;
        let obs = decode_pod(&pod).unwrap();
        assert_eq!(obs.phase, PodPhase::Unknown);
        assert!(obs.containers.is_empty());

        let pod = create_test_pod(Some("web"), Some("api-0"), Some("Evicted"));
        assert_eq!(decode_pod(&pod).unwrap().phase, PodPhase::Unknown);
    }

    #[test]
    fn test_callback_payload_parsing() {
        assert_eq!(
            CallbackPayload::parse("pause:billing"),
            Some(CallbackPayload::new(Action::Pause, "billing"))
        );
        assert_eq!(
            CallbackPayload::parse("resume:kube-public"),
            Some(CallbackPayload::new(Action::Resume, "kube-public"))
        );
        assert_eq!(CallbackPayload::new(Action::Resume, "web").encode(), "resume:web");

        for bad in ["", "pause", "pause:", "stop:billing", "billing", "pause:a:b", ":billing"] {
            assert_eq!(CallbackPayload::parse(bad), None, "payload {:?}", bad);
        }
    }

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("/start"), Some(BotCommand::Start));
        assert_eq!(parse_command("  /pause now"), Some(BotCommand::Pause));
        assert_eq!(parse_command("/resume@alert_bot"), Some(BotCommand::Resume));
        assert_eq!(parse_command("/STATUS"), Some(BotCommand::Status));
        assert_eq!(parse_command("/help"), Some(BotCommand::Help));
        assert_eq!(
            parse_command("/reboot"),
            Some(BotCommand::Unknown("reboot".to_string()))
        );
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(""), None);
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("42, 7 ,, -100").unwrap(), vec![42, 7, -100]);
        assert_eq!(parse_id_list("").unwrap(), Vec::<i64>::new());
        assert!(parse_id_list("42,abc").is_err());
    }

    #[test]
    fn test_parse_name_list_and_host_port() {
        assert_eq!(parse_name_list(" a , b ,,c,"), vec!["a", "b", "c"]);
        assert!(parse_name_list(" , ").is_empty());

        assert_eq!(parse_host_port("redis:6380", 6379).unwrap(), ("redis".to_string(), 6380));
        assert_eq!(parse_host_port("redis", 6379).unwrap(), ("redis".to_string(), 6379));
        assert!(parse_host_port("redis:x", 6379).is_err());
    }
}
