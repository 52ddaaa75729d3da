//! Rich wait errors with debugging context
//!
//! When a wait runs out of time, [`WaitError`] names what was waited for and
//! the last state that was observed.
//!
//! # Example
//!
//! ```ignore
//! match engine.wait_for_resources(&cancel, &kind, "ledger", &check, timeout, &opts).await {
//!     Err(EngineError::WaitTimeout(err)) => {
//!         println!("Resource: {}", err.resource);
//!         println!("Last state: {}", err.last_state);
//!         println!("Elapsed: {:?}", err.elapsed);
//!     }
//!     _ => {}
//! }
//! ```

use std::fmt;
use std::time::Duration;

use k8s_openapi::api::apps::v1::{DaemonSetStatus, DeploymentStatus, StatefulSetStatus};
use k8s_openapi::api::batch::v1::JobStatus;
use k8s_openapi::api::core::v1::PodStatus;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::ApiError;
use crate::document::{ResourceDocument, ResourceList};

/// Error context for a wait that hit its deadline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitError {
    /// What was waited for (e.g. "Pod ledger [labels=app=relay]")
    pub resource: String,
    /// Description of the last observed state
    pub last_state: String,
    /// How long we waited before giving up
    pub elapsed: Duration,
    /// The timeout that was configured
    pub timeout: Duration,
}

impl WaitError {
    pub fn new(resource: impl Into<String>, timeout: Duration, elapsed: Duration) -> Self {
        Self {
            resource: resource.into(),
            last_state: "never observed".to_string(),
            elapsed,
            timeout,
        }
    }

    /// Set the last observed state
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.last_state = state.into();
        self
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "wait timeout for {}", self.resource)?;
        writeln!(f, "├─ Last state: {}", self.last_state)?;
        writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
        write!(f, "└─ Timeout: {:?}", self.timeout)
    }
}

impl std::error::Error for WaitError {}

/// Human-readable state of a single resource
///
/// Workload kinds get a replica or container summary read through the typed
/// status structs; anything else falls back to phase or conditions.
#[must_use]
pub fn describe_state(doc: &ResourceDocument) -> String {
    let status = doc.pointer("/status").cloned().unwrap_or(Value::Null);
    let spec_replicas = doc
        .pointer("/spec/replicas")
        .and_then(Value::as_i64)
        .unwrap_or(1);

    let described = match doc.kind() {
        Some("Deployment") => decode::<DeploymentStatus>(status).map(|s| {
            let ready = s.ready_replicas.unwrap_or(0);
            let available = s.available_replicas.unwrap_or(0);
            match s.unavailable_replicas.unwrap_or(0) {
                0 => format!(
                    "{ready}/{spec_replicas} ready, {available}/{spec_replicas} available"
                ),
                unavailable => format!("{ready}/{spec_replicas} ready, {unavailable} unavailable"),
            }
        }),
        Some("StatefulSet") => decode::<StatefulSetStatus>(status).map(|s| {
            let ready = s.ready_replicas.unwrap_or(0);
            let current = s.current_replicas.unwrap_or(0);
            format!("{ready}/{spec_replicas} ready, {current}/{spec_replicas} current")
        }),
        Some("DaemonSet") => decode::<DaemonSetStatus>(status).map(|s| {
            let desired = s.desired_number_scheduled;
            let available = s.number_available.unwrap_or(0);
            format!(
                "{}/{desired} ready, {available}/{desired} available",
                s.number_ready
            )
        }),
        Some("Job") => decode::<JobStatus>(status).map(|s| {
            format!(
                "active={}, succeeded={}, failed={}",
                s.active.unwrap_or(0),
                s.succeeded.unwrap_or(0),
                s.failed.unwrap_or(0)
            )
        }),
        Some("Pod") => decode::<PodStatus>(status).map(|s| pod_state(&s)),
        _ => None,
    };

    described.unwrap_or_else(|| generic_state(doc))
}

/// Summary of a listing, naming the items that were not ready
#[must_use]
pub fn describe_list(list: &ResourceList, not_ready: &[&ResourceDocument]) -> String {
    if list.is_empty() {
        return "no matching resources".to_string();
    }

    let pending = not_ready
        .iter()
        .map(|doc| {
            format!(
                "{} ({})",
                doc.name().unwrap_or("<unnamed>"),
                describe_state(doc)
            )
        })
        .collect::<Vec<_>>();

    format!(
        "{}/{} ready; waiting on {}",
        list.len() - not_ready.len(),
        list.len(),
        pending.join(", ")
    )
}

/// State line for a single-resource lookup
#[must_use]
pub fn describe_lookup(doc: Option<&ResourceDocument>, err: Option<&ApiError>) -> String {
    match (doc, err) {
        (_, Some(err)) if err.is_not_found() => "not found".to_string(),
        (_, Some(err)) => format!("lookup failed: {err}"),
        (Some(doc), None) => describe_state(doc),
        (None, None) => "no object".to_string(),
    }
}

fn decode<T: DeserializeOwned>(status: Value) -> Option<T> {
    if status.is_null() {
        return None;
    }
    serde_json::from_value(status).ok()
}

fn pod_state(status: &PodStatus) -> String {
    let phase = status.phase.as_deref().unwrap_or("Unknown");

    let Some(statuses) = status.container_statuses.as_ref() else {
        return format!("phase={phase}, no container status");
    };

    let total = statuses.len();
    let ready = statuses.iter().filter(|c| c.ready).count();
    let waiting_reasons = statuses
        .iter()
        .filter_map(|c| {
            c.state
                .as_ref()
                .and_then(|s| s.waiting.as_ref())
                .and_then(|w| w.reason.as_deref())
        })
        .collect::<Vec<_>>();

    if waiting_reasons.is_empty() {
        format!("phase={phase}, containers {ready}/{total} ready")
    } else {
        format!(
            "phase={phase}, containers {ready}/{total} ready, waiting: {}",
            waiting_reasons.join(", ")
        )
    }
}

fn generic_state(doc: &ResourceDocument) -> String {
    if let Some(phase) = doc.str_at("/status/phase") {
        return format!("phase={phase}");
    }

    let conditions = doc
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .map(|conditions| {
            conditions
                .iter()
                .filter_map(|c| {
                    let kind = c.get("type")?.as_str()?;
                    let status = c.get("status")?.as_str()?;
                    Some(format!("{kind}={status}"))
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    if conditions.is_empty() {
        "present, no status".to_string()
    } else {
        conditions.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wait_error_display() {
        let err = WaitError::new(
            "Deployment ledger/relay",
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
        .with_state("0/3 ready, 3 unavailable");

        let output = err.to_string();
        assert!(output.contains("Deployment ledger/relay"));
        assert!(output.contains("0/3 ready"));
        assert!(output.contains("60s"));
    }

    #[test]
    fn test_wait_error_builder() {
        let err = WaitError::new("Pod ledger", Duration::from_secs(120), Duration::from_secs(115));

        assert_eq!(err.resource, "Pod ledger");
        assert_eq!(err.timeout, Duration::from_secs(120));
        assert_eq!(err.elapsed, Duration::from_secs(115));
        assert_eq!(err.last_state, "never observed");
    }

    #[test]
    fn test_deployment_state_description() {
        let doc = ResourceDocument::new(json!({
            "kind": "Deployment",
            "metadata": { "name": "relay" },
            "spec": { "replicas": 3 },
            "status": { "readyReplicas": 1, "availableReplicas": 1, "unavailableReplicas": 2 }
        }));

        let state = describe_state(&doc);
        assert!(state.contains("1/3 ready"));
        assert!(state.contains("2 unavailable"));
    }

    #[test]
    fn test_pod_state_description() {
        let doc = ResourceDocument::new(json!({
            "kind": "Pod",
            "metadata": { "name": "relay-0" },
            "status": {
                "phase": "Pending",
                "containerStatuses": [{
                    "name": "main",
                    "image": "relay:0.1",
                    "imageID": "",
                    "ready": false,
                    "restartCount": 0,
                    "state": { "waiting": { "reason": "ImagePullBackOff" } }
                }]
            }
        }));

        let state = describe_state(&doc);
        assert!(state.contains("phase=Pending"));
        assert!(state.contains("0/1 ready"));
        assert!(state.contains("ImagePullBackOff"));
    }

    #[test]
    fn test_generic_state_uses_conditions() {
        let doc = ResourceDocument::new(json!({
            "kind": "CustomResourceDefinition",
            "metadata": { "name": "widgets.example.com" },
            "status": { "conditions": [
                { "type": "NamesAccepted", "status": "True" },
                { "type": "Established", "status": "False" }
            ]}
        }));

        assert_eq!(describe_state(&doc), "NamesAccepted=True, Established=False");
    }

    #[test]
    fn test_missing_status() {
        let doc =
            ResourceDocument::new(json!({ "kind": "Deployment", "metadata": { "name": "x" } }));
        assert_eq!(describe_state(&doc), "present, no status");
    }

    #[test]
    fn test_describe_list() {
        let ready = ResourceDocument::new(json!({
            "kind": "Pod", "metadata": { "name": "a" }, "status": { "phase": "Running" }
        }));
        let pending = ResourceDocument::new(json!({
            "kind": "Pod", "metadata": { "name": "b" }, "status": { "phase": "Pending" }
        }));
        let list = ResourceList {
            items: vec![ready, pending.clone()],
            ..Default::default()
        };

        let state = describe_list(&list, &[&pending]);
        assert!(state.starts_with("1/2 ready"));
        assert!(state.contains("b (phase=Pending"));

        assert_eq!(describe_list(&ResourceList::default(), &[]), "no matching resources");
    }

    #[test]
    fn test_describe_lookup() {
        assert_eq!(describe_lookup(None, Some(&ApiError::not_found("gone"))), "not found");
        assert!(describe_lookup(None, Some(&ApiError::internal("etcd"))).contains("etcd"));
    }
}
