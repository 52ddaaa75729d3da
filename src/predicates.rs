//! Readiness predicates
//!
//! A [`ReadinessCheck`] decides, from one lookup result, whether a resource
//! has reached the wanted state. The wait engine hands it the raw
//! `(document, lookup error)` pair on every tick and knows nothing about
//! kinds, so new checks never need engine changes.
//!
//! Every built-in check starts from the same presence rule: a not-found
//! lookup means "not ready yet", any other lookup error is returned as
//! [`CheckError::Lookup`] and ends the wait.
//!
//! # Example
//!
//! ```
//! use weaver::predicates::{self, ReadinessCheck, ReadinessCheckExt};
//! use weaver::ResourceDocument;
//! use serde_json::json;
//!
//! let pod = ResourceDocument::new(json!({
//!     "kind": "Pod",
//!     "metadata": { "name": "relay-0" },
//!     "status": {
//!         "phase": "Running",
//!         "conditions": [{ "type": "Ready", "status": "True" }],
//!         "containerStatuses": [{ "name": "relay", "ready": true }]
//!     }
//! }));
//!
//! let check = predicates::pod_ready.and(predicates::container_ready("relay"));
//! assert!(check.evaluate(Some(&pod), None).unwrap());
//! ```

use serde_json::Value;

use crate::client::ApiError;
use crate::document::ResourceDocument;
use crate::phase::Phase;

/// Why a check ended a wait
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    /// A lookup error the check refused to absorb
    #[error("lookup failed: {0}")]
    Lookup(#[from] ApiError),

    /// The resource reached a state it cannot recover from
    #[error("{0}")]
    Failed(String),
}

/// Decides whether an observed resource is in the wanted state
///
/// `Ok(false)` keeps the wait polling; any `Err` aborts it.
pub trait ReadinessCheck: Send + Sync {
    fn evaluate(
        &self,
        doc: Option<&ResourceDocument>,
        err: Option<&ApiError>,
    ) -> Result<bool, CheckError>;
}

impl<F> ReadinessCheck for F
where
    F: Fn(Option<&ResourceDocument>, Option<&ApiError>) -> Result<bool, CheckError> + Send + Sync,
{
    fn evaluate(
        &self,
        doc: Option<&ResourceDocument>,
        err: Option<&ApiError>,
    ) -> Result<bool, CheckError> {
        self(doc, err)
    }
}

/// Wrap a closure as a check
///
/// Passing the closure through here pins its argument lifetimes, which
/// plain inference against the blanket impl does not.
pub fn from_fn<F>(f: F) -> impl ReadinessCheck
where
    F: Fn(Option<&ResourceDocument>, Option<&ApiError>) -> Result<bool, CheckError> + Send + Sync,
{
    f
}

/// Combinators for checks
pub trait ReadinessCheckExt: ReadinessCheck + Sized {
    /// Ready when both checks are; `self` is evaluated first
    fn and<O: ReadinessCheck>(self, other: O) -> And<Self, O> {
        And(self, other)
    }
}

impl<T: ReadinessCheck> ReadinessCheckExt for T {}

/// See [`ReadinessCheckExt::and`]
#[derive(Debug, Clone)]
pub struct And<A, B>(A, B);

impl<A: ReadinessCheck, B: ReadinessCheck> ReadinessCheck for And<A, B> {
    fn evaluate(
        &self,
        doc: Option<&ResourceDocument>,
        err: Option<&ApiError>,
    ) -> Result<bool, CheckError> {
        Ok(self.0.evaluate(doc, err)? && self.1.evaluate(doc, err)?)
    }
}

/// Ready when every check is; stops at the first not-ready or error
pub struct AllOf(Vec<Box<dyn ReadinessCheck>>);

impl ReadinessCheck for AllOf {
    fn evaluate(
        &self,
        doc: Option<&ResourceDocument>,
        err: Option<&ApiError>,
    ) -> Result<bool, CheckError> {
        for check in &self.0 {
            if !check.evaluate(doc, err)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[must_use]
pub fn all_of(checks: Vec<Box<dyn ReadinessCheck>>) -> AllOf {
    AllOf(checks)
}

/// Presence rule shared by every check
///
/// `Ok(None)` means "not there yet".
pub fn present<'a>(
    doc: Option<&'a ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<Option<&'a ResourceDocument>, CheckError> {
    match err {
        Some(err) if err.is_not_found() => Ok(None),
        Some(err) => Err(CheckError::Lookup(err.clone())),
        None => Ok(doc),
    }
}

/// `status` of the condition of type `kind`
fn condition_status<'a>(doc: &'a ResourceDocument, kind: &str) -> Option<&'a str> {
    condition(doc, kind)
        .and_then(|c| c.get("status"))
        .and_then(Value::as_str)
}

fn condition<'a>(doc: &'a ResourceDocument, kind: &str) -> Option<&'a Value> {
    doc.pointer("/status/conditions")
        .and_then(Value::as_array)?
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(kind))
}

fn is_true(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case("true"))
}

fn is_false(status: Option<&str>) -> bool {
    status.is_some_and(|s| s.eq_ignore_ascii_case("false"))
}

fn int_at(doc: &ResourceDocument, path: &str) -> Option<i64> {
    doc.pointer(path).and_then(Value::as_i64)
}

fn container_status<'a>(doc: &'a ResourceDocument, name: &str) -> Option<&'a Value> {
    doc.pointer("/status/containerStatuses")
        .and_then(Value::as_array)?
        .iter()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(name))
}

fn display_name(doc: &ResourceDocument) -> String {
    match (doc.namespace(), doc.name()) {
        (Some(ns), Some(name)) => format!("{ns}/{name}"),
        (None, Some(name)) => name.to_string(),
        _ => "<unnamed>".to_string(),
    }
}

/// Node has a `Ready=True` condition
pub fn node_ready(
    doc: Option<&ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<bool, CheckError> {
    let Some(doc) = present(doc, err)? else {
        return Ok(false);
    };
    Ok(is_true(condition_status(doc, "Ready")))
}

/// Pod is `Running` with a `Ready=True` condition
///
/// A `Failed` pod never recovers and fails the wait.
pub fn pod_ready(
    doc: Option<&ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<bool, CheckError> {
    let Some(doc) = present(doc, err)? else {
        return Ok(false);
    };

    let phase = doc.str_at("/status/phase").map(Phase::parse);
    if phase == Some(Phase::Failed) {
        let reason = doc
            .str_at("/status/reason")
            .or_else(|| doc.str_at("/status/message"))
            .unwrap_or("no reason given");
        return Err(CheckError::Failed(format!(
            "pod {} failed: {reason}",
            display_name(doc)
        )));
    }

    Ok(phase == Some(Phase::Running) && is_true(condition_status(doc, "Ready")))
}

/// Deployment has `status.readyReplicas == status.replicas > 0`
pub fn deployment_ready(
    doc: Option<&ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<bool, CheckError> {
    let Some(doc) = present(doc, err)? else {
        return Ok(false);
    };
    let replicas = int_at(doc, "/status/replicas").unwrap_or(0);
    let ready = int_at(doc, "/status/readyReplicas").unwrap_or(0);
    Ok(replicas > 0 && ready == replicas)
}

/// StatefulSet has as many ready replicas as `spec.replicas` asks for
pub fn statefulset_ready(
    doc: Option<&ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<bool, CheckError> {
    let Some(doc) = present(doc, err)? else {
        return Ok(false);
    };
    if doc.pointer("/status").is_none() {
        return Ok(false);
    }
    let desired = int_at(doc, "/spec/replicas").unwrap_or(1);
    let ready = int_at(doc, "/status/readyReplicas").unwrap_or(0);
    Ok(ready == desired)
}

/// DaemonSet runs a ready pod on every node it is scheduled to
pub fn daemonset_ready(
    doc: Option<&ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<bool, CheckError> {
    let Some(doc) = present(doc, err)? else {
        return Ok(false);
    };
    let Some(desired) = int_at(doc, "/status/desiredNumberScheduled") else {
        return Ok(false);
    };
    let ready = int_at(doc, "/status/numberReady").unwrap_or(0);
    Ok(ready == desired)
}

/// Job has a `Complete=True` condition; `Failed=True` fails the wait
pub fn job_complete(
    doc: Option<&ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<bool, CheckError> {
    let Some(doc) = present(doc, err)? else {
        return Ok(false);
    };

    if is_true(condition_status(doc, "Failed")) {
        let message = condition(doc, "Failed")
            .and_then(|c| c.get("message").or_else(|| c.get("reason")))
            .and_then(Value::as_str)
            .unwrap_or("no message");
        return Err(CheckError::Failed(format!(
            "job {} failed: {message}",
            display_name(doc)
        )));
    }

    Ok(is_true(condition_status(doc, "Complete")))
}

/// PersistentVolumeClaim is `Bound`
pub fn pvc_bound(
    doc: Option<&ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<bool, CheckError> {
    let Some(doc) = present(doc, err)? else {
        return Ok(false);
    };
    Ok(doc.str_at("/status/phase") == Some("Bound"))
}

/// CRD has an `Established=True` condition
///
/// `NamesAccepted=False` means the names clash with another CRD and fails
/// the wait.
pub fn crd_established(
    doc: Option<&ResourceDocument>,
    err: Option<&ApiError>,
) -> Result<bool, CheckError> {
    let Some(doc) = present(doc, err)? else {
        return Ok(false);
    };

    if let Some(names) = condition(doc, "NamesAccepted") {
        if is_false(names.get("status").and_then(Value::as_str)) {
            let reason = names.get("reason").and_then(Value::as_str);
            let message = names.get("message").and_then(Value::as_str);
            let detail = match (reason, message) {
                (Some(reason), Some(message)) => format!("{reason}: {message}"),
                (Some(detail), None) | (None, Some(detail)) => detail.to_string(),
                (None, None) => "names were not accepted".to_string(),
            };
            return Err(CheckError::Failed(format!(
                "CRD {} not established: {detail}",
                display_name(doc)
            )));
        }
    }

    Ok(is_true(condition_status(doc, "Established")))
}

/// `status.phase` equals `phase`, ignoring case
pub fn phase_equals(phase: Phase) -> impl ReadinessCheck {
    from_fn(move |doc, err| {
        let Some(doc) = present(doc, err)? else {
            return Ok(false);
        };
        Ok(doc.str_at("/status/phase").is_some_and(|p| phase.matches(p)))
    })
}

/// The pod's container `name` reports `ready: true`
pub fn container_ready(name: impl Into<String>) -> impl ReadinessCheck {
    let name = name.into();
    from_fn(move |doc, err| {
        let Some(doc) = present(doc, err)? else {
            return Ok(false);
        };
        Ok(container_status(doc, &name)
            .and_then(|c| c.get("ready"))
            .and_then(Value::as_bool)
            .unwrap_or(false))
    })
}

/// The pod's container `name` terminated with `exit_code`
///
/// Termination with any other code fails the wait.
pub fn container_terminated(name: impl Into<String>, exit_code: i32) -> impl ReadinessCheck {
    let name = name.into();
    from_fn(move |doc, err| {
        let Some(doc) = present(doc, err)? else {
            return Ok(false);
        };
        let Some(code) = container_status(doc, &name)
            .and_then(|c| c.pointer("/state/terminated/exitCode"))
            .and_then(Value::as_i64)
        else {
            return Ok(false);
        };

        if code == i64::from(exit_code) {
            Ok(true)
        } else {
            Err(CheckError::Failed(format!(
                "container {name} in pod {} exited with code {code}, expected {exit_code}",
                display_name(doc)
            )))
        }
    })
}

/// Ready once the lookup reports not-found
pub fn absent(doc: Option<&ResourceDocument>, err: Option<&ApiError>) -> Result<bool, CheckError> {
    match err {
        Some(err) if err.is_not_found() => Ok(true),
        Some(err) => Err(CheckError::Lookup(err.clone())),
        None => Ok(doc.is_none()),
    }
}
