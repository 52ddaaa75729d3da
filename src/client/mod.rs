//! Dynamic cluster client abstraction
//!
//! The engine talks to the cluster only through [`ClusterApi`]: get, list,
//! create, update and delete of untyped documents addressed by GVR,
//! namespace and name. Two implementations ship with the crate:
//!
//! - [`KubeCluster`] - a real API server via kube-rs
//! - [`MemoryCluster`] - an in-process store for tests and dry runs
//!
//! Remote failures are reported as [`ApiError`], which carries only the HTTP
//! status code, reason and message. [`classify`] sorts them into the three
//! classes the engine cares about.

use async_trait::async_trait;

use crate::document::{ResourceDocument, ResourceList};
use crate::registry::Gvr;

mod memory;
mod remote;

pub use memory::{MemoryCluster, Operation};
pub use remote::KubeCluster;

/// Error returned by the remote API, independent of transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason} ({code}): {message}")]
pub struct ApiError {
    /// HTTP status code, or 0 when the request never got a response
    pub code: u16,
    /// Machine-readable reason (`NotFound`, `Forbidden`, ...)
    pub reason: String,
    /// Human-readable message from the server
    pub message: String,
}

impl ApiError {
    pub fn new(code: u16, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "NotFound", message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(409, "AlreadyExists", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, "Conflict", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, "Forbidden", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, "Unauthorized", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, "BadRequest", message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(422, "Invalid", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, "InternalError", message)
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        classify(self)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

/// How the engine treats a remote error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The addressed resource does not exist
    NotFound,
    /// Retrying or waiting cannot help: forbidden, unauthorized, invalid, bad request
    Fatal,
    /// Anything else (conflicts, server errors, transport failures)
    Other,
}

/// Classify a remote error
#[must_use]
pub fn classify(err: &ApiError) -> ErrorClass {
    match (err.code, err.reason.as_str()) {
        (404, _) | (_, "NotFound") => ErrorClass::NotFound,
        (400 | 401 | 403 | 422, _)
        | (_, "BadRequest" | "Unauthorized" | "Forbidden" | "Invalid") => ErrorClass::Fatal,
        _ => ErrorClass::Other,
    }
}

/// Cascading behaviour for deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Delete the owner immediately, let the garbage collector remove dependents
    #[default]
    Background,
    /// Dependents are deleted before the owner disappears
    Foreground,
    /// Leave dependents in place
    Orphan,
}

/// Server-side filters for list calls
#[derive(Debug, Clone, Copy, Default)]
pub struct Selectors<'a> {
    pub labels: Option<&'a str>,
    pub fields: Option<&'a str>,
}

/// The capability the engine needs from a cluster
///
/// `namespace` is `None` for cluster-scoped resources, and for a
/// cluster-wide list of a namespaced kind.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<ResourceDocument, ApiError>;

    async fn list(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selectors: Selectors<'_>,
    ) -> Result<ResourceList, ApiError>;

    async fn create(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        doc: &ResourceDocument,
    ) -> Result<ResourceDocument, ApiError>;

    /// Replace the stored object; `metadata.resourceVersion` pins the write
    async fn update(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        doc: &ResourceDocument,
    ) -> Result<ResourceDocument, ApiError>;

    async fn delete(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
        propagation: Propagation,
    ) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        assert_eq!(classify(&ApiError::not_found("pods \"x\" not found")), ErrorClass::NotFound);
        assert_eq!(classify(&ApiError::new(0, "NotFound", "")), ErrorClass::NotFound);
    }

    #[test]
    fn test_classify_fatal() {
        for err in [
            ApiError::forbidden("no"),
            ApiError::unauthorized("who"),
            ApiError::bad_request("bad"),
            ApiError::invalid("spec.replicas: must be >= 0"),
        ] {
            assert_eq!(classify(&err), ErrorClass::Fatal, "{err}");
            assert!(err.is_fatal());
        }
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(classify(&ApiError::conflict("stale")), ErrorClass::Other);
        assert_eq!(classify(&ApiError::internal("etcd")), ErrorClass::Other);
        assert_eq!(
            classify(&ApiError::new(0, "ClientError", "connection refused")),
            ErrorClass::Other
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::forbidden("pods is forbidden");
        assert_eq!(err.to_string(), "Forbidden (403): pods is forbidden");
    }
}
