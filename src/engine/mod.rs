//! Reconciliation and wait engine
//!
//! [`Engine`] ties the kind registry to a [`ClusterApi`] and exposes the
//! operations callers sequence during node lifecycle automation:
//!
//! - `apply` / `delete` a manifest, one document at a time in file order
//! - `list` resources with selectors and a name prefix
//! - `wait_for_*` until a [`ReadinessCheck`](crate::predicates::ReadinessCheck)
//!   holds, a fatal error occurs, or the timeout elapses
//! - `scale`, `annotate` and `label` existing resources
//!
//! Every remote call races the caller's [`CancellationToken`]; a cancelled
//! operation returns [`EngineError::Cancelled`] without waiting for the
//! server.
//!
//! Calls are independent of each other. The engine keeps no cache and
//! spawns no tasks; every returned future resolves only once its outcome is
//! known.
//!
//! # Errors
//!
//! Every fallible method returns [`EngineError`], carrying the operation and
//! the resource it was addressing.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::client::{ApiError, ClusterApi};
use crate::config::EngineConfig;
use crate::manifest::ManifestError;
use crate::predicates::CheckError;
use crate::registry::{Gvr, KindRegistry, RegistryError, ResourceKind, Scope};
use crate::wait::WaitError;

mod apply;
mod listing;
mod mutate;
mod waiting;

/// Errors from engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unknown resource kind '{0}'")]
    UnknownKind(ResourceKind),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to {operation} {resource}: {source}")]
    Api {
        operation: &'static str,
        resource: String,
        #[source]
        source: ApiError,
    },

    #[error("{resource} failed readiness check: {source}")]
    CheckFailed {
        resource: String,
        #[source]
        source: CheckError,
    },

    #[error("{0}")]
    WaitTimeout(#[from] WaitError),

    #[error("{operation} of {resource} was cancelled")]
    Cancelled {
        operation: &'static str,
        resource: String,
    },
}

impl EngineError {
    pub(crate) fn api(
        operation: &'static str,
        resource: impl Into<String>,
        source: ApiError,
    ) -> Self {
        Self::Api {
            operation,
            resource: resource.into(),
            source,
        }
    }

    /// The remote error behind this failure, if there is one
    #[must_use]
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api { source, .. }
            | Self::CheckFailed {
                source: CheckError::Lookup(source),
                ..
            } => Some(source),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout(_))
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<RegistryError> for EngineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownKind(kind) => Self::UnknownKind(kind),
        }
    }
}

impl From<ManifestError> for EngineError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::Read { path, source } => Self::Io { path, source },
            invalid @ ManifestError::InvalidDocument { .. } => {
                Self::InvalidManifest(invalid.to_string())
            }
        }
    }
}

/// Resolves kinds through a [`KindRegistry`] and drives a [`ClusterApi`]
///
/// Cheap to clone; clones share the client and registry.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use weaver::{
///     predicates, ClusterConfig, Engine, KindRegistry, KubeCluster, ResourceKind, WaitOptions,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cluster = KubeCluster::connect(&ClusterConfig::default()).await?;
///     let engine = Engine::new(Arc::new(cluster), Arc::new(KindRegistry::with_builtins()));
///     let cancel = CancellationToken::new();
///
///     engine.apply(&cancel, "deploy/relay.yaml").await?;
///     engine
///         .wait_for_resources(
///             &cancel,
///             &ResourceKind::pod(),
///             "ledger",
///             &predicates::pod_ready,
///             Duration::from_secs(120),
///             &WaitOptions::new().label_selector("app=relay"),
///         )
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Engine {
    client: Arc<dyn ClusterApi>,
    registry: Arc<KindRegistry>,
    config: EngineConfig,
}

impl Engine {
    /// Engine with [`EngineConfig::default`]
    pub fn new(client: Arc<dyn ClusterApi>, registry: Arc<KindRegistry>) -> Self {
        Self::with_config(client, registry, EngineConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn ClusterApi>,
        registry: Arc<KindRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            client,
            registry,
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn client(&self) -> &dyn ClusterApi {
        self.client.as_ref()
    }

    fn resolve(&self, kind: &ResourceKind) -> Result<(Gvr, Scope), EngineError> {
        Ok(self.registry.lookup(kind)?)
    }

    /// Namespace to address for a single object
    ///
    /// Cluster-scoped kinds never get one; namespaced kinds fall back to the
    /// configured default.
    fn object_namespace(&self, scope: Scope, namespace: Option<&str>) -> Option<String> {
        match scope {
            Scope::Cluster => None,
            Scope::Namespaced => Some(
                namespace
                    .filter(|ns| !ns.is_empty())
                    .unwrap_or(self.config.default_namespace.as_str())
                    .to_string(),
            ),
        }
    }
}

/// Namespace for a collection call: empty means cluster-wide
fn collection_namespace(scope: Scope, namespace: &str) -> Option<&str> {
    match scope {
        Scope::Namespaced if !namespace.is_empty() => Some(namespace),
        _ => None,
    }
}

/// `Kind namespace/name`, or `Kind name` at cluster scope
fn identity(kind: &ResourceKind, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{kind} {ns}/{name}"),
        None => format!("{kind} {name}"),
    }
}

/// Race `fut` against cancellation
async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: &'static str,
    resource: &str,
    fut: impl Future<Output = T>,
) -> Result<T, EngineError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(EngineError::Cancelled {
            operation,
            resource: resource.to_string(),
        }),
        out = fut => Ok(out),
    }
}
