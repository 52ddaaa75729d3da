//! Weaver - declarative resource orchestration for Kubernetes
//!
//! Weaver applies and deletes manifests against a cluster, waits for
//! arbitrary readiness conditions with bounded timeouts, and scales or
//! annotates what it deployed. Every resource is handled as an untyped
//! document, so new kinds work without recompiling: register the kind and go.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use tokio_util::sync::CancellationToken;
//! use weaver::{
//!     predicates, ClusterConfig, Engine, KindRegistry, KubeCluster, ResourceKind, WaitOptions,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     weaver::telemetry::init_logging();
//!
//!     let cluster = KubeCluster::connect(&ClusterConfig::default()).await?;
//!     let engine = Engine::new(Arc::new(cluster), Arc::new(KindRegistry::with_builtins()));
//!     let cancel = CancellationToken::new();
//!
//!     engine.apply(&cancel, "deploy/mirror.yaml").await?;
//!     engine
//!         .wait_for_resources(
//!             &cancel,
//!             &ResourceKind::pod(),
//!             "ledger",
//!             &predicates::pod_ready,
//!             Duration::from_secs(300),
//!             &WaitOptions::new().name_prefix("mirror-"),
//!         )
//!         .await?;
//!
//!     engine
//!         .scale(&cancel, "ledger", "mirror-importer", &ResourceKind::deployment(), 2)
//!         .await?;
//!     engine.delete(&cancel, "deploy/mirror.yaml").await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod document;
pub mod engine;
pub mod manifest;
pub mod phase;
pub mod predicates;
pub mod registry;
pub mod telemetry;
pub mod wait;

pub use client::{
    classify, ApiError, ClusterApi, ErrorClass, KubeCluster, MemoryCluster, Propagation,
};
pub use config::{ClusterConfig, EngineConfig};
pub use document::{ResourceDocument, ResourceList, WaitOptions};
pub use engine::{Engine, EngineError};
pub use manifest::{parse_manifests, read_manifests, ManifestError};
pub use phase::Phase;
pub use predicates::{CheckError, ReadinessCheck, ReadinessCheckExt};
pub use registry::{Gvr, KindRegistry, RegistryError, ResourceKind, Scope};
pub use wait::WaitError;
