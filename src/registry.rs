//! Resource kind registry
//!
//! Maps a logical kind name (`Pod`, `Deployment`, ...) to the wire-level
//! group/version/resource triple used by the dynamic client, and back.
//!
//! The registry is an explicit object: build it once at startup with
//! [`KindRegistry::with_builtins`], extend it with [`KindRegistry::register`],
//! and hand it to the [`Engine`](crate::Engine) behind an `Arc`.
//!
//! # Example
//!
//! ```
//! use weaver::registry::{Gvr, KindRegistry, ResourceKind};
//!
//! let registry = KindRegistry::with_builtins();
//! registry.register(
//!     ResourceKind::new("BlockNode"),
//!     Gvr::new("hiero.org", "v1alpha1", "blocknodes"),
//! );
//!
//! let gvr = registry.to_gvr(&ResourceKind::new("BlockNode")).unwrap();
//! assert_eq!(registry.to_kind(&gvr), ResourceKind::new("BlockNode"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use crate::phase::Phase;

/// Logical resource kind name, independent of its wire representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKind(String);

impl ResourceKind {
    pub const NODE: &'static str = "Node";
    pub const NAMESPACE: &'static str = "Namespace";
    pub const SERVICE: &'static str = "Service";
    pub const CONFIG_MAP: &'static str = "ConfigMap";
    pub const SECRET: &'static str = "Secret";
    pub const POD: &'static str = "Pod";
    pub const DEPLOYMENT: &'static str = "Deployment";
    pub const STATEFUL_SET: &'static str = "StatefulSet";
    pub const DAEMON_SET: &'static str = "DaemonSet";
    pub const JOB: &'static str = "Job";
    pub const PERSISTENT_VOLUME_CLAIM: &'static str = "PersistentVolumeClaim";
    pub const CUSTOM_RESOURCE_DEFINITION: &'static str = "CustomResourceDefinition";

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn pod() -> Self {
        Self::new(Self::POD)
    }

    #[must_use]
    pub fn deployment() -> Self {
        Self::new(Self::DEPLOYMENT)
    }

    #[must_use]
    pub fn stateful_set() -> Self {
        Self::new(Self::STATEFUL_SET)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// `GroupVersionResource` identifies a wire-level collection
///
/// The core API group is the empty string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvr {
    /// API group (e.g., "apps", "" for core)
    pub group: String,
    /// API version (e.g., "v1", "v1beta1")
    pub version: String,
    /// Resource name (plural, e.g., "deployments", "pods")
    pub resource: String,
}

impl Gvr {
    #[must_use]
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }

    /// `apiVersion` string as it appears in manifests ("v1", "apps/v1")
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl fmt::Display for Gvr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// Whether a kind lives inside a namespace or at cluster scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Namespaced,
    Cluster,
}

/// Errors from registry lookups
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown resource kind '{0}'")]
    UnknownKind(ResourceKind),
}

#[derive(Debug, Default)]
struct Maps {
    by_kind: HashMap<ResourceKind, (Gvr, Scope)>,
    by_gvr: HashMap<Gvr, ResourceKind>,
    phases: HashMap<String, String>,
}

/// Bidirectional kind <-> GVR mapping
///
/// Both directions are updated under one write lock, so readers always see
/// a consistent bijection.
#[derive(Debug, Default)]
pub struct KindRegistry {
    maps: RwLock<Maps>,
}

const BUILTINS: &[(&str, &str, &str, &str, Scope)] = &[
    ("Node", "", "v1", "nodes", Scope::Cluster),
    ("Namespace", "", "v1", "namespaces", Scope::Cluster),
    ("Service", "", "v1", "services", Scope::Namespaced),
    ("ServiceAccount", "", "v1", "serviceaccounts", Scope::Namespaced),
    ("ConfigMap", "", "v1", "configmaps", Scope::Namespaced),
    ("Secret", "", "v1", "secrets", Scope::Namespaced),
    ("Pod", "", "v1", "pods", Scope::Namespaced),
    ("PersistentVolumeClaim", "", "v1", "persistentvolumeclaims", Scope::Namespaced),
    ("PersistentVolume", "", "v1", "persistentvolumes", Scope::Cluster),
    ("Deployment", "apps", "v1", "deployments", Scope::Namespaced),
    ("StatefulSet", "apps", "v1", "statefulsets", Scope::Namespaced),
    ("DaemonSet", "apps", "v1", "daemonsets", Scope::Namespaced),
    ("ReplicaSet", "apps", "v1", "replicasets", Scope::Namespaced),
    ("Job", "batch", "v1", "jobs", Scope::Namespaced),
    ("StorageClass", "storage.k8s.io", "v1", "storageclasses", Scope::Cluster),
    ("Role", "rbac.authorization.k8s.io", "v1", "roles", Scope::Namespaced),
    ("RoleBinding", "rbac.authorization.k8s.io", "v1", "rolebindings", Scope::Namespaced),
    ("ClusterRole", "rbac.authorization.k8s.io", "v1", "clusterroles", Scope::Cluster),
    (
        "ClusterRoleBinding",
        "rbac.authorization.k8s.io",
        "v1",
        "clusterrolebindings",
        Scope::Cluster,
    ),
    (
        "CustomResourceDefinition",
        "apiextensions.k8s.io",
        "v1",
        "customresourcedefinitions",
        Scope::Cluster,
    ),
];

impl KindRegistry {
    /// Empty registry with no kinds registered
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the core Kubernetes kinds
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for (kind, group, version, resource, scope) in BUILTINS {
            registry.insert(ResourceKind::new(*kind), Gvr::new(group, version, resource), *scope);
        }
        registry
    }

    /// Register (or overwrite) a namespaced kind
    ///
    /// The kind is always recorded as [`Scope::Namespaced`], so its objects
    /// are addressed under a namespace (the configured default when a
    /// document has none). Cluster-scoped kinds such as a cluster-wide CRD
    /// must go through [`register_cluster_scoped`](Self::register_cluster_scoped)
    /// instead.
    pub fn register(&self, kind: ResourceKind, gvr: Gvr) {
        self.insert(kind, gvr, Scope::Namespaced);
    }

    /// Register (or overwrite) a cluster-scoped kind
    pub fn register_cluster_scoped(&self, kind: ResourceKind, gvr: Gvr) {
        self.insert(kind, gvr, Scope::Cluster);
    }

    fn insert(&self, kind: ResourceKind, gvr: Gvr, scope: Scope) {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);

        // Drop stale pairs on either side so the mapping stays one-to-one
        if let Some((old_gvr, _)) = maps.by_kind.remove(&kind) {
            maps.by_gvr.remove(&old_gvr);
        }
        if let Some(old_kind) = maps.by_gvr.remove(&gvr) {
            maps.by_kind.remove(&old_kind);
        }

        maps.by_gvr.insert(gvr.clone(), kind.clone());
        maps.by_kind.insert(kind, (gvr, scope));
    }

    /// Resolve a kind to its GVR
    pub fn to_gvr(&self, kind: &ResourceKind) -> Result<Gvr, RegistryError> {
        self.lookup(kind).map(|(gvr, _)| gvr)
    }

    /// Resolve a GVR to its kind, falling back to the plural resource name
    #[must_use]
    pub fn to_kind(&self, gvr: &Gvr) -> ResourceKind {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.by_gvr
            .get(gvr)
            .cloned()
            .unwrap_or_else(|| ResourceKind::new(gvr.resource.clone()))
    }

    /// Scope of a registered kind
    pub fn scope(&self, kind: &ResourceKind) -> Result<Scope, RegistryError> {
        self.lookup(kind).map(|(_, scope)| scope)
    }

    pub fn is_namespaced(&self, kind: &ResourceKind) -> Result<bool, RegistryError> {
        self.scope(kind).map(|scope| scope == Scope::Namespaced)
    }

    /// Resolve a kind to both its GVR and scope under a single read lock
    pub fn lookup(&self, kind: &ResourceKind) -> Result<(Gvr, Scope), RegistryError> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        maps.by_kind
            .get(kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownKind(kind.clone()))
    }

    /// All registered kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        let mut kinds: Vec<ResourceKind> = maps.by_kind.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Register a custom phase name so parsing canonicalises its spelling
    pub fn register_phase(&self, name: &str) {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        maps.phases.insert(name.to_lowercase(), name.to_string());
    }

    /// Parse a phase, consulting registered custom phases after the built-ins
    #[must_use]
    pub fn parse_phase(&self, raw: &str) -> Phase {
        match Phase::parse(raw) {
            Phase::Other(raw) => {
                let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
                match maps.phases.get(&raw.to_lowercase()) {
                    Some(canonical) => Phase::Other(canonical.clone()),
                    None => Phase::Other(raw),
                }
            }
            builtin => builtin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_round_trip() {
        let registry = KindRegistry::with_builtins();

        for kind in registry.kinds() {
            let gvr = registry.to_gvr(&kind).unwrap();
            assert_eq!(registry.to_kind(&gvr), kind, "round trip failed for {kind}");
        }
        assert_eq!(registry.kinds().len(), BUILTINS.len());
    }

    #[test]
    fn test_unknown_kind_fails() {
        let registry = KindRegistry::with_builtins();
        let err = registry.to_gvr(&ResourceKind::new("Widget")).unwrap_err();
        assert_eq!(err, RegistryError::UnknownKind(ResourceKind::new("Widget")));
        assert!(err.to_string().contains("Widget"));
    }

    #[test]
    fn test_unknown_gvr_falls_back_to_resource() {
        let registry = KindRegistry::with_builtins();
        let gvr = Gvr::new("example.com", "v1", "widgets");
        assert_eq!(registry.to_kind(&gvr), ResourceKind::new("widgets"));
    }

    #[test]
    fn test_register_extends_registry() {
        let registry = KindRegistry::with_builtins();
        let kind = ResourceKind::new("BlockNode");
        let gvr = Gvr::new("hiero.org", "v1alpha1", "blocknodes");

        registry.register(kind.clone(), gvr.clone());

        assert_eq!(registry.to_gvr(&kind).unwrap(), gvr);
        assert_eq!(registry.to_kind(&gvr), kind);
        assert!(registry.is_namespaced(&kind).unwrap());
    }

    #[test]
    fn test_reregister_keeps_bijection() {
        let registry = KindRegistry::new();
        let kind = ResourceKind::new("Widget");
        let v1 = Gvr::new("example.com", "v1", "widgets");
        let v2 = Gvr::new("example.com", "v2", "widgets");

        registry.register(kind.clone(), v1.clone());
        registry.register(kind.clone(), v2.clone());

        assert_eq!(registry.to_gvr(&kind).unwrap(), v2);
        // The old GVR no longer maps back to the kind
        assert_eq!(registry.to_kind(&v1), ResourceKind::new("widgets"));

        // Rebinding the GVR to a new kind evicts the previous owner
        let other = ResourceKind::new("Gadget");
        registry.register(other.clone(), v2.clone());
        assert_eq!(registry.to_kind(&v2), other);
        assert!(registry.to_gvr(&kind).is_err());
    }

    #[test]
    fn test_scopes() {
        let registry = KindRegistry::with_builtins();
        assert_eq!(registry.scope(&ResourceKind::new("Node")).unwrap(), Scope::Cluster);
        assert_eq!(registry.scope(&ResourceKind::pod()).unwrap(), Scope::Namespaced);
        assert!(!registry
            .is_namespaced(&ResourceKind::new("CustomResourceDefinition"))
            .unwrap());

        let kind = ResourceKind::new("ClusterWidget");
        registry.register_cluster_scoped(
            kind.clone(),
            Gvr::new("example.com", "v1", "clusterwidgets"),
        );
        assert_eq!(registry.scope(&kind).unwrap(), Scope::Cluster);
    }

    #[test]
    fn test_register_is_namespaced_until_reregistered_cluster_scoped() {
        let registry = KindRegistry::new();
        let kind = ResourceKind::new("Tenant");
        let gvr = Gvr::new("example.com", "v1", "tenants");

        registry.register(kind.clone(), gvr.clone());
        assert_eq!(registry.scope(&kind).unwrap(), Scope::Namespaced);

        registry.register_cluster_scoped(kind.clone(), gvr.clone());
        assert_eq!(registry.lookup(&kind).unwrap(), (gvr, Scope::Cluster));
    }

    #[test]
    fn test_gvr_api_version() {
        assert_eq!(Gvr::new("", "v1", "pods").api_version(), "v1");
        assert_eq!(Gvr::new("apps", "v1", "deployments").api_version(), "apps/v1");
        assert_eq!(Gvr::new("apps", "v1", "deployments").to_string(), "apps/v1/deployments");
    }

    #[test]
    fn test_registered_phase_is_canonicalised() {
        let registry = KindRegistry::new();
        registry.register_phase("Bound");

        assert_eq!(registry.parse_phase("bound"), Phase::Other("Bound".to_string()));
        assert_eq!(registry.parse_phase("RUNNING"), Phase::Running);
        assert_eq!(registry.parse_phase("Lost"), Phase::Other("Lost".to_string()));
    }
}
