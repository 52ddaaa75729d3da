use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{cancellable, identity, Engine, EngineError};
use crate::client::Propagation;
use crate::document::ResourceDocument;
use crate::manifest::read_manifests;
use crate::registry::{Gvr, ResourceKind};

/// Where a decoded document lives
struct Addressed {
    kind: ResourceKind,
    gvr: Gvr,
    namespace: Option<String>,
    name: String,
}

impl Addressed {
    fn resource(&self) -> String {
        identity(&self.kind, self.namespace.as_deref(), &self.name)
    }
}

impl Engine {
    /// Create or update every document in a manifest file
    ///
    /// Documents are applied one at a time in file order. The first failure
    /// stops processing; documents before it stay applied.
    ///
    /// Returns the server's copy of each applied document.
    ///
    /// # Example
    ///
    /// ```ignore
    /// engine.apply(&cancel, "deploy/blocknode.yaml").await?;
    /// // Applying again only replaces objects with themselves
    /// engine.apply(&cancel, "deploy/blocknode.yaml").await?;
    /// ```
    pub async fn apply(
        &self,
        cancel: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> Result<Vec<ResourceDocument>, EngineError> {
        let documents = read_manifests(path).await?;
        self.apply_documents(cancel, documents).await
    }

    /// [`apply`](Self::apply) for documents that are already decoded
    pub async fn apply_documents(
        &self,
        cancel: &CancellationToken,
        documents: Vec<ResourceDocument>,
    ) -> Result<Vec<ResourceDocument>, EngineError> {
        let mut applied = Vec::with_capacity(documents.len());
        for doc in documents {
            applied.push(self.apply_one(cancel, doc).await?);
        }
        Ok(applied)
    }

    /// Delete every document in a manifest file
    ///
    /// Deletes use background propagation. A document that is already gone
    /// counts as deleted. Any other failure stops processing.
    pub async fn delete(
        &self,
        cancel: &CancellationToken,
        path: impl AsRef<Path>,
    ) -> Result<(), EngineError> {
        let documents = read_manifests(path).await?;
        self.delete_documents(cancel, &documents).await
    }

    /// [`delete`](Self::delete) for documents that are already decoded
    pub async fn delete_documents(
        &self,
        cancel: &CancellationToken,
        documents: &[ResourceDocument],
    ) -> Result<(), EngineError> {
        for doc in documents {
            self.delete_one(cancel, doc).await?;
        }
        Ok(())
    }

    fn address(&self, doc: &ResourceDocument) -> Result<Addressed, EngineError> {
        let kind = doc
            .kind()
            .map(ResourceKind::new)
            .ok_or_else(|| EngineError::InvalidArgument("document has no kind".to_string()))?;
        let name = doc
            .name()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                EngineError::InvalidArgument(format!("{kind} document has no metadata.name"))
            })?
            .to_string();
        let (gvr, scope) = self.resolve(&kind)?;
        let namespace = self.object_namespace(scope, doc.namespace());

        Ok(Addressed {
            kind,
            gvr,
            namespace,
            name,
        })
    }

    async fn apply_one(
        &self,
        cancel: &CancellationToken,
        mut doc: ResourceDocument,
    ) -> Result<ResourceDocument, EngineError> {
        let target = self.address(&doc)?;
        let resource = target.resource();
        let namespace = target.namespace.as_deref();
        if let Some(ns) = namespace {
            doc.set_namespace(ns);
        }

        let existing = cancellable(
            cancel,
            "apply",
            &resource,
            self.client.get(&target.gvr, namespace, &target.name),
        )
        .await?;

        match existing {
            Ok(current) => {
                doc.set_resource_version(current.resource_version());
                let updated = cancellable(
                    cancel,
                    "apply",
                    &resource,
                    self.client.update(&target.gvr, namespace, &doc),
                )
                .await?
                .map_err(|e| EngineError::api("update", &resource, e))?;

                info!(
                    kind = %target.kind,
                    namespace = ?namespace,
                    name = %target.name,
                    "Updated resource"
                );
                Ok(updated)
            }
            Err(e) if e.is_not_found() => {
                doc.set_resource_version(None);
                let created = cancellable(
                    cancel,
                    "apply",
                    &resource,
                    self.client.create(&target.gvr, namespace, &doc),
                )
                .await?
                .map_err(|e| EngineError::api("create", &resource, e))?;

                info!(
                    kind = %target.kind,
                    namespace = ?namespace,
                    name = %target.name,
                    "Created resource"
                );
                Ok(created)
            }
            Err(e) => Err(EngineError::api("get", resource, e)),
        }
    }

    async fn delete_one(
        &self,
        cancel: &CancellationToken,
        doc: &ResourceDocument,
    ) -> Result<(), EngineError> {
        let target = self.address(doc)?;
        let resource = target.resource();

        let result = cancellable(
            cancel,
            "delete",
            &resource,
            self.client.delete(
                &target.gvr,
                target.namespace.as_deref(),
                &target.name,
                Propagation::Background,
            ),
        )
        .await?;

        match result {
            Ok(()) => {
                info!(
                    kind = %target.kind,
                    namespace = ?target.namespace,
                    name = %target.name,
                    "Deleted resource"
                );
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(resource = %resource, "Already absent, nothing to delete");
                Ok(())
            }
            Err(e) => Err(EngineError::api("delete", resource, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiError, MemoryCluster, Operation};
    use crate::manifest::parse_manifests;
    use crate::registry::KindRegistry;
    use std::sync::Arc;

    const MANIFEST: &str = r"
apiVersion: v1
kind: ConfigMap
metadata:
  name: relay-config
data:
  port: '50211'
---
apiVersion: v1
kind: Namespace
metadata:
  name: ledger
";

    fn setup() -> (Arc<MemoryCluster>, Engine) {
        let cluster = Arc::new(MemoryCluster::new());
        let engine = Engine::new(cluster.clone(), Arc::new(KindRegistry::with_builtins()));
        (cluster, engine)
    }

    fn configmaps() -> Gvr {
        Gvr::new("", "v1", "configmaps")
    }

    #[tokio::test]
    async fn test_apply_creates_with_default_namespace() {
        let (cluster, engine) = setup();
        let docs = parse_manifests(MANIFEST.as_bytes()).unwrap();

        let applied = engine
            .apply_documents(&CancellationToken::new(), docs)
            .await
            .unwrap();

        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].namespace(), Some("default"));
        assert!(cluster.object(&configmaps(), Some("default"), "relay-config").is_some());
        // Namespaces are cluster scoped
        assert_eq!(applied[1].namespace(), None);
        assert!(cluster
            .object(&Gvr::new("", "v1", "namespaces"), None, "ledger")
            .is_some());
    }

    #[tokio::test]
    async fn test_apply_updates_existing() {
        let (cluster, engine) = setup();
        let cancel = CancellationToken::new();
        let docs = parse_manifests(MANIFEST.as_bytes()).unwrap();
        engine.apply_documents(&cancel, docs.clone()).await.unwrap();

        let mut changed = docs;
        changed[0].set_path(&["data", "port"], serde_json::json!("50212"));
        engine.apply_documents(&cancel, changed).await.unwrap();

        let stored = cluster
            .object(&configmaps(), Some("default"), "relay-config")
            .unwrap();
        assert_eq!(stored.str_at("/data/port"), Some("50212"));
        assert_eq!(cluster.calls(Operation::Create), 2);
        assert_eq!(cluster.calls(Operation::Update), 2);
    }

    #[tokio::test]
    async fn test_apply_stops_at_first_get_failure() {
        let (cluster, engine) = setup();
        cluster.fail_next(Operation::Get, ApiError::forbidden("configmaps is forbidden"));
        let docs = parse_manifests(MANIFEST.as_bytes()).unwrap();

        let err = engine
            .apply_documents(&CancellationToken::new(), docs)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Api { operation: "get", .. }));
        assert!(err.to_string().contains("ConfigMap default/relay-config"));
        assert_eq!(cluster.calls(Operation::Get), 1);
        assert_eq!(cluster.calls(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_apply_unknown_kind() {
        let (cluster, engine) = setup();
        let docs = parse_manifests(
            b"apiVersion: example.com/v1\nkind: Widget\nmetadata:\n  name: w\n",
        )
        .unwrap();

        let err = engine
            .apply_documents(&CancellationToken::new(), docs)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownKind(_)));
        assert_eq!(cluster.calls(Operation::Get), 0);
    }

    #[tokio::test]
    async fn test_apply_cancelled() {
        let (cluster, engine) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let docs = parse_manifests(MANIFEST.as_bytes()).unwrap();
        let err = engine.apply_documents(&cancel, docs).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(cluster.count(&configmaps()), 0);
    }

    #[tokio::test]
    async fn test_delete_absent_is_success() {
        let (cluster, engine) = setup();
        let docs = parse_manifests(MANIFEST.as_bytes()).unwrap();

        engine
            .delete_documents(&CancellationToken::new(), &docs)
            .await
            .unwrap();
        assert_eq!(cluster.calls(Operation::Delete), 2);
    }

    #[tokio::test]
    async fn test_delete_stops_at_hard_failure() {
        let (cluster, engine) = setup();
        cluster.fail_next(Operation::Delete, ApiError::internal("etcd unavailable"));
        let docs = parse_manifests(MANIFEST.as_bytes()).unwrap();

        let err = engine
            .delete_documents(&CancellationToken::new(), &docs)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Api { operation: "delete", .. }));
        assert_eq!(cluster.calls(Operation::Delete), 1);
    }

    #[tokio::test]
    async fn test_apply_missing_file() {
        let (_, engine) = setup();
        let err = engine
            .apply(&CancellationToken::new(), "/nonexistent/relay.yaml")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Io { .. }));
    }
}
