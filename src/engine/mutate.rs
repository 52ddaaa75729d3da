use std::collections::BTreeMap;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::{cancellable, identity, Engine, EngineError};
use crate::document::ResourceDocument;
use crate::registry::ResourceKind;

impl Engine {
    /// Set `spec.replicas` on a Deployment or StatefulSet
    ///
    /// The resource must already exist; a missing one is an error.
    ///
    /// # Example
    ///
    /// ```ignore
    /// engine
    ///     .scale(&cancel, "ledger", "mirror-importer", &ResourceKind::deployment(), 0)
    ///     .await?;
    /// ```
    pub async fn scale(
        &self,
        cancel: &CancellationToken,
        namespace: &str,
        name: &str,
        kind: &ResourceKind,
        replicas: u32,
    ) -> Result<ResourceDocument, EngineError> {
        if kind.as_str() != ResourceKind::DEPLOYMENT
            && kind.as_str() != ResourceKind::STATEFUL_SET
        {
            return Err(EngineError::InvalidArgument(format!(
                "cannot scale {kind}: only Deployment and StatefulSet are scalable"
            )));
        }

        let updated = self
            .modify(cancel, kind, namespace, name, "scale", |doc| {
                doc.set_path(&["spec", "replicas"], Value::from(replicas));
            })
            .await?;

        info!(
            kind = %kind,
            namespace = %namespace,
            name = %name,
            replicas = replicas,
            "Scaled resource"
        );
        Ok(updated)
    }

    /// Merge `annotations` into the resource's annotations
    ///
    /// Existing keys not named in `annotations` are kept.
    pub async fn annotate(
        &self,
        cancel: &CancellationToken,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Result<ResourceDocument, EngineError> {
        let updated = self
            .modify(cancel, kind, namespace, name, "annotate", |doc| {
                doc.merge_metadata_map("annotations", annotations);
            })
            .await?;

        info!(
            kind = %kind,
            namespace = %namespace,
            name = %name,
            count = annotations.len(),
            "Annotated resource"
        );
        Ok(updated)
    }

    /// Merge `labels` into the resource's labels
    pub async fn label(
        &self,
        cancel: &CancellationToken,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<ResourceDocument, EngineError> {
        let updated = self
            .modify(cancel, kind, namespace, name, "label", |doc| {
                doc.merge_metadata_map("labels", labels);
            })
            .await?;

        info!(
            kind = %kind,
            namespace = %namespace,
            name = %name,
            count = labels.len(),
            "Labeled resource"
        );
        Ok(updated)
    }

    /// Get, edit, update
    ///
    /// The fetched `resourceVersion` is sent back, so a concurrent writer
    /// makes the update fail with a conflict instead of being overwritten.
    async fn modify(
        &self,
        cancel: &CancellationToken,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        operation: &'static str,
        edit: impl FnOnce(&mut ResourceDocument),
    ) -> Result<ResourceDocument, EngineError> {
        let (gvr, scope) = self.resolve(kind)?;
        let namespace = self.object_namespace(scope, Some(namespace));
        let resource = identity(kind, namespace.as_deref(), name);

        let mut doc = cancellable(
            cancel,
            operation,
            &resource,
            self.client.get(&gvr, namespace.as_deref(), name),
        )
        .await?
        .map_err(|e| EngineError::api(operation, &resource, e))?;

        edit(&mut doc);

        cancellable(
            cancel,
            operation,
            &resource,
            self.client.update(&gvr, namespace.as_deref(), &doc),
        )
        .await?
        .map_err(|e| EngineError::api(operation, resource, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ApiError, ClusterApi, MemoryCluster, Operation, Propagation, Selectors};
    use crate::document::ResourceList;
    use crate::registry::{Gvr, KindRegistry};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    /// Delays every `get`, otherwise delegates
    struct SlowGet {
        inner: Arc<MemoryCluster>,
        delay: Duration,
    }

    #[async_trait]
    impl ClusterApi for SlowGet {
        async fn get(
            &self,
            gvr: &Gvr,
            namespace: Option<&str>,
            name: &str,
        ) -> Result<ResourceDocument, ApiError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(gvr, namespace, name).await
        }

        async fn list(
            &self,
            gvr: &Gvr,
            namespace: Option<&str>,
            selectors: Selectors<'_>,
        ) -> Result<ResourceList, ApiError> {
            self.inner.list(gvr, namespace, selectors).await
        }

        async fn create(
            &self,
            gvr: &Gvr,
            namespace: Option<&str>,
            doc: &ResourceDocument,
        ) -> Result<ResourceDocument, ApiError> {
            self.inner.create(gvr, namespace, doc).await
        }

        async fn update(
            &self,
            gvr: &Gvr,
            namespace: Option<&str>,
            doc: &ResourceDocument,
        ) -> Result<ResourceDocument, ApiError> {
            self.inner.update(gvr, namespace, doc).await
        }

        async fn delete(
            &self,
            gvr: &Gvr,
            namespace: Option<&str>,
            name: &str,
            propagation: Propagation,
        ) -> Result<(), ApiError> {
            self.inner.delete(gvr, namespace, name, propagation).await
        }
    }

    fn deployments() -> Gvr {
        Gvr::new("apps", "v1", "deployments")
    }

    fn setup() -> (Arc<MemoryCluster>, Engine) {
        let cluster = Arc::new(MemoryCluster::new());
        cluster.insert(
            &deployments(),
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {
                    "name": "relay",
                    "namespace": "ledger",
                    "annotations": { "owner": "ops", "tier": "silver" },
                    "labels": { "app": "relay" }
                },
                "spec": { "replicas": 1 }
            }),
        );
        let engine = Engine::new(cluster.clone(), Arc::new(KindRegistry::with_builtins()));
        (cluster, engine)
    }

    fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_scale_deployment() {
        let (cluster, engine) = setup();

        let scaled = engine
            .scale(&CancellationToken::new(), "ledger", "relay", &ResourceKind::deployment(), 3)
            .await
            .unwrap();

        assert_eq!(scaled.pointer("/spec/replicas"), Some(&json!(3)));
        let stored = cluster.object(&deployments(), Some("ledger"), "relay").unwrap();
        assert_eq!(stored.pointer("/spec/replicas"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_scale_rejects_other_kinds() {
        let (cluster, engine) = setup();

        let err = engine
            .scale(&CancellationToken::new(), "ledger", "relay", &ResourceKind::pod(), 3)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert_eq!(cluster.calls(Operation::Get), 0);
    }

    #[tokio::test]
    async fn test_scale_missing_is_error() {
        let (cluster, engine) = setup();

        let err = engine
            .scale(
                &CancellationToken::new(),
                "ledger",
                "ghost",
                &ResourceKind::stateful_set(),
                1,
            )
            .await
            .unwrap_err();

        assert!(err.api_error().is_some_and(ApiError::is_not_found));
        assert_eq!(cluster.calls(Operation::Create), 0);
    }

    #[tokio::test]
    async fn test_annotate_merges() {
        let (_, engine) = setup();

        let updated = engine
            .annotate(
                &CancellationToken::new(),
                &ResourceKind::deployment(),
                "ledger",
                "relay",
                &entries(&[("tier", "gold"), ("rotated", "true")]),
            )
            .await
            .unwrap();

        assert_eq!(
            updated.annotations(),
            entries(&[("owner", "ops"), ("rotated", "true"), ("tier", "gold")])
        );
    }

    #[tokio::test]
    async fn test_label_merges() {
        let (_, engine) = setup();

        let updated = engine
            .label(
                &CancellationToken::new(),
                &ResourceKind::deployment(),
                "ledger",
                "relay",
                &entries(&[("solo.hedera.com/node", "node1")]),
            )
            .await
            .unwrap();

        assert_eq!(updated.labels().len(), 2);
        assert_eq!(updated.annotations().len(), 2);
    }

    #[tokio::test]
    async fn test_conflicting_update_surfaces() {
        let (cluster, engine) = setup();
        cluster.fail_next(Operation::Update, ApiError::conflict("the object has been modified"));

        let err = engine
            .annotate(
                &CancellationToken::new(),
                &ResourceKind::deployment(),
                "ledger",
                "relay",
                &entries(&[("a", "b")]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Api { operation: "annotate", .. }));
    }

    #[tokio::test]
    async fn test_scale_cancelled() {
        let (cluster, engine) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine
            .scale(&cancel, "ledger", "relay", &ResourceKind::deployment(), 5)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "scale of Deployment ledger/relay was cancelled");
        assert_eq!(cluster.calls(Operation::Update), 0);
        let stored = cluster.object(&deployments(), Some("ledger"), "relay").unwrap();
        assert_eq!(stored.pointer("/spec/replicas"), Some(&json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_get_stops_mutation() {
        let (cluster, engine) = setup();
        let cancel = CancellationToken::new();

        let slow = SlowGet {
            inner: cluster.clone(),
            delay: Duration::from_secs(60),
        };
        let engine = Engine::new(Arc::new(slow), engine.registry.clone());

        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        };
        let labels = entries(&[("x", "y")]);
        let kind = ResourceKind::deployment();
        let start = tokio::time::Instant::now();
        let mutation = engine.label(&cancel, &kind, "ledger", "relay", &labels);
        let (result, ()) = tokio::join!(mutation, canceller);

        assert!(result.unwrap_err().is_cancelled());
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(cluster.calls(Operation::Update), 0);
    }
}
