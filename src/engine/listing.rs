use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{cancellable, collection_namespace, Engine, EngineError};
use crate::client::{ApiError, Selectors};
use crate::document::{ResourceList, WaitOptions};
use crate::registry::{Gvr, ResourceKind};

impl Engine {
    /// List resources of `kind`
    ///
    /// An empty `namespace` lists across the whole cluster. Label and field
    /// selectors are passed to the server verbatim; `name_prefix` is applied
    /// to the returned items, keeping the list's resource version and
    /// continue token.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let opts = WaitOptions::new().name_prefix("network-node");
    /// let pods = engine.list(&cancel, &ResourceKind::pod(), "ledger", &opts).await?;
    /// ```
    pub async fn list(
        &self,
        cancel: &CancellationToken,
        kind: &ResourceKind,
        namespace: &str,
        opts: &WaitOptions,
    ) -> Result<ResourceList, EngineError> {
        let (gvr, scope) = self.resolve(kind)?;
        let namespace = collection_namespace(scope, namespace);
        let resource = describe_collection(kind, namespace, opts);

        cancellable(cancel, "list", &resource, self.list_filtered(&gvr, namespace, opts))
            .await?
            .map_err(|e| EngineError::api("list", resource, e))
    }

    /// Server-side selectors plus client-side prefix filter, unwrapped
    pub(super) async fn list_filtered(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        opts: &WaitOptions,
    ) -> Result<ResourceList, ApiError> {
        let selectors = Selectors {
            labels: opts.label_selector.as_deref(),
            fields: opts.field_selector.as_deref(),
        };
        let list = self.client.list(gvr, namespace, selectors).await?;

        debug!(
            gvr = %gvr,
            namespace = ?namespace,
            items = list.len(),
            "Listed resources"
        );

        Ok(match opts.name_prefix.as_deref() {
            Some(prefix) => filter_by_prefix(list, prefix),
            None => list,
        })
    }
}

fn filter_by_prefix(list: ResourceList, prefix: &str) -> ResourceList {
    ResourceList {
        items: list
            .items
            .into_iter()
            .filter(|doc| doc.name().is_some_and(|name| name.starts_with(prefix)))
            .collect(),
        ..list
    }
}

/// `Kind namespace [filters]`, used in errors and timeouts
pub(super) fn describe_collection(
    kind: &ResourceKind,
    namespace: Option<&str>,
    opts: &WaitOptions,
) -> String {
    format!(
        "{kind} in {} [{}]",
        namespace.unwrap_or("all namespaces"),
        opts.describe()
    )
}
