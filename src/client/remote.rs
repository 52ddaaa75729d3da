use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::ApiResource;
use kube::{Client, Config};
use tracing::{debug, instrument};

use super::{ApiError, ClusterApi, Propagation, Selectors};
use crate::config::ClusterConfig;
use crate::document::{ResourceDocument, ResourceList};
use crate::registry::Gvr;

/// [`ClusterApi`] backed by a real API server
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Connect using an explicit kubeconfig/context, or the inferred environment
    pub async fn connect(config: &ClusterConfig) -> Result<Self, ApiError> {
        let options = KubeConfigOptions {
            context: config.context.clone(),
            ..Default::default()
        };

        let mut kube_config = match &config.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                    client_error(format!("failed to read kubeconfig {}: {e}", path.display()))
                })?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .map_err(|e| client_error(format!("failed to load kubeconfig: {e}")))?
            }
            None if config.context.is_some() => Config::from_kubeconfig(&options)
                .await
                .map_err(|e| client_error(format!("failed to load kubeconfig: {e}")))?,
            None => Config::infer()
                .await
                .map_err(|e| client_error(format!("failed to infer config: {e}")))?,
        };
        kube_config.connect_timeout = Some(config.connect_timeout);
        kube_config.read_timeout = Some(config.read_timeout);

        let client = Client::try_from(kube_config)
            .map_err(|e| client_error(format!("failed to create client: {e}")))?;

        debug!(
            kubeconfig = ?config.kubeconfig,
            context = ?config.context,
            "Connected to cluster"
        );

        Ok(Self::new(client))
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, gvr: &Gvr, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = to_api_resource(gvr);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

/// Build a kube `ApiResource` from a GVR
///
/// Only group, version and plural take part in URL construction, so the kind
/// is left empty.
fn to_api_resource(gvr: &Gvr) -> ApiResource {
    ApiResource {
        group: gvr.group.clone(),
        version: gvr.version.clone(),
        api_version: gvr.api_version(),
        kind: String::new(),
        plural: gvr.resource.clone(),
    }
}

fn client_error(message: String) -> ApiError {
    ApiError::new(0, "ClientError", message)
}

impl From<kube::Error> for ApiError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ae) => ApiError::new(ae.code, ae.reason, ae.message),
            other => client_error(other.to_string()),
        }
    }
}

fn to_dynamic(doc: &ResourceDocument) -> Result<DynamicObject, ApiError> {
    serde_json::from_value(doc.value().clone())
        .map_err(|e| ApiError::bad_request(format!("invalid object format: {e}")))
}

fn from_dynamic(obj: &DynamicObject) -> Result<ResourceDocument, ApiError> {
    serde_json::to_value(obj)
        .map(ResourceDocument::new)
        .map_err(|e| client_error(format!("failed to serialize: {e}")))
}

#[async_trait]
impl ClusterApi for KubeCluster {
    #[instrument(skip(self, gvr), fields(gvr = %gvr))]
    async fn get(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<ResourceDocument, ApiError> {
        let obj = self.api(gvr, namespace).get(name).await?;
        from_dynamic(&obj)
    }

    #[instrument(skip(self, gvr, selectors), fields(gvr = %gvr))]
    async fn list(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        selectors: Selectors<'_>,
    ) -> Result<ResourceList, ApiError> {
        let mut params = ListParams::default();
        if let Some(labels) = selectors.labels {
            params = params.labels(labels);
        }
        if let Some(fields) = selectors.fields {
            params = params.fields(fields);
        }

        let list = self.api(gvr, namespace).list(&params).await?;
        let items = list
            .items
            .iter()
            .map(from_dynamic)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ResourceList {
            items,
            resource_version: list.metadata.resource_version,
            continue_token: list.metadata.continue_,
        })
    }

    #[instrument(skip(self, gvr, doc), fields(gvr = %gvr))]
    async fn create(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        doc: &ResourceDocument,
    ) -> Result<ResourceDocument, ApiError> {
        let obj = to_dynamic(doc)?;
        let created = self
            .api(gvr, namespace)
            .create(&PostParams::default(), &obj)
            .await?;
        from_dynamic(&created)
    }

    #[instrument(skip(self, gvr, doc), fields(gvr = %gvr))]
    async fn update(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        doc: &ResourceDocument,
    ) -> Result<ResourceDocument, ApiError> {
        let name = doc
            .name()
            .ok_or_else(|| ApiError::bad_request("object must have metadata.name"))?;
        let obj = to_dynamic(doc)?;
        let replaced = self
            .api(gvr, namespace)
            .replace(name, &PostParams::default(), &obj)
            .await?;
        from_dynamic(&replaced)
    }

    #[instrument(skip(self, gvr), fields(gvr = %gvr))]
    async fn delete(
        &self,
        gvr: &Gvr,
        namespace: Option<&str>,
        name: &str,
        propagation: Propagation,
    ) -> Result<(), ApiError> {
        let params = match propagation {
            Propagation::Background => DeleteParams::background(),
            Propagation::Foreground => DeleteParams::foreground(),
            Propagation::Orphan => DeleteParams::orphan(),
        };
        self.api(gvr, namespace).delete(name, &params).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{KindRegistry, ResourceKind};
    use kube::core::ErrorResponse;
    use serde_json::json;

    #[test]
    fn test_api_resource_for_core_group() {
        let ar = to_api_resource(&Gvr::new("", "v1", "pods"));
        assert_eq!(ar.api_version, "v1");
        assert_eq!(ar.plural, "pods");
    }

    #[test]
    fn test_api_resource_for_named_group() {
        let ar = to_api_resource(&Gvr::new("apps", "v1", "deployments"));
        assert_eq!(ar.api_version, "apps/v1");
        assert_eq!(ar.group, "apps");
    }

    #[test]
    fn test_kube_api_error_keeps_status() {
        let err: ApiError = kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "pods \"x\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        })
        .into();

        assert_eq!(err.code, 404);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_document_converts_to_dynamic_object() {
        let doc = ResourceDocument::new(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": { "name": "settings", "namespace": "ledger" },
            "data": { "key": "value" }
        }));

        let obj = to_dynamic(&doc).unwrap();
        assert_eq!(obj.metadata.name.as_deref(), Some("settings"));

        let back = from_dynamic(&obj).unwrap();
        assert_eq!(back.str_at("/data/key"), Some("value"));
    }

    #[tokio::test]
    #[ignore] // Requires real cluster
    async fn test_list_namespaces_on_real_cluster() {
        let cluster = KubeCluster::connect(&ClusterConfig::default())
            .await
            .expect("Should connect");
        let registry = KindRegistry::with_builtins();
        let gvr = registry.to_gvr(&ResourceKind::new("Namespace")).unwrap();

        let list = cluster
            .list(&gvr, None, Selectors::default())
            .await
            .expect("Should list namespaces");
        assert!(list.names().contains(&"default"));
    }
}
