//! Argo Cluster Client
//!
//! Submits the orchestrator's cluster resources: the trials config map
//! and the Argo `Workflow` execution graph. Creation is idempotent at
//! this boundary, an already-existing resource is treated as success so
//! a replayed event converges instead of failing.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{ApiResource, DeleteParams, DynamicObject, GroupVersionKind, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use sigex_ports::{ClusterClient, ClusterClientError, GraphCompletionEvent, RUN_ID_ANNOTATION};
use tracing::{info, warn};

const WORKFLOW_GROUP: &str = "argoproj.io";
const WORKFLOW_VERSION: &str = "v1alpha1";
const WORKFLOW_KIND: &str = "Workflow";

/// Workflow phases after which no further transition happens.
const TERMINAL_PHASES: &[&str] = &["Succeeded", "Failed", "Error"];

pub struct ArgoClusterClient {
    client: Client,
    namespace: String,
}

impl ArgoClusterClient {
    pub async fn new(namespace: impl Into<String>) -> Result<Self, ClusterClientError> {
        let client = Client::try_default()
            .await
            .map_err(|e| ClusterClientError::Api(format!("failed to build client: {e}")))?;
        Ok(Self {
            client,
            namespace: namespace.into(),
        })
    }

    pub fn with_client(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn workflow_resource() -> ApiResource {
        ApiResource::from_gvk(&GroupVersionKind::gvk(
            WORKFLOW_GROUP,
            WORKFLOW_VERSION,
            WORKFLOW_KIND,
        ))
    }

    fn workflow_api(&self) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            &self.namespace,
            &Self::workflow_resource(),
        )
    }

    fn is_conflict(err: &kube::Error) -> bool {
        matches!(err, kube::Error::Api(response) if response.code == 409)
    }

    fn is_not_found(err: &kube::Error) -> bool {
        matches!(err, kube::Error::Api(response) if response.code == 404)
    }
}

#[async_trait]
impl ClusterClient for ArgoClusterClient {
    async fn create_config_object(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), ClusterClientError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &self.namespace);
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        };

        match api.create(&PostParams::default(), &config_map).await {
            Ok(_) => {
                info!(name, "config map created");
                Ok(())
            }
            Err(e) if Self::is_conflict(&e) => {
                warn!(name, "config map already exists, keeping the existing one");
                Ok(())
            }
            Err(e) => Err(ClusterClientError::Api(format!(
                "failed to create config map {name}: {e}"
            ))),
        }
    }

    async fn create_execution_graph(
        &self,
        name: &str,
        annotations: BTreeMap<String, String>,
        graph: serde_json::Value,
    ) -> Result<(), ClusterClientError> {
        let mut workflow = DynamicObject::new(name, &Self::workflow_resource());
        workflow.metadata.annotations = Some(annotations);
        workflow.data = serde_json::json!({ "spec": graph });

        match self
            .workflow_api()
            .create(&PostParams::default(), &workflow)
            .await
        {
            Ok(_) => {
                info!(name, "workflow submitted");
                Ok(())
            }
            Err(e) if Self::is_conflict(&e) => {
                warn!(name, "workflow already exists, keeping the existing one");
                Ok(())
            }
            Err(e) => Err(ClusterClientError::Api(format!(
                "failed to create workflow {name}: {e}"
            ))),
        }
    }

    async fn delete_execution_graph(&self, name: &str) -> Result<(), ClusterClientError> {
        match self
            .workflow_api()
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!(name, "workflow deleted");
                Ok(())
            }
            Err(e) if Self::is_not_found(&e) => {
                warn!(name, "workflow already gone");
                Ok(())
            }
            Err(e) => Err(ClusterClientError::Api(format!(
                "failed to delete workflow {name}: {e}"
            ))),
        }
    }

    fn watch_graph_completion_events(&self) -> BoxStream<'static, GraphCompletionEvent> {
        let stream = watcher(self.workflow_api(), watcher::Config::default())
            .default_backoff()
            .applied_objects()
            .filter_map(|result| async move {
                match result {
                    Ok(workflow) => completion_event(&workflow),
                    Err(e) => {
                        warn!(error = %e, "workflow watch error");
                        None
                    }
                }
            });
        Box::pin(stream)
    }
}

fn completion_event(workflow: &DynamicObject) -> Option<GraphCompletionEvent> {
    let phase = workflow.data["status"]["phase"].as_str()?;
    if !TERMINAL_PHASES.contains(&phase) {
        return None;
    }

    let run_id = workflow
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(RUN_ID_ANNOTATION))
        .cloned();

    Some(GraphCompletionEvent {
        name: workflow.metadata.name.clone()?,
        run_id,
        phase: phase.to_string(),
    })
}
