//! Cluster Client Port
//!
//! Idempotent create/delete of execution-graph resources and supporting
//! configuration objects against the cluster orchestrator. "Already exists"
//! on create and "not found" on delete are successes by contract, so every
//! stage that submits resources is safe to re-run after a crash.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

/// Annotation carrying the experiment run id on submitted graphs.
pub const RUN_ID_ANNOTATION: &str = "sigex.io/signal-generator-experiment-run-id";

/// Completion event for a submitted execution graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCompletionEvent {
    /// Graph resource name.
    pub name: String,
    /// Experiment run id correlation annotation, when present.
    pub run_id: Option<String>,
    /// Terminal phase reported by the orchestrator (e.g. Succeeded, Failed).
    pub phase: String,
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Create a configuration object. An existing object with the same name
    /// is treated as success.
    async fn create_config_object(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), ClusterClientError>;

    /// Submit an execution graph document under `name`, tagged with
    /// `annotations` for correlation. An existing graph with the same name
    /// is treated as success.
    async fn create_execution_graph(
        &self,
        name: &str,
        annotations: BTreeMap<String, String>,
        graph: serde_json::Value,
    ) -> Result<(), ClusterClientError>;

    /// Delete a submitted graph. A missing graph is treated as success.
    async fn delete_execution_graph(&self, name: &str) -> Result<(), ClusterClientError>;

    /// Unbounded stream of graphs reaching a terminal phase.
    fn watch_graph_completion_events(&self) -> BoxStream<'static, GraphCompletionEvent>;
}

#[derive(thiserror::Error, Debug)]
pub enum ClusterClientError {
    #[error("cluster API error: {0}")]
    Api(String),

    #[error("invalid resource: {0}")]
    InvalidResource(String),
}

impl From<ClusterClientError> for sigex_core::DomainError {
    fn from(err: ClusterClientError) -> Self {
        match err {
            ClusterClientError::Api(detail) => Self::Infrastructure(detail),
            ClusterClientError::InvalidResource(detail) => Self::Validation(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cluster_client_trait_is_object_safe() {
        let _client: Option<Box<dyn ClusterClient>> = None;
    }

    #[test]
    fn test_cluster_client_error_display() {
        let err = ClusterClientError::Api("500 from apiserver".to_string());
        assert!(err.to_string().contains("cluster API error"));
    }
}
