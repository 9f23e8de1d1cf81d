//! Run start stage
//!
//! Handles runs in status `Starting`: publishes the trials config object,
//! builds the execution graph for the run's training window and submits
//! it, then advances the run to `Started`. Resource creation is
//! idempotent on the cluster side, so re-running after a partial failure
//! converges instead of erroring.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use sigex_core::DomainError;
use sigex_ports::{
    AlgorithmCatalog, ClusterClient, ExperimentRunRepository, RUN_ID_ANNOTATION,
};
use tracing::info;

use crate::dispatcher::StageHandler;
use crate::trials_config::build_trials_config_data;
use crate::workflow::{build_workflow_spec, FinalizeTarget, WorkflowSpecInput};

const GRAPH_NAME_PREFIX: &str = "signal-generator-experiment-run";

pub fn graph_name(run_id: &str) -> String {
    format!("{GRAPH_NAME_PREFIX}-{run_id}")
}

pub fn config_object_name(run_id: &str) -> String {
    format!("{}-cm", graph_name(run_id))
}

#[derive(Debug, Clone)]
pub struct StartRunOptions {
    /// Extra pass-through env vars for every algorithm step container.
    pub env_vars: Vec<(String, String)>,
    pub gc_delete_delay: String,
    pub finalize: FinalizeTarget,
}

impl Default for StartRunOptions {
    fn default() -> Self {
        Self {
            env_vars: Vec::new(),
            gc_delete_delay: "30m".to_string(),
            finalize: FinalizeTarget::default(),
        }
    }
}

pub struct StartRunHandler<R, C, K> {
    repository: Arc<R>,
    catalog: Arc<C>,
    cluster: Arc<K>,
    options: StartRunOptions,
}

impl<R, C, K> StartRunHandler<R, C, K>
where
    R: ExperimentRunRepository,
    C: AlgorithmCatalog,
    K: ClusterClient,
{
    pub fn new(
        repository: Arc<R>,
        catalog: Arc<C>,
        cluster: Arc<K>,
        options: StartRunOptions,
    ) -> Self {
        Self {
            repository,
            catalog,
            cluster,
            options,
        }
    }
}

#[async_trait]
impl<R, C, K> StageHandler for StartRunHandler<R, C, K>
where
    R: ExperimentRunRepository,
    C: AlgorithmCatalog,
    K: ClusterClient,
{
    async fn handle(&self, run_id: &str) -> sigex_core::Result<()> {
        let mut run = self.repository.get(run_id).await.map_err(DomainError::from)?;

        if run.trials().is_empty() {
            return Err(DomainError::Precondition(format!(
                "run {run_id} has no trials attached"
            )));
        }

        let graph = graph_name(run_id);
        let config_object = config_object_name(run_id);

        let data = build_trials_config_data(run.trials())?;
        self.cluster
            .create_config_object(&config_object, data)
            .await
            .map_err(DomainError::from)?;

        let steps = self
            .catalog
            .algorithm_steps(&run.hyperparameters.signal_generator_algorithm_id)
            .await
            .map_err(DomainError::from)?;

        let weeks = i64::from(run.hyperparameters.number_of_weeks_duration);
        let start = run.training_end - Duration::days((weeks - 1) * 7);

        let spec = build_workflow_spec(&WorkflowSpecInput {
            run_id: &run.id,
            steps: &steps,
            start,
            end: run.training_end,
            number_of_weeks_historical_data: run
                .hyperparameters
                .number_of_weeks_historical_data,
            number_of_cpu_cores_requested: run.number_of_cpu_cores_requested,
            tickers_raw: run.hyperparameters.tickers_raw.as_deref(),
            tickers_preset: run.hyperparameters.tickers_preset.as_deref(),
            env_vars: &self.options.env_vars,
            config_map_name: &config_object,
            gc_delete_delay: &self.options.gc_delete_delay,
            finalize: &self.options.finalize,
        })?;

        let annotations = BTreeMap::from([(RUN_ID_ANNOTATION.to_string(), run.id.clone())]);
        self.cluster
            .create_execution_graph(&graph, annotations, spec)
            .await
            .map_err(DomainError::from)?;

        run.set_started()?;
        self.repository.save(&run).await.map_err(DomainError::from)?;

        info!(run_id, graph, "execution graph submitted, run moved to Started");
        Ok(())
    }
}
