//! Run initialization stage
//!
//! Handles runs in status `None`: fetches the algorithm's hyperparameter
//! space, asks the trials generator for one suggestion per requested
//! trial, attaches the trials and advances the run to `Starting`.

use std::sync::Arc;

use async_trait::async_trait;
use sigex_core::{DomainError, Trial};
use sigex_ports::{AlgorithmCatalog, ExperimentRunRepository, TrialsGenerator};
use tracing::{debug, info};

use crate::dispatcher::StageHandler;

pub struct InitRunHandler<R, C, G> {
    repository: Arc<R>,
    catalog: Arc<C>,
    generator: Arc<G>,
}

impl<R, C, G> InitRunHandler<R, C, G>
where
    R: ExperimentRunRepository,
    C: AlgorithmCatalog,
    G: TrialsGenerator,
{
    pub fn new(repository: Arc<R>, catalog: Arc<C>, generator: Arc<G>) -> Self {
        Self {
            repository,
            catalog,
            generator,
        }
    }
}

#[async_trait]
impl<R, C, G> StageHandler for InitRunHandler<R, C, G>
where
    R: ExperimentRunRepository,
    C: AlgorithmCatalog,
    G: TrialsGenerator,
{
    async fn handle(&self, run_id: &str) -> sigex_core::Result<()> {
        let mut run = self.repository.get(run_id).await.map_err(DomainError::from)?;

        if run.number_of_trials <= 0 {
            return Err(DomainError::Precondition(format!(
                "run {run_id} requests {} trials",
                run.number_of_trials
            )));
        }

        let algorithm_id = &run.hyperparameters.signal_generator_algorithm_id;
        let space = self
            .catalog
            .hyperparameter_space(algorithm_id)
            .await
            .map_err(DomainError::from)?;

        // Sequential on purpose: the study sampler conditions each
        // suggestion on the ones already recorded. The study is the
        // algorithm id, so every run of one algorithm feeds the same
        // sampler history. The first failure aborts the whole batch and
        // the event retries from scratch.
        let mut trials = Vec::with_capacity(run.number_of_trials as usize);
        for i in 0..run.number_of_trials {
            let trial_id = format!("{run_id}_{i}");
            let hyperparameters = self
                .generator
                .generate(algorithm_id, &trial_id, &space)
                .await
                .map_err(DomainError::from)?;
            debug!(run_id, trial_id, "trial suggestion received");
            trials.push(Trial::new(trial_id, hyperparameters));
        }

        run.initialize(trials)?;
        self.repository.save(&run).await.map_err(DomainError::from)?;

        info!(
            run_id,
            trials = run.trials().len(),
            "run initialized and moved to Starting"
        );
        Ok(())
    }
}
