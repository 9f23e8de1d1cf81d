//! Postgres Experiment Run Repository
//!
//! Reads and writes the run aggregate against the orchestration store.
//! Trial inserts are idempotent so a replayed save after a crash does not
//! duplicate rows.

use async_trait::async_trait;
use chrono::NaiveDate;
use sigex_core::{ExperimentHyperparameters, ExperimentRun, ExperimentStatus, Trial};
use sigex_ports::{ExperimentRunRepository, RunRepositoryError};
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::db::{EXPERIMENT_RUNS_TABLE, ORCHESTRATION_SCHEMA, TRIALS_TABLE};

pub struct PostgresRunRepository {
    pool: PgPool,
}

/// Trial ids end in a generation index, so plain lexicographic order puts
/// `_10` before `_2`. Shorter id first restores generation order.
fn sort_into_generation_order(trials: &mut [Trial]) {
    trials.sort_by(|a, b| (a.id.len(), &a.id).cmp(&(b.id.len(), &b.id)));
}

impl PostgresRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExperimentRunRepository for PostgresRunRepository {
    async fn get(&self, run_id: &str) -> Result<ExperimentRun, RunRepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT number_of_trials, training_end, hyperparameters, \
             number_of_cpu_cores_requested, status \
             FROM {ORCHESTRATION_SCHEMA}.{EXPERIMENT_RUNS_TABLE} WHERE id = $1"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RunRepositoryError::Database(e.to_string()))?
        .ok_or_else(|| RunRepositoryError::NotFound(run_id.to_string()))?;

        let number_of_trials: i32 = row
            .try_get("number_of_trials")
            .map_err(|e| RunRepositoryError::Database(e.to_string()))?;
        let training_end: NaiveDate = row
            .try_get("training_end")
            .map_err(|e| RunRepositoryError::Database(e.to_string()))?;
        let number_of_cpu_cores_requested: i32 = row
            .try_get("number_of_cpu_cores_requested")
            .map_err(|e| RunRepositoryError::Database(e.to_string()))?;
        let status_raw: String = row
            .try_get("status")
            .map_err(|e| RunRepositoryError::Database(e.to_string()))?;
        let hyperparameters_json: serde_json::Value = row
            .try_get("hyperparameters")
            .map_err(|e| RunRepositoryError::Database(e.to_string()))?;

        let hyperparameters: ExperimentHyperparameters =
            serde_json::from_value(hyperparameters_json).map_err(|e| {
                RunRepositoryError::Validation(format!(
                    "run {run_id} holds undecodable hyperparameters: {e}"
                ))
            })?;
        let status: ExperimentStatus = status_raw
            .parse()
            .map_err(|_| RunRepositoryError::Validation(format!("unknown status {status_raw}")))?;

        let trial_rows = sqlx::query(&format!(
            "SELECT id, hyperparameters FROM {ORCHESTRATION_SCHEMA}.{TRIALS_TABLE} \
             WHERE signal_generator_experiment_run_id = $1 ORDER BY id"
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RunRepositoryError::Database(e.to_string()))?;

        let mut trials = Vec::with_capacity(trial_rows.len());
        for trial_row in trial_rows {
            let id: String = trial_row
                .try_get("id")
                .map_err(|e| RunRepositoryError::Database(e.to_string()))?;
            let hyperparameters: Option<serde_json::Value> = trial_row
                .try_get("hyperparameters")
                .map_err(|e| RunRepositoryError::Database(e.to_string()))?;
            let raw = match hyperparameters {
                Some(value) => serde_json::to_vec(&value)
                    .map_err(|e| RunRepositoryError::Validation(e.to_string()))?,
                None => Vec::new(),
            };
            trials.push(Trial::new(id, raw));
        }
        sort_into_generation_order(&mut trials);

        debug!(run_id, trials = trials.len(), "loaded experiment run");
        Ok(ExperimentRun::new(
            run_id,
            number_of_trials,
            training_end,
            trials,
            hyperparameters,
            status,
            number_of_cpu_cores_requested,
        ))
    }

    async fn get_status(&self, run_id: &str) -> Result<String, RunRepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT status FROM {ORCHESTRATION_SCHEMA}.{EXPERIMENT_RUNS_TABLE} WHERE id = $1"
        ))
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RunRepositoryError::Database(e.to_string()))?
        .ok_or_else(|| RunRepositoryError::NotFound(run_id.to_string()))?;

        row.try_get("status")
            .map_err(|e| RunRepositoryError::Database(e.to_string()))
    }

    async fn save(&self, run: &ExperimentRun) -> Result<(), RunRepositoryError> {
        if run.trials().is_empty() {
            return Err(RunRepositoryError::Validation(format!(
                "refusing to save run {} without trials",
                run.id
            )));
        }

        let hyperparameters = serde_json::to_value(&run.hyperparameters)
            .map_err(|e| RunRepositoryError::Validation(e.to_string()))?;

        sqlx::query(&format!(
            "UPDATE {ORCHESTRATION_SCHEMA}.{EXPERIMENT_RUNS_TABLE} SET \
             number_of_trials = $2, status = $3, training_end = $4, \
             hyperparameters = $5, number_of_cpu_cores_requested = $6, \
             updated_at = now() WHERE id = $1"
        ))
        .bind(&run.id)
        .bind(run.number_of_trials)
        .bind(run.status().as_str())
        .bind(run.training_end)
        .bind(&hyperparameters)
        .bind(run.number_of_cpu_cores_requested)
        .execute(&self.pool)
        .await
        .map_err(|e| RunRepositoryError::Database(e.to_string()))?;

        for trial in run.trials() {
            let hp_text = if trial.hyperparameters_raw.is_empty() {
                None
            } else {
                Some(
                    std::str::from_utf8(&trial.hyperparameters_raw)
                        .map_err(|e| RunRepositoryError::Validation(e.to_string()))?
                        .to_string(),
                )
            };

            sqlx::query(&format!(
                "INSERT INTO {ORCHESTRATION_SCHEMA}.{TRIALS_TABLE} \
                 (id, signal_generator_experiment_run_id, hyperparameters) \
                 SELECT $1, $2, CASE WHEN $3::text IS NULL THEN NULL ELSE $3::jsonb END \
                 WHERE NOT EXISTS (\
                 SELECT 1 FROM {ORCHESTRATION_SCHEMA}.{TRIALS_TABLE} t WHERE t.id = $1)"
            ))
            .bind(&trial.id)
            .bind(&run.id)
            .bind(hp_text)
            .execute(&self.pool)
            .await
            .map_err(|e| RunRepositoryError::Database(e.to_string()))?;
        }

        debug!(run_id = %run.id, status = %run.status(), "saved experiment run");
        Ok(())
    }
}
