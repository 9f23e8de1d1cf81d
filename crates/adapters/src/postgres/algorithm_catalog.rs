//! Postgres Algorithm Catalog
//!
//! Single-row reads from the algorithm table: the hyperparameter search
//! space and the ordered container step list, both stored as JSON.

use async_trait::async_trait;
use sigex_core::AlgorithmStep;
use sigex_ports::{AlgorithmCatalog, CatalogError};
use sqlx::{PgPool, Row};

use crate::db::{ALGORITHMS_TABLE, ORCHESTRATION_SCHEMA};

pub struct PostgresAlgorithmCatalog {
    pool: PgPool,
}

impl PostgresAlgorithmCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_column(
        &self,
        column: &str,
        algorithm_id: &str,
    ) -> Result<serde_json::Value, CatalogError> {
        let row = sqlx::query(&format!(
            "SELECT {column} FROM {ORCHESTRATION_SCHEMA}.{ALGORITHMS_TABLE} WHERE id = $1"
        ))
        .bind(algorithm_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CatalogError::Database(e.to_string()))?
        .ok_or_else(|| CatalogError::NotFound(algorithm_id.to_string()))?;

        let value: Option<serde_json::Value> = row
            .try_get(column)
            .map_err(|e| CatalogError::Database(e.to_string()))?;
        value.ok_or_else(|| CatalogError::Malformed {
            algorithm_id: algorithm_id.to_string(),
            detail: format!("{column} is null"),
        })
    }
}

#[async_trait]
impl AlgorithmCatalog for PostgresAlgorithmCatalog {
    async fn hyperparameter_space(&self, algorithm_id: &str) -> Result<Vec<u8>, CatalogError> {
        let space = self
            .fetch_column("hyperparameter_space", algorithm_id)
            .await?;
        serde_json::to_vec(&space).map_err(|e| CatalogError::Malformed {
            algorithm_id: algorithm_id.to_string(),
            detail: e.to_string(),
        })
    }

    async fn algorithm_steps(&self, algorithm_id: &str) -> Result<Vec<AlgorithmStep>, CatalogError> {
        let steps = self.fetch_column("algorithm_steps", algorithm_id).await?;
        serde_json::from_value(steps).map_err(|e| CatalogError::Malformed {
            algorithm_id: algorithm_id.to_string(),
            detail: e.to_string(),
        })
    }
}
