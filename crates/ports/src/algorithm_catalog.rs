//! Algorithm Catalog Port
//!
//! Read-only access to the signal-generator algorithm catalog: the
//! hyperparameter-space document and the ordered step list for one
//! algorithm id.

use async_trait::async_trait;
use sigex_core::AlgorithmStep;

#[async_trait]
pub trait AlgorithmCatalog: Send + Sync {
    /// Hyperparameter-space document as raw JSON bytes, passed through to
    /// the hyperparameter-generation service unmodified.
    async fn hyperparameter_space(&self, algorithm_id: &str) -> Result<Vec<u8>, CatalogError>;

    /// Ordered per-week pipeline steps for the algorithm.
    async fn algorithm_steps(&self, algorithm_id: &str)
        -> Result<Vec<AlgorithmStep>, CatalogError>;
}

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("algorithm not found: {0}")]
    NotFound(String),

    #[error("malformed catalog entry for {algorithm_id}: {detail}")]
    Malformed { algorithm_id: String, detail: String },

    #[error("database error: {0}")]
    Database(String),
}

impl From<CatalogError> for sigex_core::DomainError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => Self::NotFound(id),
            CatalogError::Malformed { .. } => Self::Validation(err.to_string()),
            CatalogError::Database(detail) => Self::Infrastructure(detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_trait_is_object_safe() {
        let _catalog: Option<Box<dyn AlgorithmCatalog>> = None;
    }

    #[test]
    fn test_catalog_error_display() {
        let err = CatalogError::Malformed {
            algorithm_id: "algoA".to_string(),
            detail: "steps column is not JSON".to_string(),
        };
        assert!(err.to_string().contains("algoA"));
    }
}
