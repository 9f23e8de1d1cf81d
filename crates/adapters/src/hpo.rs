//! Hyperparameter Optimization Service Client
//!
//! Asks the HPO service to suggest hyperparameters for one trial of a
//! study. The study is keyed by algorithm id so every run of one
//! algorithm shares sampler history.

use async_trait::async_trait;
use serde::Deserialize;
use sigex_ports::{TrialsGenerator, TrialsGeneratorError};
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTrialResult {
    #[allow(dead_code)]
    trial_id: String,
    hyperparameters: serde_json::Value,
}

pub struct HpoClient {
    http: reqwest::Client,
    base_url: String,
}

impl HpoClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TrialsGenerator for HpoClient {
    async fn generate(
        &self,
        study: &str,
        trial_id: &str,
        space: &[u8],
    ) -> Result<Vec<u8>, TrialsGeneratorError> {
        let space: serde_json::Value = serde_json::from_slice(space)
            .map_err(|e| TrialsGeneratorError::InvalidSpace(e.to_string()))?;

        let url = format!("{}/studies/{study}/trials/{trial_id}", self.base_url);
        debug!(%url, "requesting trial suggestion");

        let response = self
            .http
            .post(&url)
            .json(&space)
            .send()
            .await
            .map_err(|e| TrialsGeneratorError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TrialsGeneratorError::ServiceStatus {
                trial_id: trial_id.to_string(),
                status: response.status().as_u16(),
            });
        }

        let result: CreateTrialResult = response
            .json()
            .await
            .map_err(|e| TrialsGeneratorError::Transport(e.to_string()))?;

        serde_json::to_vec(&result.hyperparameters)
            .map_err(|e| TrialsGeneratorError::Transport(e.to_string()))
    }
}
