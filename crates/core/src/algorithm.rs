//! Algorithm pipeline definition
//!
//! One containerized stage of the per-week processing pipeline, as stored in
//! the algorithm catalog. The step list is ordered and immutable once read
//! for a run.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AlgorithmStep {
    pub name: String,
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commands: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

impl AlgorithmStep {
    /// Fully qualified container image, defaulting the tag to `latest`.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.image, self.version.as_deref().unwrap_or("latest"))
    }
}
