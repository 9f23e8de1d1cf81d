//! Trials config payload
//!
//! Serializes a run's trials into the single-file config object mounted
//! into every workflow pod. The consumer binds the document with
//! PascalCase keys, so the shape here is part of the contract.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::value::RawValue;
use sigex_core::{DomainError, Trial};

/// File name the trainer reads from the mounted config volume.
pub const TRIALS_FILE_NAME: &str = "trials.json";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TrialsDocument<'a> {
    trials: Vec<TrialEntry<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TrialEntry<'a> {
    id: &'a str,
    hyperparameters: &'a RawValue,
}

/// Renders the trials into the `trials.json` config-object data map.
///
/// # Errors
/// `DomainError::Precondition` when the trial list is empty or a trial's
/// hyperparameters are not valid JSON.
pub fn build_trials_config_data(trials: &[Trial]) -> sigex_core::Result<BTreeMap<String, String>> {
    if trials.is_empty() {
        return Err(DomainError::Precondition(
            "cannot render config for an empty trial list".to_string(),
        ));
    }

    let mut entries = Vec::with_capacity(trials.len());
    for trial in trials {
        let raw = std::str::from_utf8(&trial.hyperparameters_raw)
            .ok()
            .and_then(|text| serde_json::from_str::<&RawValue>(text).ok())
            .ok_or_else(|| {
                DomainError::Precondition(format!(
                    "trial {} holds hyperparameters that are not valid JSON",
                    trial.id
                ))
            })?;
        entries.push(TrialEntry {
            id: &trial.id,
            hyperparameters: raw,
        });
    }

    let document = serde_json::to_string(&TrialsDocument { trials: entries })
        .map_err(|err| DomainError::Infrastructure(err.to_string()))?;

    Ok(BTreeMap::from([(TRIALS_FILE_NAME.to_string(), document)]))
}
