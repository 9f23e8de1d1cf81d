//! In-memory fakes implementing the port traits for engine tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use sigex_core::{
    AlgorithmStep, ChangeEvent, ExperimentHyperparameters, ExperimentRun, ExperimentStatus,
};
use sigex_ports::{
    AlgorithmCatalog, CatalogError, ChangeSubscriptionSource, ClusterClient, ClusterClientError,
    ExperimentRunRepository, GraphCompletionEvent, RunRepositoryError, SubscriptionError,
    SubscriptionSettings, TrialsGenerator, TrialsGeneratorError,
};

/// Two-week run with a two-step algorithm, in the given status.
pub fn sample_run(id: &str, status: ExperimentStatus) -> ExperimentRun {
    ExperimentRun::new(
        id,
        3,
        NaiveDate::from_ymd_opt(2024, 6, 16).unwrap(),
        Vec::new(),
        ExperimentHyperparameters {
            number_of_weeks_duration: 2,
            number_of_weeks_historical_data: 52,
            tickers_raw: Some("AAPL,MSFT".to_string()),
            tickers_preset: None,
            signal_generator_algorithm_id: "baseline-momentum".to_string(),
        },
        status,
        2,
    )
}

// ===== Change subscription source =====

pub enum SourceAction {
    Event(ChangeEvent),
    Timeout,
    Error(String),
}

#[derive(Default)]
pub struct FakeSubscriptionSource {
    script: Mutex<VecDeque<SourceAction>>,
    declared: Mutex<Vec<Option<u64>>>,
    checkpoints: Mutex<HashMap<String, u64>>,
    commits: Mutex<u32>,
}

impl FakeSubscriptionSource {
    pub fn new(script: Vec<SourceAction>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn declared_cursors(&self) -> Vec<Option<u64>> {
        self.declared.lock().unwrap().clone()
    }

    pub fn checkpoint(&self, subscription: &str) -> Option<u64> {
        self.checkpoints.lock().unwrap().get(subscription).copied()
    }

    pub fn seed_checkpoint(&self, subscription: &str, watermark: u64) {
        self.checkpoints
            .lock()
            .unwrap()
            .insert(subscription.to_string(), watermark);
    }

    pub fn commit_count(&self) -> u32 {
        *self.commits.lock().unwrap()
    }
}

#[async_trait]
impl ChangeSubscriptionSource for FakeSubscriptionSource {
    async fn ensure_subscription(
        &self,
        _settings: &SubscriptionSettings,
    ) -> Result<(), SubscriptionError> {
        Ok(())
    }

    async fn declare_cursor(
        &self,
        _settings: &SubscriptionSettings,
        since: Option<u64>,
    ) -> Result<(), SubscriptionError> {
        self.declared.lock().unwrap().push(since);
        Ok(())
    }

    async fn fetch_next(
        &self,
        _settings: &SubscriptionSettings,
        _timeout: Duration,
    ) -> Result<Option<ChangeEvent>, SubscriptionError> {
        match self.script.lock().unwrap().pop_front() {
            Some(SourceAction::Event(event)) => Ok(Some(event)),
            Some(SourceAction::Timeout) | None => Ok(None),
            Some(SourceAction::Error(detail)) => Err(SubscriptionError::Session(detail)),
        }
    }

    async fn commit_checkpoint(
        &self,
        subscription: &str,
        watermark: u64,
    ) -> Result<(), SubscriptionError> {
        *self.commits.lock().unwrap() += 1;
        let mut checkpoints = self.checkpoints.lock().unwrap();
        let entry = checkpoints.entry(subscription.to_string()).or_insert(0);
        if watermark > *entry {
            *entry = watermark;
        }
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        subscription: &str,
    ) -> Result<Option<u64>, SubscriptionError> {
        Ok(self.checkpoint(subscription))
    }
}

// ===== Experiment run store =====

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: Mutex<HashMap<String, ExperimentRun>>,
    saves: Mutex<Vec<String>>,
    forced_status: Mutex<HashMap<String, String>>,
    status_reads: Mutex<u32>,
}

impl InMemoryRunStore {
    pub fn with_run(run: ExperimentRun) -> Self {
        let store = Self::default();
        store.put(run);
        store
    }

    pub fn put(&self, run: ExperimentRun) {
        self.runs.lock().unwrap().insert(run.id.clone(), run);
    }

    pub fn stored(&self, run_id: &str) -> Option<ExperimentRun> {
        self.runs.lock().unwrap().get(run_id).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.lock().unwrap().len()
    }

    /// Overrides the raw status string reported for a run, regardless of
    /// what the stored aggregate says. Lets tests exercise rows whose
    /// status column holds a value the domain does not know.
    pub fn force_status(&self, run_id: &str, raw: &str) {
        self.forced_status
            .lock()
            .unwrap()
            .insert(run_id.to_string(), raw.to_string());
    }

    pub fn status_read_count(&self) -> u32 {
        *self.status_reads.lock().unwrap()
    }
}

#[async_trait]
impl ExperimentRunRepository for InMemoryRunStore {
    async fn get(&self, run_id: &str) -> Result<ExperimentRun, RunRepositoryError> {
        self.stored(run_id)
            .ok_or_else(|| RunRepositoryError::NotFound(run_id.to_string()))
    }

    async fn get_status(&self, run_id: &str) -> Result<String, RunRepositoryError> {
        *self.status_reads.lock().unwrap() += 1;
        if let Some(raw) = self.forced_status.lock().unwrap().get(run_id) {
            return Ok(raw.clone());
        }
        Ok(self
            .stored(run_id)
            .ok_or_else(|| RunRepositoryError::NotFound(run_id.to_string()))?
            .status()
            .as_str()
            .to_string())
    }

    async fn save(&self, run: &ExperimentRun) -> Result<(), RunRepositoryError> {
        self.saves.lock().unwrap().push(run.id.clone());
        self.put(run.clone());
        Ok(())
    }
}

// ===== Algorithm catalog =====

pub struct StaticCatalog {
    pub space: Vec<u8>,
    pub steps: Vec<AlgorithmStep>,
}

impl StaticCatalog {
    pub fn new(space: &[u8], steps: Vec<AlgorithmStep>) -> Self {
        Self {
            space: space.to_vec(),
            steps,
        }
    }
}

#[async_trait]
impl AlgorithmCatalog for StaticCatalog {
    async fn hyperparameter_space(&self, _algorithm_id: &str) -> Result<Vec<u8>, CatalogError> {
        Ok(self.space.clone())
    }

    async fn algorithm_steps(
        &self,
        _algorithm_id: &str,
    ) -> Result<Vec<AlgorithmStep>, CatalogError> {
        Ok(self.steps.clone())
    }
}

// ===== Trials generator =====

/// Records every generation request; optionally fails at one call index.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: Mutex<Vec<(String, String, Vec<u8>)>>,
    fail_at: Option<usize>,
}

impl ScriptedGenerator {
    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String, Vec<u8>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrialsGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        study: &str,
        trial_id: &str,
        space: &[u8],
    ) -> Result<Vec<u8>, TrialsGeneratorError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((study.to_string(), trial_id.to_string(), space.to_vec()));
            calls.len() - 1
        };

        if self.fail_at == Some(index) {
            return Err(TrialsGeneratorError::ServiceStatus {
                trial_id: trial_id.to_string(),
                status: 503,
            });
        }

        Ok(format!(r#"{{"trial":"{trial_id}","lr":0.01}}"#).into_bytes())
    }
}

// ===== Cluster client =====

/// Mimics the orchestrator's idempotency: a second create with the same
/// name succeeds without a second resource appearing.
#[derive(Default)]
pub struct FakeClusterClient {
    config_objects: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    graphs: Mutex<BTreeMap<String, (BTreeMap<String, String>, serde_json::Value)>>,
    fail_graph_creation: bool,
}

impl FakeClusterClient {
    /// Client whose graph submissions fail with an API error.
    pub fn failing_graph_creation() -> Self {
        Self {
            fail_graph_creation: true,
            ..Default::default()
        }
    }

    pub fn config_object_names(&self) -> Vec<String> {
        self.config_objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn config_object(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.config_objects.lock().unwrap().get(name).cloned()
    }

    pub fn graph_names(&self) -> Vec<String> {
        self.graphs.lock().unwrap().keys().cloned().collect()
    }

    pub fn graph(&self, name: &str) -> Option<(BTreeMap<String, String>, serde_json::Value)> {
        self.graphs.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl ClusterClient for FakeClusterClient {
    async fn create_config_object(
        &self,
        name: &str,
        data: BTreeMap<String, String>,
    ) -> Result<(), ClusterClientError> {
        // "Already exists" is success; the original payload is kept.
        self.config_objects
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert(data);
        Ok(())
    }

    async fn create_execution_graph(
        &self,
        name: &str,
        annotations: BTreeMap<String, String>,
        graph: serde_json::Value,
    ) -> Result<(), ClusterClientError> {
        if self.fail_graph_creation {
            return Err(ClusterClientError::Api("apiserver unavailable".to_string()));
        }
        self.graphs
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert((annotations, graph));
        Ok(())
    }

    async fn delete_execution_graph(&self, name: &str) -> Result<(), ClusterClientError> {
        self.graphs.lock().unwrap().remove(name);
        Ok(())
    }

    fn watch_graph_completion_events(&self) -> BoxStream<'static, GraphCompletionEvent> {
        Box::pin(futures::stream::empty())
    }
}
