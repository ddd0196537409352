//! Test doubles shared by the unit tests of this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use leadpipe_classifier::ContentClassifier;
use leadpipe_providers::{Hosting, ServiceSpec, SourceControl};
use leadpipe_shared::{
    LeadRecord, LeadpipeError, NormalizedRecord, Phase, PipelineConfig, PracticeId, ProvisioningMethod, Result,
    WorkflowResult,
};
use leadpipe_storage::{StoredLead, StructuredStore};

use crate::enrichment::Enricher;
use crate::history::WorkflowHistory;
use crate::persistence::Persister;
use crate::pipeline::{Pipeline, ProgressReporter};
use crate::provisioning::{CascadeRunner, ProvisioningContext, ProvisioningStrategy, StrategyFailure, StrategyOutput};

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub(crate) enum FakeClassifier {
    /// Search returns this text.
    Text(String),
    /// Search fails as if no API key were configured.
    Fail,
    Panic,
    /// Search answers only after the given delay.
    Slow(Duration),
}

#[async_trait]
impl ContentClassifier for FakeClassifier {
    async fn search(&self, _query: &str, _scope_host: &str) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Fail => Err(LeadpipeError::config("search credential not set")),
            Self::Panic => panic!("classifier exploded"),
            Self::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok("too late".into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

enum StoreMode {
    Ok,
    Failing,
    Slow(Duration),
}

pub(crate) struct FakeStore {
    mode: StoreMode,
    calls: AtomicUsize,
    /// Records accepted in `Ok` mode, oldest first.
    rows: Mutex<Vec<NormalizedRecord>>,
}

impl FakeStore {
    fn with_mode(mode: StoreMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
            rows: Mutex::new(Vec::new()),
        }
    }

    /// A healthy store already holding `records`.
    pub(crate) fn seeded(records: Vec<NormalizedRecord>) -> Self {
        let store = Self::ok();
        *store.rows.lock().unwrap() = records;
        store
    }

    fn check(&self) -> Result<()> {
        match self.mode {
            StoreMode::Failing => Err(LeadpipeError::Storage("store down".into())),
            _ => Ok(()),
        }
    }

    pub(crate) fn ok() -> Self {
        Self::with_mode(StoreMode::Ok)
    }

    pub(crate) fn failing() -> Self {
        Self::with_mode(StoreMode::Failing)
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self::with_mode(StoreMode::Slow(delay))
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StructuredStore for FakeStore {
    async fn upsert(&self, record: &NormalizedRecord) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            StoreMode::Ok => {
                self.rows.lock().unwrap().push(record.clone());
                Ok("rec-1".into())
            }
            StoreMode::Failing => Err(LeadpipeError::Storage("store down".into())),
            StoreMode::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok("rec-slow".into())
            }
        }
    }

    async fn find_by_practice_id(&self, practice_id: &PracticeId) -> Result<Option<StoredLead>> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().rev().find(|r| &r.practice_id == practice_id).map(stored))
    }

    async fn list(&self, limit: u32) -> Result<Vec<StoredLead>> {
        self.check()?;
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().take(limit as usize).map(stored).collect())
    }

    async fn count(&self) -> Result<u64> {
        self.check()?;
        Ok(self.rows.lock().unwrap().len() as u64)
    }
}

fn stored(record: &NormalizedRecord) -> StoredLead {
    StoredLead {
        record_id: "rec-1".into(),
        lead: record.clone(),
        updated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub(crate) struct FakeSourceControl {
    pub fail_create: bool,
    pub fail_find: bool,
}

impl FakeSourceControl {
    pub(crate) fn healthy() -> Self {
        Self::default()
    }

    pub(crate) fn broken() -> Self {
        Self {
            fail_create: true,
            fail_find: true,
        }
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn create_repo(&self, name: &str, _description: &str) -> Result<String> {
        if self.fail_create {
            return Err(LeadpipeError::from_status("github", 422, "name already exists"));
        }
        Ok(format!("https://git.example.com/{name}"))
    }

    async fn find_repo(&self, name: &str) -> Result<Option<String>> {
        if self.fail_find {
            return Err(LeadpipeError::from_status("github", 401, "bad credentials"));
        }
        Ok(Some(format!("https://git.example.com/{name}")))
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeHosting {
    fail: bool,
    /// Answer only after this delay.
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl FakeHosting {
    pub(crate) fn healthy() -> Self {
        Self::default()
    }

    pub(crate) fn broken() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(crate) fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Hosting for FakeHosting {
    async fn create_service(&self, spec: &ServiceSpec) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(LeadpipeError::from_status("render", 503, "service unavailable"));
        }
        Ok(format!("https://{}.hosting.example.com", spec.name))
    }
}

pub(crate) struct PanickingStrategy;

#[async_trait]
impl ProvisioningStrategy for PanickingStrategy {
    fn method(&self) -> ProvisioningMethod {
        ProvisioningMethod::FullCreate
    }

    async fn attempt(&self, _ctx: &ProvisioningContext) -> std::result::Result<StrategyOutput, StrategyFailure> {
        panic!("strategy exploded")
    }
}

/// A no-dependency strategy that fails anyway, so the cascade can run dry.
pub(crate) struct BrokenTerminal;

#[async_trait]
impl ProvisioningStrategy for BrokenTerminal {
    fn method(&self) -> ProvisioningMethod {
        ProvisioningMethod::Mock
    }

    fn requires_external(&self) -> bool {
        false
    }

    async fn attempt(&self, _ctx: &ProvisioningContext) -> std::result::Result<StrategyOutput, StrategyFailure> {
        Err(LeadpipeError::Internal("mock deployment broken".into()).into())
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct RecordingProgress {
    pub phases: Mutex<Vec<(String, Phase)>>,
    /// Window sizes in the order they started.
    pub windows: Mutex<Vec<usize>>,
    pub done: Mutex<Vec<String>>,
}

impl ProgressReporter for RecordingProgress {
    fn phase(&self, target: &str, phase: Phase) {
        self.phases.lock().unwrap().push((target.to_string(), phase));
    }

    fn window(&self, _index: usize, _total: usize, size: usize) {
        self.windows.lock().unwrap().push(size);
    }

    fn done(&self, result: &WorkflowResult) {
        self.done.lock().unwrap().push(result.target.clone());
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub(crate) fn sample_lead() -> LeadRecord {
    LeadRecord {
        company: "Bright Smile Dental".into(),
        domain: "brightsmile.example.com".into(),
        source_url: "https://brightsmile.example.com/".into(),
        location: "Austin, TX".into(),
        phone: Some("(512) 555-0134".into()),
        email: Some("hello@brightsmile.example.com".into()),
        services: vec!["General Dentistry".into(), "Teeth Whitening".into()],
        treatments: vec!["Invisalign".into()],
        specializations: vec!["Pediatric".into()],
        practice_type: "dental".into(),
        lead_score: 84,
        practice_id: PracticeId::generate("Bright Smile Dental"),
        enrichment_succeeded: true,
        created_at: Utc::now(),
    }
}

pub(crate) fn sample_normalized() -> NormalizedRecord {
    crate::normalize::normalize(&sample_lead())
}

/// Config with no pacing and short timeouts.
pub(crate) fn fast_config() -> PipelineConfig {
    PipelineConfig {
        concurrency: 3,
        batch_delay: Duration::ZERO,
        strategy_pacing: Duration::ZERO,
        provision: false,
        history_capacity: 50,
        search_timeout: Duration::from_millis(200),
        store_timeout: Duration::from_millis(200),
        provider_timeout: Duration::from_secs(1),
    }
}

/// A pipeline over test doubles.
pub(crate) fn pipeline_with(
    config: PipelineConfig,
    classifier: FakeClassifier,
    store: Option<Arc<FakeStore>>,
    source_control: FakeSourceControl,
    hosting: FakeHosting,
) -> Pipeline {
    let enricher = Enricher::new(Arc::new(classifier), config.search_timeout);
    let persister = Persister::new(
        store.map(|s| s as Arc<dyn StructuredStore>),
        config.store_timeout,
    );
    let cascade = CascadeRunner::standard(
        Arc::new(source_control),
        Arc::new(hosting),
        "practice-site-template",
        config.provider_timeout,
        config.strategy_pacing,
    );
    let history = Arc::new(WorkflowHistory::new(config.history_capacity));
    Pipeline::new(config, enricher, persister, cascade, history)
}

/// A pipeline whose classifier fails and whose store is healthy.
pub(crate) fn degraded_pipeline() -> Pipeline {
    pipeline_with(
        fast_config(),
        FakeClassifier::Fail,
        Some(Arc::new(FakeStore::ok())),
        FakeSourceControl::broken(),
        FakeHosting::broken(),
    )
}
