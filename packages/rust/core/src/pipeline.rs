//! Phase orchestrator: target URL → enrichment → validation → persistence →
//! provisioning → [`WorkflowResult`].
//!
//! Each phase runs behind [`isolate`]: when a phase's own logic panics, the
//! orchestrator substitutes a synthetic outcome flagged `isolated` and keeps
//! going. Only an unparseable target is returned as an error.

use std::sync::Arc;

use chrono::Utc;
use leadpipe_classifier::SearchClassifier;
use leadpipe_providers::{GitHubClient, Notifier, RenderClient, TelegramNotifier};
use leadpipe_shared::{
    AppConfig, LeadRecord, OverallStatus, Phase, PhaseOutcome, PipelineConfig, ProvisioningMethod,
    ProvisioningResult, Result, WorkflowPhases, WorkflowResult, WorkflowTiming, expand_home,
};
use leadpipe_storage::{LeadStore, StructuredStore};
use tracing::{error, info, instrument, warn};

use crate::enrichment::{Enricher, Enrichment, fallback_lead, parse_target};
use crate::history::WorkflowHistory;
use crate::isolate::isolate;
use crate::normalize::{minimal_record, normalize};
use crate::persistence::{self, Persister};
use crate::provisioning::CascadeRunner;

/// Error recorded on a workflow whose provisioning cascade ran dry.
pub const CASCADE_EXHAUSTED: &str = "provisioning cascade exhausted";

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when a workflow enters a phase.
    fn phase(&self, target: &str, phase: Phase);
    /// Called when a batch window starts.
    fn window(&self, index: usize, total: usize, size: usize);
    /// Called when a workflow finishes.
    fn done(&self, result: &WorkflowResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _target: &str, _phase: Phase) {}
    fn window(&self, _index: usize, _total: usize, _size: usize) {}
    fn done(&self, _result: &WorkflowResult) {}
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkflowOptions {
    /// Run the provisioning cascade after persistence.
    pub provision: bool,
}

/// The orchestrator and everything it drives.
pub struct Pipeline {
    pub(crate) config: PipelineConfig,
    pub(crate) enricher: Enricher,
    pub(crate) persister: Persister,
    pub(crate) cascade: CascadeRunner,
    pub(crate) history: Arc<WorkflowHistory>,
    notifier: Option<(Arc<dyn Notifier>, String)>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        enricher: Enricher,
        persister: Persister,
        cascade: CascadeRunner,
        history: Arc<WorkflowHistory>,
    ) -> Self {
        Self {
            config,
            enricher,
            persister,
            cascade,
            history,
            notifier: None,
        }
    }

    /// Send a summary of every finished workflow to `recipient`.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, recipient: impl Into<String>) -> Self {
        self.notifier = Some((notifier, recipient.into()));
        self
    }

    /// Wire the real capability clients from the user config.
    ///
    /// A store that cannot be opened is logged and left out; persistence then
    /// always falls back to local record ids.
    pub async fn from_app_config(app: &AppConfig, config: PipelineConfig) -> Result<Self> {
        let classifier = SearchClassifier::from_config(&app.search, config.search_timeout)?;
        if !classifier.is_enabled() {
            warn!(env = %app.search.api_key_env, "search API key not set, enrichment will use baseline records");
        }
        let enricher = Enricher::new(Arc::new(classifier), config.search_timeout);

        let store: Option<Arc<dyn StructuredStore>> = match &app.store.path {
            Some(path) => match LeadStore::open(&expand_home(path)).await {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    warn!(%path, error = %e, "could not open lead store, persistence will fall back");
                    None
                }
            },
            None => None,
        };
        let persister = Persister::new(store, config.store_timeout);

        let cascade = CascadeRunner::standard(
            Arc::new(GitHubClient::from_config(&app.source_control, config.provider_timeout)?),
            Arc::new(RenderClient::from_config(&app.hosting, config.provider_timeout)?),
            &app.source_control.template_repo,
            config.provider_timeout,
            config.strategy_pacing,
        );

        let history = Arc::new(WorkflowHistory::new(config.history_capacity));
        let pipeline = Self::new(config, enricher, persister, cascade, history);

        match &app.notify.chat_id {
            Some(chat_id) => {
                let notifier = TelegramNotifier::from_config(&app.notify, pipeline.config.provider_timeout)?;
                Ok(pipeline.with_notifier(Arc::new(notifier), chat_id.clone()))
            }
            None => Ok(pipeline),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn history(&self) -> &Arc<WorkflowHistory> {
        &self.history
    }

    pub fn persister(&self) -> &Persister {
        &self.persister
    }

    /// Run one workflow end to end.
    ///
    /// 1. Enrichment: classifier lookup, baseline record on any failure
    /// 2. Validation: normalize the record
    /// 3. Persistence: store upsert, local id on any failure
    /// 4. Provisioning (optional): strategy cascade
    #[instrument(skip_all, fields(target = %input))]
    pub async fn run_workflow(
        &self,
        input: &str,
        options: &WorkflowOptions,
        progress: &dyn ProgressReporter,
    ) -> Result<WorkflowResult> {
        let started_at = Utc::now();
        let target = parse_target(input)?;
        info!(host = %target.host, provision = options.provision, "starting workflow");

        let mut phases = WorkflowPhases::default();

        // --- Phase 1: Enrichment ---
        progress.phase(input, Phase::Enrichment);
        let enrichment = match isolate(self.enricher.enrich_target(&target)).await {
            Ok(Enrichment {
                record,
                fallback_reason: None,
            }) => PhaseOutcome::ok(record),
            Ok(Enrichment {
                record,
                fallback_reason: Some(reason),
            }) => PhaseOutcome::fallback(record, Some(reason)),
            Err(panic) => {
                error!(phase = %Phase::Enrichment, %panic, "phase panicked, using synthetic outcome");
                PhaseOutcome::isolated(fallback_lead(&target), format!("enrichment panicked: {panic}"))
            }
        };
        let lead = enrichment.data.clone();
        info!(practice_id = %lead.practice_id, score = lead.lead_score, "enrichment finished");
        phases.enrichment = Some(enrichment);

        // --- Phase 2: Validation ---
        progress.phase(input, Phase::Validation);
        let validation = match isolate(async { normalize(&lead) }).await {
            Ok(record) => PhaseOutcome::ok(record),
            Err(panic) => {
                error!(phase = %Phase::Validation, %panic, "phase panicked, using synthetic outcome");
                PhaseOutcome::isolated(minimal_record(&lead), format!("validation panicked: {panic}"))
            }
        };
        let normalized = validation.data.clone();
        phases.validation = Some(validation);

        // --- Phase 3: Persistence ---
        progress.phase(input, Phase::Persistence);
        let persistence = match isolate(self.persister.persist(&normalized)).await {
            Ok(persisted) if persisted.is_fallback => {
                let reason = persisted.fallback_reason.clone();
                PhaseOutcome::fallback(persisted, reason)
            }
            Ok(persisted) => PhaseOutcome::ok(persisted),
            Err(panic) => {
                error!(phase = %Phase::Persistence, %panic, "phase panicked, using synthetic outcome");
                let message = format!("persistence panicked: {panic}");
                PhaseOutcome::isolated(persistence::fallback(&normalized, message.clone()), message)
            }
        };
        info!(record_id = %persistence.data.record_id, fallback = persistence.used_fallback, "persistence finished");
        phases.persistence = Some(persistence);

        // --- Phase 4: Provisioning ---
        let mut exhausted = false;
        if options.provision {
            progress.phase(input, Phase::Provisioning);
            let outcome = self.provisioning_outcome(&lead).await;
            exhausted = outcome.data.method == ProvisioningMethod::AllFailed;
            info!(method = %outcome.data.method, "provisioning finished");
            phases.provisioning = Some(outcome);
        }

        let overall_status = if exhausted {
            OverallStatus::Failed
        } else {
            phases.overall_status()
        };

        let result = WorkflowResult {
            target: input.to_string(),
            practice_id: Some(lead.practice_id.clone()),
            overall_status,
            phases,
            timing: WorkflowTiming::since(started_at),
            error: exhausted.then(|| CASCADE_EXHAUSTED.to_string()),
        };

        info!(
            practice_id = %lead.practice_id,
            status = %result.overall_status,
            elapsed_s = result.timing.duration_seconds,
            "workflow complete"
        );

        self.history.push(result.clone()).await;
        self.notify(&lead, &result);
        progress.done(&result);

        Ok(result)
    }

    /// Run the cascade for `lead` and wrap it as a phase outcome.
    pub(crate) async fn provisioning_outcome(&self, lead: &LeadRecord) -> PhaseOutcome<ProvisioningResult> {
        let result = match isolate(self.cascade.provision(lead)).await {
            Ok(result) => result,
            Err(panic) => {
                error!(phase = %Phase::Provisioning, %panic, "phase panicked, using synthetic outcome");
                let message = format!("provisioning panicked: {panic}");
                return PhaseOutcome::isolated(exhausted_result(message.clone()), message);
            }
        };

        match result.method {
            ProvisioningMethod::Mock => {
                PhaseOutcome::fallback(result, Some("provisioned with mock deployment".into()))
            }
            ProvisioningMethod::AllFailed => {
                let error = result.error.clone().unwrap_or_else(|| CASCADE_EXHAUSTED.into());
                PhaseOutcome::failed(result, error)
            }
            _ => PhaseOutcome::ok(result),
        }
    }

    /// Fire-and-forget summary message; failures are logged only.
    fn notify(&self, lead: &LeadRecord, result: &WorkflowResult) {
        let Some((notifier, recipient)) = &self.notifier else {
            return;
        };

        let mut text = format!(
            "Lead processed: {} ({}) score {} status {}",
            lead.company, lead.domain, lead.lead_score, result.overall_status
        );
        if let Some(url) = result
            .phases
            .provisioning
            .as_ref()
            .and_then(|o| o.data.service_url.as_deref())
        {
            text.push_str(&format!(" site {url}"));
        }

        let notifier = notifier.clone();
        let recipient = recipient.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.send(&recipient, &text).await {
                warn!(error = %e, "notification not delivered");
            }
        });
    }
}

/// Synthetic cascade result for a runner that crashed outright.
pub(crate) fn exhausted_result(error: String) -> ProvisioningResult {
    ProvisioningResult {
        method: ProvisioningMethod::AllFailed,
        success: false,
        repo_url: None,
        service_url: None,
        error: Some(error),
        attempts: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::testing::{
        BrokenTerminal, FakeClassifier, FakeHosting, FakeSourceControl, FakeStore, RecordingProgress,
        degraded_pipeline, fast_config, pipeline_with,
    };

    #[tokio::test]
    async fn disabled_classifier_end_to_end() {
        let pipeline = degraded_pipeline();
        let result = pipeline
            .run_workflow("https://drsmith-dental.example.com", &WorkflowOptions::default(), &SilentProgress)
            .await
            .unwrap();

        let lead = &result.phases.enrichment.as_ref().unwrap().data;
        assert_eq!(lead.company, "Drsmith Dental Healthcare");
        assert_eq!(lead.services, vec!["Healthcare Services"]);
        assert_eq!(lead.treatments, vec!["Consultation"]);
        assert!((50..=60).contains(&lead.lead_score));
        assert!(!lead.enrichment_succeeded);

        assert_eq!(result.overall_status, OverallStatus::PartialSuccess);
        assert!(result.phases.enrichment.as_ref().unwrap().used_fallback);
        assert!(result.phases.validation.as_ref().unwrap().is_clean());
        assert_eq!(result.phases.persistence.as_ref().unwrap().data.record_id, "rec-1");
        assert!(result.phases.provisioning.is_none());
        assert_eq!(result.practice_id.as_ref(), Some(&lead.practice_id));
    }

    #[tokio::test]
    async fn clean_run_is_complete() {
        let text = std::fs::read_to_string("../../../fixtures/text/dental_practice.txt").unwrap();
        let pipeline = pipeline_with(
            fast_config(),
            FakeClassifier::Text(text),
            Some(Arc::new(FakeStore::ok())),
            FakeSourceControl::healthy(),
            FakeHosting::healthy(),
        );
        let progress = RecordingProgress::default();
        let result = pipeline
            .run_workflow("brightsmile.example.com", &WorkflowOptions { provision: true }, &progress)
            .await
            .unwrap();

        assert_eq!(result.overall_status, OverallStatus::Complete);
        let provisioning = result.phases.provisioning.as_ref().unwrap();
        assert_eq!(provisioning.data.method, ProvisioningMethod::FullCreate);
        assert!(result.error.is_none());

        let phases: Vec<Phase> = progress.phases.lock().unwrap().iter().map(|(_, p)| *p).collect();
        assert_eq!(
            phases,
            vec![Phase::Enrichment, Phase::Validation, Phase::Persistence, Phase::Provisioning]
        );
        assert_eq!(progress.done.lock().unwrap().len(), 1);
        assert_eq!(pipeline.history().len().await, 1);
    }

    #[tokio::test]
    async fn everything_down_still_produces_a_result() {
        let pipeline = pipeline_with(
            fast_config(),
            FakeClassifier::Fail,
            Some(Arc::new(FakeStore::failing())),
            FakeSourceControl::broken(),
            FakeHosting::broken(),
        );
        let result = pipeline
            .run_workflow("clinic.example.com", &WorkflowOptions { provision: true }, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.overall_status, OverallStatus::PartialSuccess);
        let persisted = &result.phases.persistence.as_ref().unwrap().data;
        assert!(persisted.is_fallback);
        assert!(persisted.record_id.starts_with(persistence::LOCAL_ID_PREFIX));
        let provisioning = result.phases.provisioning.as_ref().unwrap();
        assert_eq!(provisioning.data.method, ProvisioningMethod::Mock);
        assert!(provisioning.used_fallback);
    }

    #[tokio::test]
    async fn invalid_target_is_an_input_error() {
        let pipeline = degraded_pipeline();
        let err = pipeline
            .run_workflow("ftp://example.com", &WorkflowOptions::default(), &SilentProgress)
            .await
            .unwrap_err();
        assert!(err.is_input_error());
        assert!(pipeline.history().is_empty().await);
    }

    #[tokio::test]
    async fn panicking_enrichment_is_isolated() {
        let pipeline = pipeline_with(
            fast_config(),
            FakeClassifier::Panic,
            Some(Arc::new(FakeStore::ok())),
            FakeSourceControl::broken(),
            FakeHosting::broken(),
        );
        let result = pipeline
            .run_workflow("drsmith-dental.example.com", &WorkflowOptions::default(), &SilentProgress)
            .await
            .unwrap();

        let enrichment = result.phases.enrichment.as_ref().unwrap();
        assert!(enrichment.isolated);
        assert!(!enrichment.success);
        assert!(enrichment.error.as_deref().unwrap().contains("classifier exploded"));
        assert_eq!(enrichment.data.company, "Drsmith Dental Healthcare");
        assert!(result.phases.persistence.as_ref().unwrap().success);
        assert_eq!(result.overall_status, OverallStatus::PartialSuccess);
    }

    #[tokio::test]
    async fn exhausted_cascade_fails_the_workflow() {
        let pipeline = Pipeline::new(
            fast_config(),
            Enricher::new(Arc::new(FakeClassifier::Fail), Duration::from_millis(100)),
            Persister::new(Some(Arc::new(FakeStore::ok())), Duration::from_millis(100)),
            CascadeRunner::new(
                vec![Arc::new(crate::testing::PanickingStrategy), Arc::new(BrokenTerminal)],
                Duration::ZERO,
            ),
            Arc::new(WorkflowHistory::new(10)),
        );

        let result = pipeline
            .run_workflow("clinic.example.com", &WorkflowOptions { provision: true }, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(result.overall_status, OverallStatus::Failed);
        assert_eq!(result.error.as_deref(), Some(CASCADE_EXHAUSTED));
        let provisioning = result.phases.provisioning.as_ref().unwrap();
        assert_eq!(provisioning.data.method, ProvisioningMethod::AllFailed);
        assert_eq!(provisioning.data.attempts.len(), 2);
        assert!(!provisioning.success);
        assert!(provisioning.error.as_deref().unwrap().contains("mock deployment broken"));
        // earlier phases keep their output
        assert!(result.phases.persistence.as_ref().unwrap().success);
    }

    struct RecordingNotifier(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, recipient: &str, text: &str) -> Result<()> {
            self.0.lock().unwrap().push(format!("{recipient}: {text}"));
            Err(leadpipe_shared::LeadpipeError::provider("telegram", "chat not found"))
        }
    }

    #[tokio::test]
    async fn notification_failure_does_not_affect_status() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let pipeline = degraded_pipeline().with_notifier(Arc::new(RecordingNotifier(sent.clone())), "42");

        let result = pipeline
            .run_workflow("drsmith-dental.example.com", &WorkflowOptions::default(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(result.overall_status, OverallStatus::PartialSuccess);

        for _ in 0..50 {
            if !sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("42: Lead processed: Drsmith Dental Healthcare"));
    }
}
