//! Manual remediation: re-run persistence or provisioning for a known
//! practice id.
//!
//! The lead is taken from the in-memory history when it is still there, then
//! from the structured store. Otherwise a minimal lead is synthesized from
//! the id alone, and the outcome is flagged as a fallback.

use chrono::Utc;
use leadpipe_shared::text::slugify;
use leadpipe_shared::{
    LeadRecord, NormalizedRecord, PersistedRecord, Phase, PhaseOutcome, PracticeId, ProvisioningResult,
    RecoveryPhase,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::enrichment::{FALLBACK_SERVICES, FALLBACK_TREATMENTS};
use crate::normalize::{LIST_SEPARATOR, normalize};
use crate::pipeline::Pipeline;
use crate::scoring::{ScoreSignals, score};

/// Domain suffix of leads synthesized from an id alone.
pub const RECOVERED_DOMAIN_SUFFIX: &str = "recovered.invalid";

/// Note attached to outcomes computed from a synthesized lead.
const SYNTHETIC_NOTE: &str = "lead not in history or store; recovered from practice id";

/// Output of the re-run phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecoveredData {
    Persistence(PersistedRecord),
    Provisioning(ProvisioningResult),
}

/// A minimal lead carrying `practice_id`, built when history has nothing.
pub fn synthetic_lead(practice_id: &PracticeId) -> LeadRecord {
    let domain = format!("{}.{RECOVERED_DOMAIN_SUFFIX}", slugify(practice_id.slug()));
    let mut lead = LeadRecord {
        company: practice_id.company_hint(),
        source_url: format!("https://{domain}"),
        domain,
        location: String::new(),
        phone: None,
        email: None,
        services: FALLBACK_SERVICES.iter().map(|s| s.to_string()).collect(),
        treatments: FALLBACK_TREATMENTS.iter().map(|s| s.to_string()).collect(),
        specializations: Vec::new(),
        practice_type: leadpipe_classifier::DEFAULT_PRACTICE_TYPE.to_string(),
        lead_score: 0,
        practice_id: practice_id.clone(),
        enrichment_succeeded: false,
        created_at: Utc::now(),
    };
    lead.lead_score = score(&ScoreSignals::from_record(&lead, false));
    lead
}

/// Rebuild a lead from its stored, normalized form.
pub fn lead_from_stored(record: &NormalizedRecord) -> LeadRecord {
    let split = |joined: &str| -> Vec<String> {
        joined
            .split(LIST_SEPARATOR)
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    };
    let optional = |value: &str| (!value.is_empty()).then(|| value.to_string());

    LeadRecord {
        company: record.company.clone(),
        domain: record.domain.clone(),
        source_url: record.source_url.clone(),
        location: record.location.clone(),
        phone: optional(&record.phone),
        email: optional(&record.email),
        services: split(&record.services),
        treatments: split(&record.treatments),
        specializations: split(&record.specializations),
        practice_type: record.practice_type.clone(),
        lead_score: record.lead_score,
        practice_id: record.practice_id.clone(),
        enrichment_succeeded: record.enrichment_succeeded,
        created_at: record.created_at,
    }
}

impl Pipeline {
    /// Re-run one phase for `practice_id`. Never fails.
    #[instrument(skip_all, fields(practice_id = %practice_id, phase = %Phase::from(phase)))]
    pub async fn recover(&self, practice_id: &PracticeId, phase: RecoveryPhase) -> PhaseOutcome<RecoveredData> {
        let (lead, synthetic) = match self.lead_from_history(practice_id).await {
            Some(lead) => (lead, false),
            None => match self.persister.lookup(practice_id).await {
                Some(stored) => {
                    info!(record_id = %stored.record_id, "practice id not in history, using stored lead");
                    (lead_from_stored(&stored.lead), false)
                }
                None => {
                    warn!("practice id unknown, recovering from synthesized lead");
                    (synthetic_lead(practice_id), true)
                }
            },
        };

        let outcome = match phase {
            RecoveryPhase::Persistence => {
                let persisted = self.persister.persist(&normalize(&lead)).await;
                let outcome = if persisted.is_fallback {
                    let reason = persisted.fallback_reason.clone();
                    PhaseOutcome::fallback(persisted, reason)
                } else {
                    PhaseOutcome::ok(persisted)
                };
                outcome.map(RecoveredData::Persistence)
            }
            RecoveryPhase::Provisioning => self.provisioning_outcome(&lead).await.map(RecoveredData::Provisioning),
        };

        info!(success = outcome.success, synthetic, "recovery finished");
        if synthetic { mark_synthetic(outcome) } else { outcome }
    }

    async fn lead_from_history(&self, practice_id: &PracticeId) -> Option<LeadRecord> {
        self.history
            .find_by_practice_id(practice_id)
            .await
            .and_then(|result| result.phases.enrichment)
            .map(|outcome| outcome.data)
    }
}

fn mark_synthetic(mut outcome: PhaseOutcome<RecoveredData>) -> PhaseOutcome<RecoveredData> {
    outcome.used_fallback = true;
    outcome.error = Some(match outcome.error.take() {
        Some(existing) => format!("{SYNTHETIC_NOTE}; {existing}"),
        None => SYNTHETIC_NOTE.to_string(),
    });
    outcome
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use leadpipe_shared::ProvisioningMethod;

    use super::*;
    use crate::pipeline::{SilentProgress, WorkflowOptions};
    use crate::testing::{
        FakeClassifier, FakeHosting, FakeSourceControl, FakeStore, degraded_pipeline, fast_config, pipeline_with,
        sample_normalized,
    };

    #[test]
    fn synthetic_lead_from_id() {
        let id = PracticeId::from_raw("drsmith-dental-healthcare-18f2a3b4c5d1a2b");
        let lead = synthetic_lead(&id);
        assert_eq!(lead.company, "Drsmith Dental Healthcare");
        assert_eq!(lead.domain, "drsmith-dental-healthcare.recovered.invalid");
        assert_eq!(lead.practice_id, id);
        assert_eq!(lead.services, vec!["Healthcare Services"]);
        assert!(!lead.enrichment_succeeded);
    }

    #[tokio::test]
    async fn unknown_id_persistence_does_not_raise() {
        let pipeline = degraded_pipeline();
        let id = PracticeId::from_raw("never-seen-18f2a3b4c5d1a2b");

        let outcome = pipeline.recover(&id, RecoveryPhase::Persistence).await;

        assert!(outcome.success);
        assert!(outcome.used_fallback);
        assert!(outcome.error.as_deref().unwrap().contains("recovered from practice id"));
        let RecoveredData::Persistence(persisted) = outcome.data else {
            panic!("expected persistence data");
        };
        assert_eq!(persisted.record_id, "rec-1");
        assert_eq!(persisted.payload.practice_id, id);
    }

    #[tokio::test]
    async fn unknown_id_provisioning_does_not_raise() {
        let pipeline = degraded_pipeline();
        let id = PracticeId::from_raw("garbage id!");

        let outcome = pipeline.recover(&id, RecoveryPhase::Provisioning).await;

        assert!(outcome.success);
        assert!(outcome.used_fallback);
        let RecoveredData::Provisioning(result) = outcome.data else {
            panic!("expected provisioning data");
        };
        assert_eq!(result.method, ProvisioningMethod::Mock);
    }

    #[tokio::test]
    async fn known_id_reuses_enrichment_from_history() {
        let text = std::fs::read_to_string("../../../fixtures/text/dental_practice.txt").unwrap();
        let pipeline = pipeline_with(
            fast_config(),
            FakeClassifier::Text(text),
            Some(Arc::new(FakeStore::ok())),
            FakeSourceControl::healthy(),
            FakeHosting::healthy(),
        );
        let result = pipeline
            .run_workflow("brightsmile.example.com", &WorkflowOptions::default(), &SilentProgress)
            .await
            .unwrap();
        let id = result.practice_id.unwrap();

        let outcome = pipeline.recover(&id, RecoveryPhase::Provisioning).await;

        assert!(outcome.is_clean());
        let RecoveredData::Provisioning(provisioned) = outcome.data else {
            panic!("expected provisioning data");
        };
        assert_eq!(provisioned.method, ProvisioningMethod::FullCreate);
        assert_eq!(
            provisioned.repo_url.as_deref(),
            Some(format!("https://git.example.com/{id}").as_str())
        );
    }

    #[test]
    fn stored_record_becomes_lead_again() {
        let record = sample_normalized();
        let lead = lead_from_stored(&record);
        assert_eq!(lead.services, vec!["General Dentistry", "Teeth Whitening"]);
        assert_eq!(lead.phone.as_deref(), Some("(512) 555-0134"));
        assert_eq!(lead.practice_id, record.practice_id);

        let mut bare = record;
        bare.email = String::new();
        bare.specializations = String::new();
        let lead = lead_from_stored(&bare);
        assert_eq!(lead.email, None);
        assert!(lead.specializations.is_empty());
    }

    #[tokio::test]
    async fn id_missing_from_history_is_read_from_store() {
        let record = sample_normalized();
        let pipeline = pipeline_with(
            fast_config(),
            FakeClassifier::Fail,
            Some(Arc::new(FakeStore::seeded(vec![record.clone()]))),
            FakeSourceControl::healthy(),
            FakeHosting::healthy(),
        );

        let outcome = pipeline.recover(&record.practice_id, RecoveryPhase::Provisioning).await;

        assert!(outcome.is_clean());
        let RecoveredData::Provisioning(provisioned) = outcome.data else {
            panic!("expected provisioning data");
        };
        assert_eq!(provisioned.method, ProvisioningMethod::FullCreate);
        assert_eq!(
            provisioned.repo_url.as_deref(),
            Some(format!("https://git.example.com/{}", record.practice_id).as_str())
        );
    }

    #[test]
    fn recovered_data_serializes_untagged() {
        let data = RecoveredData::Provisioning(crate::pipeline::exhausted_result("x".into()));
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["method"], "all-failed");
    }
}
