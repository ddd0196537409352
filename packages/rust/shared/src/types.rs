//! Core domain types for Leadpipe workflows.
//!
//! Wire-facing types serialize with camelCase keys, matching the JSON
//! returned by the HTTP boundary.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureCategory;
use crate::text::{slugify, title_case};

// ---------------------------------------------------------------------------
// PracticeId
// ---------------------------------------------------------------------------

/// Cross-phase join key: `<slug>-<hex millis><4 hex random>`.
///
/// Assigned once during enrichment; there are no mutating methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PracticeId(String);

impl PracticeId {
    /// Derive a new identifier from a company name and the current time.
    pub fn generate(company: &str) -> Self {
        let slug = slugify(company);
        let millis = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
        let bytes = *Uuid::now_v7().as_bytes();
        let noise = u16::from_be_bytes([bytes[14], bytes[15]]);
        Self(format!("{slug}-{millis:x}{noise:04x}"))
    }

    /// Wrap an identifier received from a caller (e.g. a recovery request).
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Check that `id` matches the generated format.
    pub fn is_well_formed(id: &str) -> bool {
        static ID_RE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*-[0-9a-f]{15,}$").expect("valid regex")
        });
        ID_RE.is_match(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The slug part (everything before the time suffix).
    pub fn slug(&self) -> &str {
        match self.0.rsplit_once('-') {
            Some((slug, _)) if Self::is_well_formed(&self.0) => slug,
            _ => &self.0,
        }
    }

    /// A display name recovered from the slug, e.g. `Drsmith Dental Healthcare`.
    pub fn company_hint(&self) -> String {
        let words: Vec<String> = self
            .slug()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(title_case)
            .collect();
        if words.is_empty() {
            "Unknown Practice".to_string()
        } else {
            words.join(" ")
        }
    }
}

impl std::fmt::Display for PracticeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// LeadRecord / NormalizedRecord / PersistedRecord
// ---------------------------------------------------------------------------

/// One structured lead per processed target, produced by enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRecord {
    pub company: String,
    pub domain: String,
    pub source_url: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub services: Vec<String>,
    pub treatments: Vec<String>,
    pub specializations: Vec<String>,
    pub practice_type: String,
    /// Clamped to 0..=100.
    pub lead_score: u8,
    pub practice_id: PracticeId,
    /// True only when the classifier returned real data.
    pub enrichment_succeeded: bool,
    pub created_at: DateTime<Utc>,
}

/// A lead after field constraints were enforced; what the store receives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedRecord {
    pub practice_id: PracticeId,
    pub company: String,
    pub domain: String,
    pub source_url: String,
    pub location: String,
    /// Empty when absent or invalid.
    pub phone: String,
    /// Empty when absent or invalid.
    pub email: String,
    pub services: String,
    pub treatments: String,
    pub specializations: String,
    pub practice_type: String,
    pub lead_score: u8,
    pub enrichment_succeeded: bool,
    pub created_at: DateTime<Utc>,
}

/// Result of the persistence phase. `record_id` is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRecord {
    pub record_id: String,
    pub is_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub payload: NormalizedRecord,
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

/// Which strategy produced a provisioning result, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisioningMethod {
    FullCreate,
    ReuseRepo,
    DeployWithoutRepo,
    Mock,
    AllFailed,
}

impl ProvisioningMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullCreate => "full-create",
            Self::ReuseRepo => "reuse-repo",
            Self::DeployWithoutRepo => "deploy-without-repo",
            Self::Mock => "mock",
            Self::AllFailed => "all-failed",
        }
    }
}

impl std::fmt::Display for ProvisioningMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one strategy attempt inside the cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyAttempt {
    pub method: ProvisioningMethod,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Artifact left behind by a strategy that failed half-way (not rolled back).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_repo_url: Option<String>,
    pub elapsed_ms: u64,
}

/// Outcome of the strategy cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningResult {
    pub method: ProvisioningMethod,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<StrategyAttempt>,
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

/// One stage of the orchestrator's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Enrichment,
    Validation,
    Persistence,
    Provisioning,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrichment => "enrichment",
            Self::Validation => "validation",
            Self::Persistence => "persistence",
            Self::Provisioning => "provisioning",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phases that can be re-run in isolation by recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPhase {
    Persistence,
    Provisioning,
}

impl std::str::FromStr for RecoveryPhase {
    type Err = crate::error::LeadpipeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistence" => Ok(Self::Persistence),
            "provisioning" => Ok(Self::Provisioning),
            other => Err(crate::error::LeadpipeError::validation(format!(
                "unknown recovery phase '{other}': expected 'persistence' or 'provisioning'"
            ))),
        }
    }
}

impl From<RecoveryPhase> for Phase {
    fn from(phase: RecoveryPhase) -> Self {
        match phase {
            RecoveryPhase::Persistence => Phase::Persistence,
            RecoveryPhase::Provisioning => Phase::Provisioning,
        }
    }
}

/// Generic wrapper the orchestrator uses for every phase result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseOutcome<T> {
    pub success: bool,
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the orchestrator replaced a crashed phase with a synthetic outcome.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub isolated: bool,
    pub data: T,
}

impl<T> PhaseOutcome<T> {
    /// Real result, no degradation.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            used_fallback: false,
            error: None,
            isolated: false,
            data,
        }
    }

    /// Usable result produced by a fallback path.
    pub fn fallback(data: T, reason: Option<String>) -> Self {
        Self {
            success: true,
            used_fallback: true,
            error: reason,
            isolated: false,
            data,
        }
    }

    /// The phase produced no usable output.
    pub fn failed(data: T, error: impl Into<String>) -> Self {
        Self {
            success: false,
            used_fallback: false,
            error: Some(error.into()),
            isolated: false,
            data,
        }
    }

    /// Synthetic outcome standing in for a phase whose own logic crashed.
    pub fn isolated(data: T, error: impl Into<String>) -> Self {
        Self {
            success: false,
            used_fallback: true,
            error: Some(error.into()),
            isolated: true,
            data,
        }
    }

    /// Succeeded without any fallback.
    pub fn is_clean(&self) -> bool {
        self.success && !self.used_fallback
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PhaseOutcome<U> {
        PhaseOutcome {
            success: self.success,
            used_fallback: self.used_fallback,
            error: self.error,
            isolated: self.isolated,
            data: f(self.data),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowResult
// ---------------------------------------------------------------------------

/// Terminal status of one workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    Complete,
    PartialSuccess,
    Failed,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::PartialSuccess => "partial-success",
            Self::Failed => "failed",
        })
    }
}

/// Per-phase outcomes keyed by phase name. Phases that did not run are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowPhases {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<PhaseOutcome<LeadRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<PhaseOutcome<NormalizedRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistence: Option<PhaseOutcome<PersistedRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning: Option<PhaseOutcome<ProvisioningResult>>,
}

/// `(phase, success, used_fallback)` for one executed phase.
pub type PhaseFlags = (Phase, bool, bool);

impl WorkflowPhases {
    /// Flags of every executed phase, in pipeline order.
    pub fn flags(&self) -> Vec<PhaseFlags> {
        let mut flags = Vec::with_capacity(4);
        if let Some(o) = &self.enrichment {
            flags.push((Phase::Enrichment, o.success, o.used_fallback));
        }
        if let Some(o) = &self.validation {
            flags.push((Phase::Validation, o.success, o.used_fallback));
        }
        if let Some(o) = &self.persistence {
            flags.push((Phase::Persistence, o.success, o.used_fallback));
        }
        if let Some(o) = &self.provisioning {
            flags.push((Phase::Provisioning, o.success, o.used_fallback));
        }
        flags
    }

    /// `complete` iff every executed phase succeeded without fallback;
    /// `partial-success` if at least one succeeded; otherwise `failed`.
    pub fn overall_status(&self) -> OverallStatus {
        let flags = self.flags();
        if flags.is_empty() || !flags.iter().any(|(_, success, _)| *success) {
            OverallStatus::Failed
        } else if flags.iter().all(|(_, success, fallback)| *success && !fallback) {
            OverallStatus::Complete
        } else {
            OverallStatus::PartialSuccess
        }
    }
}

/// Wall-clock timing of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTiming {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

impl WorkflowTiming {
    /// Close a timing window that started at `started_at`.
    pub fn since(started_at: DateTime<Utc>) -> Self {
        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        Self {
            started_at,
            completed_at,
            duration_seconds,
        }
    }
}

/// The orchestrator's terminal output for one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub practice_id: Option<PracticeId>,
    pub overall_status: OverallStatus,
    pub phases: WorkflowPhases,
    pub timing: WorkflowTiming,
    /// Set when the target was rejected before any phase ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    /// Result for a target that could not be processed at all.
    pub fn rejected(target: impl Into<String>, error: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            target: target.into(),
            practice_id: None,
            overall_status: OverallStatus::Failed,
            phases: WorkflowPhases::default(),
            timing: WorkflowTiming::since(started_at),
            error: Some(error.into()),
        }
    }
}
