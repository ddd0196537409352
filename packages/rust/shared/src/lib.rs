//! Shared types, error model, and configuration for Leadpipe.
//!
//! This crate is the foundation depended on by all other Leadpipe crates.
//! It provides:
//! - [`LeadpipeError`]: the unified error type
//! - Domain types ([`LeadRecord`], [`NormalizedRecord`], [`PersistedRecord`],
//!   [`ProvisioningResult`], [`PhaseOutcome`], [`WorkflowResult`], [`PracticeId`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, HostingConfig, NotifyConfig, PipelineConfig, SearchConfig,
    ServerConfig, SourceControlConfig, StoreConfig, TimeoutsConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, resolve_secret,
};
pub use error::{FailureCategory, LeadpipeError, Result};
pub use types::{
    LeadRecord, NormalizedRecord, OverallStatus, PersistedRecord, Phase, PhaseFlags,
    PhaseOutcome, PracticeId, ProvisioningMethod, ProvisioningResult, RecoveryPhase,
    StrategyAttempt, WorkflowPhases, WorkflowResult, WorkflowTiming,
};
