//! Core pipeline orchestration and domain logic for Leadpipe.
//!
//! This crate ties together enrichment, validation, persistence and site
//! provisioning into end-to-end workflows ([`Pipeline::run_workflow`]),
//! windowed batches ([`Pipeline::run_batch`]) and single-phase recovery
//! ([`Pipeline::recover`]).

pub mod batch;
pub mod enrichment;
pub mod history;
mod isolate;
pub mod normalize;
pub mod persistence;
pub mod pipeline;
pub mod provisioning;
pub mod recovery;
pub mod scoring;

#[cfg(test)]
pub(crate) mod testing;

pub use enrichment::{Enricher, Enrichment, Target, parse_target};
pub use history::{HistoryStats, WorkflowHistory};
pub use normalize::{Normalize, normalize};
pub use persistence::Persister;
pub use pipeline::{Pipeline, ProgressReporter, SilentProgress, WorkflowOptions};
pub use provisioning::{CascadeRunner, ProvisioningStrategy};
pub use recovery::RecoveredData;

pub use leadpipe_storage::StoredLead;
