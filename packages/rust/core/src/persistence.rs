//! Persistence adapter: one store call, local fallback on any failure.

use std::sync::Arc;
use std::time::Duration;

use leadpipe_shared::{LeadpipeError, NormalizedRecord, PersistedRecord, PracticeId, Result};
use leadpipe_storage::{StoredLead, StructuredStore};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Prefix of record ids synthesized when the store is unavailable.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// A time-ordered local id, unique within the process lifetime.
pub fn local_record_id() -> String {
    format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7().simple())
}

/// Writes normalized records to the structured store, if one is configured.
pub struct Persister {
    store: Option<Arc<dyn StructuredStore>>,
    timeout: Duration,
}

impl Persister {
    pub fn new(store: Option<Arc<dyn StructuredStore>>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Persist `record`. Never fails: on any store problem the record is kept
    /// under a local id and flagged `is_fallback`.
    #[instrument(skip_all, fields(practice_id = %record.practice_id))]
    pub async fn persist(&self, record: &NormalizedRecord) -> PersistedRecord {
        let Some(store) = &self.store else {
            return fallback(record, "no structured store configured".into());
        };

        match tokio::time::timeout(self.timeout, store.upsert(record)).await {
            Ok(Ok(id)) if !id.trim().is_empty() => {
                info!(record_id = %id, "lead persisted");
                PersistedRecord {
                    record_id: id,
                    is_fallback: false,
                    fallback_reason: None,
                    payload: record.clone(),
                }
            }
            Ok(Ok(_)) => fallback(record, "store returned an empty record id".into()),
            Ok(Err(e)) => fallback(record, e.to_string()),
            Err(_) => fallback(record, LeadpipeError::timeout("store upsert", self.timeout).to_string()),
        }
    }

    /// Look `practice_id` up in the store. Store problems read as "not found".
    pub async fn lookup(&self, practice_id: &PracticeId) -> Option<StoredLead> {
        let store = self.store.as_ref()?;
        match self.bounded("store lookup", store.find_by_practice_id(practice_id)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(%practice_id, error = %e, "store lookup failed");
                None
            }
        }
    }

    /// Number of stored leads, or `None` with no reachable store.
    pub async fn stored_count(&self) -> Option<u64> {
        let store = self.store.as_ref()?;
        self.bounded("store count", store.count())
            .await
            .inspect_err(|e| debug!(error = %e, "store count unavailable"))
            .ok()
    }

    /// Best-scored stored leads.
    pub async fn list(&self, limit: u32) -> Result<Vec<StoredLead>> {
        let Some(store) = &self.store else {
            return Err(LeadpipeError::config("no structured store configured"));
        };
        self.bounded("store list", store.list(limit)).await
    }

    async fn bounded<T>(&self, operation: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| LeadpipeError::timeout(operation, self.timeout))?
    }
}

/// Keep the payload, downgrade only the durability guarantee.
pub(crate) fn fallback(record: &NormalizedRecord, reason: String) -> PersistedRecord {
    let record_id = local_record_id();
    warn!(%record_id, %reason, "persistence fell back to local record");
    PersistedRecord {
        record_id,
        is_fallback: true,
        fallback_reason: Some(reason),
        payload: record.clone(),
    }
}
