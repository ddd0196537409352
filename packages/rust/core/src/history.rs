//! Bounded in-memory history of workflow results.
//!
//! Recovery looks up prior enrichment output here, and `/status` reports
//! aggregate counts. The oldest entries are evicted once capacity is reached.

use std::collections::VecDeque;

use leadpipe_shared::{OverallStatus, PracticeId, ProvisioningMethod, WorkflowResult};
use serde::Serialize;
use tokio::sync::RwLock;

/// Aggregate counts over the retained history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total: usize,
    pub complete: usize,
    pub partial_success: usize,
    pub failed: usize,
    pub enrichment_fallbacks: usize,
    pub persistence_fallbacks: usize,
    /// Workflows whose site was provisioned by a real strategy.
    pub provisioned: usize,
    /// Entries dropped to stay within capacity.
    pub evicted: u64,
    pub capacity: usize,
}

struct Inner {
    entries: VecDeque<WorkflowResult>,
    evicted: u64,
}

/// Ring buffer of recent workflow results, safe to share across tasks.
pub struct WorkflowHistory {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl WorkflowHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: RwLock::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                evicted: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn push(&self, result: WorkflowResult) {
        let mut inner = self.inner.write().await;
        while inner.entries.len() >= self.capacity {
            inner.entries.pop_front();
            inner.evicted += 1;
        }
        inner.entries.push_back(result);
    }

    /// The most recent result for `practice_id`.
    pub async fn find_by_practice_id(&self, practice_id: &PracticeId) -> Option<WorkflowResult> {
        let inner = self.inner.read().await;
        inner
            .entries
            .iter()
            .rev()
            .find(|r| r.practice_id.as_ref() == Some(practice_id))
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> HistoryStats {
        let inner = self.inner.read().await;
        let mut stats = HistoryStats {
            total: inner.entries.len(),
            evicted: inner.evicted,
            capacity: self.capacity,
            ..HistoryStats::default()
        };

        for result in &inner.entries {
            match result.overall_status {
                OverallStatus::Complete => stats.complete += 1,
                OverallStatus::PartialSuccess => stats.partial_success += 1,
                OverallStatus::Failed => stats.failed += 1,
            }
            let phases = &result.phases;
            if phases.enrichment.as_ref().is_some_and(|o| o.used_fallback) {
                stats.enrichment_fallbacks += 1;
            }
            if phases.persistence.as_ref().is_some_and(|o| o.used_fallback) {
                stats.persistence_fallbacks += 1;
            }
            if phases.provisioning.as_ref().is_some_and(|o| {
                o.data.success && !matches!(o.data.method, ProvisioningMethod::Mock | ProvisioningMethod::AllFailed)
            }) {
                stats.provisioned += 1;
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use leadpipe_shared::{PhaseOutcome, WorkflowPhases};

    use super::*;
    use crate::testing::sample_lead;

    fn result(target: &str, id: Option<PracticeId>) -> WorkflowResult {
        let lead = sample_lead();
        let phases = WorkflowPhases {
            enrichment: Some(PhaseOutcome::fallback(lead, Some("no key".into()))),
            ..WorkflowPhases::default()
        };
        WorkflowResult {
            target: target.into(),
            practice_id: id,
            overall_status: phases.overall_status(),
            phases,
            timing: leadpipe_shared::WorkflowTiming::since(Utc::now()),
            error: None,
        }
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let history = WorkflowHistory::new(2);
        for t in ["a", "b", "c"] {
            history.push(result(t, None)).await;
        }

        let stats = history.stats().await;
        assert_eq!(history.len().await, 2);
        assert_eq!(stats.evicted, 1);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.partial_success, 2);
        assert_eq!(stats.enrichment_fallbacks, 2);
    }

    #[tokio::test]
    async fn finds_newest_entry_for_id() {
        let history = WorkflowHistory::new(10);
        let id = PracticeId::from_raw("acme-dental-18f2a3b4c5d1a2b");
        history.push(result("first", Some(id.clone()))).await;
        history.push(result("other", None)).await;
        history.push(result("second", Some(id.clone()))).await;

        let found = history.find_by_practice_id(&id).await.unwrap();
        assert_eq!(found.target, "second");
        assert!(
            history
                .find_by_practice_id(&PracticeId::from_raw("missing"))
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn rejected_results_count_as_failed() {
        let history = WorkflowHistory::new(0);
        assert_eq!(history.capacity(), 1);
        assert!(history.is_empty().await);

        history.push(WorkflowResult::rejected("::", "bad", Utc::now())).await;
        let stats = history.stats().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total, 1);
    }
}
