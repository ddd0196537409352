//! Batch coordinator: fixed-size windows run concurrently, windows run in
//! sequence with a pause between them.

use std::ops::Range;

use chrono::Utc;
use futures::future::join_all;
use leadpipe_shared::WorkflowResult;
use tracing::{error, info, instrument, warn};

use crate::isolate::isolate;
use crate::pipeline::{Pipeline, ProgressReporter, WorkflowOptions};

/// Split `len` items into consecutive windows of at most `size`.
pub fn windows(len: usize, size: usize) -> Vec<Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

impl Pipeline {
    /// Run every target, at most `concurrency` at a time.
    ///
    /// Results are returned in input order. A target that fails outright
    /// (invalid URL, or a panic that escaped the orchestrator) yields a
    /// `failed` result in its slot; it never aborts the batch.
    #[instrument(skip_all, fields(targets = targets.len(), concurrency = self.config.concurrency))]
    pub async fn run_batch(
        &self,
        targets: &[String],
        options: &WorkflowOptions,
        progress: &dyn ProgressReporter,
    ) -> Vec<WorkflowResult> {
        let plan = windows(targets.len(), self.config.concurrency);
        let total = plan.len();
        let mut results = Vec::with_capacity(targets.len());

        info!(windows = total, "starting batch");

        for (index, range) in plan.into_iter().enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
            progress.window(index, total, range.len());

            let window = targets[range].iter().map(|target| self.run_isolated(target, options, progress));
            results.extend(join_all(window).await);
        }

        info!(results = results.len(), "batch complete");
        results
    }

    async fn run_isolated(
        &self,
        target: &str,
        options: &WorkflowOptions,
        progress: &dyn ProgressReporter,
    ) -> WorkflowResult {
        let started_at = Utc::now();
        match isolate(self.run_workflow(target, options, progress)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                warn!(%target, error = %e, "target rejected");
                let result = WorkflowResult::rejected(target, e.to_string(), started_at);
                progress.done(&result);
                result
            }
            Err(panic) => {
                error!(%target, %panic, "workflow panicked");
                let result = WorkflowResult::rejected(target, format!("workflow panicked: {panic}"), started_at);
                progress.done(&result);
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use leadpipe_shared::OverallStatus;

    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::testing::{
        FakeClassifier, FakeHosting, FakeSourceControl, FakeStore, RecordingProgress, degraded_pipeline, fast_config,
        pipeline_with,
    };

    fn targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://clinic-{i}.example.com")).collect()
    }

    #[test]
    fn window_plan() {
        assert_eq!(windows(7, 3), vec![0..3, 3..6, 6..7]);
        assert_eq!(windows(3, 3), vec![0..3]);
        assert_eq!(windows(0, 3), Vec::<Range<usize>>::new());
        assert_eq!(windows(2, 0), vec![0..1, 1..2]);
    }

    #[tokio::test]
    async fn seven_targets_three_windows_in_order() {
        let pipeline = degraded_pipeline();
        let progress = RecordingProgress::default();
        let input = targets(7);

        let results = pipeline.run_batch(&input, &WorkflowOptions::default(), &progress).await;

        assert_eq!(*progress.windows.lock().unwrap(), vec![3, 3, 1]);
        let order: Vec<&str> = results.iter().map(|r| r.target.as_str()).collect();
        let expected: Vec<&str> = input.iter().map(String::as_str).collect();
        assert_eq!(order, expected);
        assert!(results.iter().all(|r| r.overall_status == OverallStatus::PartialSuccess));
        assert_eq!(pipeline.history().len().await, 7);
    }

    #[tokio::test]
    async fn invalid_target_does_not_abort_batch() {
        let pipeline = degraded_pipeline();
        let input = vec![
            "https://a.example.com".to_string(),
            "ftp://nope".to_string(),
            "https://b.example.com".to_string(),
        ];

        let results = pipeline.run_batch(&input, &WorkflowOptions::default(), &SilentProgress).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[1].overall_status, OverallStatus::Failed);
        assert!(results[1].error.as_deref().unwrap().contains("unsupported scheme"));
        assert!(results[1].practice_id.is_none());
        assert_ne!(results[0].overall_status, OverallStatus::Failed);
        assert_ne!(results[2].overall_status, OverallStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_between_windows_only() {
        let mut config = fast_config();
        config.batch_delay = Duration::from_millis(2_000);
        let pipeline = pipeline_with(
            config,
            FakeClassifier::Fail,
            Some(Arc::new(FakeStore::ok())),
            FakeSourceControl::broken(),
            FakeHosting::broken(),
        );

        let started = tokio::time::Instant::now();
        pipeline.run_batch(&targets(7), &WorkflowOptions::default(), &SilentProgress).await;
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(4_000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(6_000), "{elapsed:?}");
    }
}
