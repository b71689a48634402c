use crate::{
    aggregate, parse_targets, Aggregate, ProgressObserver, ProgressTracker, Target,
    TargetPipeline, WorkerPool,
};
use std::sync::Arc;
use tracing::info;

/// One batch run: targets in, aggregated records out.
pub struct Scanner {
    pipeline: Arc<TargetPipeline>,
    pool: WorkerPool,
}

impl Scanner {
    pub fn new(pipeline: TargetPipeline, concurrency: usize) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            pool: WorkerPool::new(concurrency),
        }
    }

    /// Normalize raw input lines and scan what survives. Blank lines never
    /// reach the queue, so they never tick progress.
    pub async fn scan_lines<I, S>(
        &self,
        lines: I,
        observer: Arc<dyn ProgressObserver>,
    ) -> Aggregate
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scan(parse_targets(lines), observer).await
    }

    pub async fn scan(
        &self,
        targets: Vec<Target>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Aggregate {
        let tracker = Arc::new(ProgressTracker::new(targets.len(), observer));
        let pipeline = self.pipeline.clone();

        let records = self
            .pool
            .run(targets, tracker.clone(), move |target| {
                let pipeline = pipeline.clone();
                async move { pipeline.process(target).await }
            })
            .await;

        tracker.finish();

        let progress = tracker.snapshot();
        let result = aggregate(records);
        info!(
            "Scan done in {:.1}s ({:.1}/s): {} total, {} ok, {} errors, {} timeouts, {} redirects",
            progress.elapsed.as_secs_f64(),
            progress.rate,
            result.stats.total,
            result.stats.success,
            result.stats.errors,
            result.stats.timeouts,
            result.stats.redirects
        );

        result
    }
}
