use crate::{ProgressTracker, Target};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

type TargetQueue = Arc<Mutex<VecDeque<Target>>>;

struct Worker<T> {
    id: usize,
    queue: TargetQueue,
    results: mpsc::UnboundedSender<T>,
    tracker: Arc<ProgressTracker>,
}

impl<T: Send + 'static> Worker<T> {
    async fn run<F, Fut>(self, per_target: Arc<F>) -> WorkerStats
    where
        F: Fn(Target) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        debug!("Starting worker {}", self.id);
        let mut stats = WorkerStats {
            id: self.id,
            processed_count: 0,
            fault_count: 0,
        };

        loop {
            // The queue is filled before workers start, so an empty queue
            // means this worker is done
            let target = { self.queue.lock().await.pop_front() };
            let Some(target) = target else {
                break;
            };

            let label = target.to_string();
            let per_target = per_target.clone();
            let outcome = AssertUnwindSafe(async move { per_target(target).await })
                .catch_unwind()
                .await;

            let delivered = match outcome {
                Ok(record) => {
                    stats.processed_count += 1;
                    self.results.send(record).is_ok()
                }
                Err(fault) => {
                    // One bad target must never take the batch down with it
                    stats.fault_count += 1;
                    warn!(
                        "Worker {} dropped {} after an unexpected fault: {}",
                        self.id,
                        label,
                        fault_message(fault.as_ref())
                    );
                    true
                }
            };

            self.tracker.advance();

            if !delivered {
                error!("Worker {} lost its result channel, stopping", self.id);
                break;
            }
        }

        debug!(
            "Worker {} stopped after {} targets ({} faults)",
            self.id, stats.processed_count, stats.fault_count
        );
        stats
    }
}

#[derive(Debug, Clone)]
pub struct WorkerStats {
    pub id: usize,
    pub processed_count: usize,
    pub fault_count: usize,
}

/// Fixed-size pool of workers draining one shared, pre-filled queue.
///
/// Each worker handles one target at a time, so at most `worker_count`
/// invocations of the per-target function run at once. Results arrive in
/// completion order, not input order.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    worker_count: usize,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
        }
    }

    pub async fn run<T, F, Fut>(
        &self,
        targets: Vec<Target>,
        tracker: Arc<ProgressTracker>,
        per_target: F,
    ) -> Vec<T>
    where
        T: Send + 'static,
        F: Fn(Target) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let total = targets.len();
        info!(
            "Processing {} targets with {} workers",
            total, self.worker_count
        );

        let queue: TargetQueue = Arc::new(Mutex::new(targets.into_iter().collect()));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();
        let per_target = Arc::new(per_target);

        let handles: Vec<_> = (0..self.worker_count)
            .map(|id| {
                let worker = Worker {
                    id,
                    queue: queue.clone(),
                    results: result_tx.clone(),
                    tracker: tracker.clone(),
                };
                let per_target = per_target.clone();
                tokio::spawn(worker.run(per_target))
            })
            .collect();

        // Only workers hold senders now; the channel closes when the last one exits
        drop(result_tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = result_rx.recv().await {
            results.push(result);
        }

        let mut faults = 0;
        for joined in join_all(handles).await {
            match joined {
                Ok(stats) => faults += stats.fault_count,
                Err(e) => error!("Worker task failed: {}", e),
            }
        }

        info!(
            "Worker pool drained: {} results, {} dropped targets",
            results.len(),
            faults
        );

        results
    }
}

fn fault_message(fault: &(dyn Any + Send)) -> String {
    if let Some(message) = fault.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = fault.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown fault".to_string()
    }
}
