use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Receives a signal every time a target completes.
pub trait ProgressObserver: Send + Sync {
    fn on_advance(&self, completed: usize, total: usize);

    fn on_finish(&self) {}
}

/// Terminal progress bar for interactive runs.
pub struct ProgressBarObserver {
    bar: ProgressBar,
}

impl ProgressBarObserver {
    pub fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.green} {msg} [{bar:40.cyan/blue}] {percent:>3}% ({pos}/{len}) {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");

        bar.set_style(style);
        bar.set_message("Processing...");
        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }
}

impl ProgressObserver for ProgressBarObserver {
    fn on_advance(&self, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
    }

    fn on_finish(&self) {
        self.bar.finish_with_message("Done");
    }
}

/// Observer for non-interactive use: progress goes to the debug log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl ProgressObserver for LogObserver {
    fn on_advance(&self, completed: usize, total: usize) {
        debug!("Progress: {}/{}", completed, total);
    }
}

/// Thread-safe completion counter shared by every worker.
pub struct ProgressTracker {
    total: usize,
    completed: AtomicUsize,
    start_time: Instant,
    observer: Arc<dyn ProgressObserver>,
}

impl ProgressTracker {
    pub fn new(total: usize, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            total,
            completed: AtomicUsize::new(0),
            start_time: Instant::now(),
            observer,
        }
    }

    /// Count one finished target and notify the observer. Returns the new
    /// completed count.
    pub fn advance(&self) -> usize {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        self.observer.on_advance(completed, self.total);
        completed
    }

    pub fn finish(&self) {
        self.observer.on_finish();
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProgressInfo {
        let completed = self.completed();
        let elapsed = self.start_time.elapsed();
        let secs = elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            completed as f64 / secs
        } else {
            0.0
        };

        let eta = if completed > 0 && rate > 0.0 {
            let remaining = self.total.saturating_sub(completed);
            Some(Duration::from_secs_f64(remaining as f64 / rate))
        } else {
            None
        };

        ProgressInfo {
            total: self.total,
            completed,
            elapsed,
            rate,
            eta,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressInfo {
    pub total: usize,
    pub completed: usize,
    pub elapsed: Duration,
    pub rate: f64,
    pub eta: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        ticks: Mutex<Vec<(usize, usize)>>,
        finished: AtomicUsize,
    }

    impl ProgressObserver for Recorder {
        fn on_advance(&self, completed: usize, total: usize) {
            self.ticks.lock().unwrap().push((completed, total));
        }

        fn on_finish(&self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_progress_tracker() {
        let recorder = Arc::new(Recorder::default());
        let tracker = ProgressTracker::new(3, recorder.clone());

        assert_eq!(tracker.completed(), 0);

        assert_eq!(tracker.advance(), 1);
        assert_eq!(tracker.advance(), 2);
        assert_eq!(tracker.advance(), 3);
        assert_eq!(tracker.completed(), 3);
        tracker.finish();

        assert_eq!(*recorder.ticks.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(recorder.finished.load(Ordering::SeqCst), 1);

        let info = tracker.snapshot();
        assert_eq!(info.total, 3);
        assert_eq!(info.completed, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_advance_counts_every_tick() {
        let recorder = Arc::new(Recorder::default());
        let tracker = Arc::new(ProgressTracker::new(400, recorder.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        tracker.advance();
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(tracker.completed(), 400);
        let ticks = recorder.ticks.lock().unwrap();
        assert_eq!(ticks.len(), 400);
        assert!(ticks.iter().any(|(completed, _)| *completed == 400));
    }
}
