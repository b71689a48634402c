use crate::ScanError;
use ::metrics::{register_counter, register_histogram, Counter, Histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Per-run counters for the capture and detection stages.
pub struct Metrics {
    pub targets_captured: Counter,
    pub capture_failures: Counter,
    pub capture_timeouts: Counter,
    pub capture_duration: Histogram,
    pub detections: Counter,
    pub technologies_found: Counter,
}

impl Metrics {
    /// Handles that discard every value. Used when no recorder is installed.
    pub fn new() -> Self {
        Self {
            targets_captured: Counter::noop(),
            capture_failures: Counter::noop(),
            capture_timeouts: Counter::noop(),
            capture_duration: Histogram::noop(),
            detections: Counter::noop(),
            technologies_found: Counter::noop(),
        }
    }

    /// Handles bound to the global recorder. Call after
    /// [`MetricsExporter::install`].
    pub fn registered() -> Self {
        Self {
            targets_captured: register_counter!("recon_snap_targets_captured_total"),
            capture_failures: register_counter!("recon_snap_capture_failures_total"),
            capture_timeouts: register_counter!("recon_snap_capture_timeouts_total"),
            capture_duration: register_histogram!("recon_snap_capture_duration_seconds"),
            detections: register_counter!("recon_snap_detections_total"),
            technologies_found: register_counter!("recon_snap_technologies_found_total"),
        }
    }

    pub fn record_capture(&self, duration: Duration, result: Result<(), &ScanError>) {
        match result {
            Ok(()) => self.targets_captured.increment(1),
            Err(e) => {
                self.capture_failures.increment(1);
                if e.is_timeout() {
                    self.capture_timeouts.increment(1);
                }
            }
        }

        self.capture_duration.record(duration.as_secs_f64());
    }

    pub fn record_detection(&self, technologies: usize) {
        self.detections.increment(1);
        self.technologies_found.increment(technologies as u64);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Prometheus recorder whose snapshot is written next to the report.
pub struct MetricsExporter {
    handle: PrometheusHandle,
}

impl MetricsExporter {
    pub fn install() -> Result<Self, ScanError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| ScanError::Configuration(format!("Metrics recorder: {e}")))?;

        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ScanError> {
        std::fs::write(path, self.render())?;
        info!("Metrics written to {}", path.display());
        Ok(())
    }
}
