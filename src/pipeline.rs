use crate::{
    detect_or_empty, CaptureEngine, CaptureOutcome, Config, Metrics, ScanError, Target,
    TechDetector, TechSet,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Slack granted to the capture engine on top of its own budget before the
/// pipeline gives up on it.
pub const CAPTURE_GRACE: Duration = Duration::from_secs(2);

/// Everything learned about one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TargetRecord {
    #[serde(flatten)]
    pub capture: CaptureOutcome,
    pub techs: TechSet,
}

impl TargetRecord {
    pub fn url(&self) -> &str {
        &self.capture.requested_url
    }
}

/// Capture, then optionally detect, for a single target.
///
/// `process` never fails: collaborator errors are folded into the record.
pub struct TargetPipeline {
    capture: Arc<dyn CaptureEngine>,
    detector: Arc<dyn TechDetector>,
    detection_enabled: bool,
    capture_timeout: Duration,
    detection_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl TargetPipeline {
    pub fn new(
        capture: Arc<dyn CaptureEngine>,
        detector: Arc<dyn TechDetector>,
        config: &Config,
    ) -> Self {
        Self {
            capture,
            detector,
            detection_enabled: config.detection_enabled,
            capture_timeout: config.capture_timeout,
            detection_timeout: config.detection_timeout,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub async fn process(&self, target: Target) -> TargetRecord {
        let start = Instant::now();

        // The engine enforces its own budget; this guard only catches an
        // engine that hangs past it
        let result = match timeout(
            self.capture_timeout + CAPTURE_GRACE,
            self.capture.capture(&target, self.capture_timeout),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout(self.capture_timeout)),
        };

        let capture = match result {
            Ok(page) => {
                self.metrics.record_capture(start.elapsed(), Ok(()));
                debug!("Captured {} in {:?}", target, start.elapsed());
                CaptureOutcome::captured(&target, page)
            }
            Err(e) => {
                self.metrics.record_capture(start.elapsed(), Err(&e));
                warn!("Failed to capture {}: {}", target, e);
                CaptureOutcome::failed(&target, &e)
            }
        };

        let techs = if self.detection_enabled {
            let scan_url = capture
                .final_url
                .clone()
                .unwrap_or_else(|| target.to_string());
            let techs =
                detect_or_empty(self.detector.as_ref(), &scan_url, self.detection_timeout).await;
            self.metrics.record_detection(techs.len());
            techs
        } else {
            TechSet::new()
        };

        TargetRecord { capture, techs }
    }
}
