#[cfg(test)]
mod integration_tests {
    use crate::{
        CaptureEngine, CapturedPage, Config, LogObserver, MockCaptureEngine, MockTechDetector,
        ProgressObserver, RedirectChain, ReportEmitter, ScanError, Scanner, Target, TargetPipeline,
        TechSet,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingObserver {
        ticks: AtomicUsize,
        finished: AtomicUsize,
    }

    impl ProgressObserver for CountingObserver {
        fn on_advance(&self, _completed: usize, _total: usize) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }

        fn on_finish(&self) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Capture engine that takes a little while and records how many
    /// captures overlap.
    #[derive(Default)]
    struct SlowCapture {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CaptureEngine for SlowCapture {
        async fn capture(
            &self,
            target: &Target,
            _budget: Duration,
        ) -> Result<CapturedPage, ScanError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if target.as_str().contains("crash") {
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("renderer process gone");
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            Ok(CapturedPage {
                final_url: Some(target.to_string()),
                chain: Some(RedirectChain::direct(200)),
                title: "ok".to_string(),
                asset_ref: Some(target.screenshot_filename()),
            })
        }
    }

    fn test_config(detection_enabled: bool) -> Config {
        Config {
            detection_enabled,
            capture_timeout: Duration::from_millis(500),
            detection_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    fn ok_page(url: &str) -> CapturedPage {
        CapturedPage {
            final_url: Some(url.to_string()),
            chain: Some(RedirectChain::direct(200)),
            title: "Welcome".to_string(),
            asset_ref: Some("shot.png".to_string()),
        }
    }

    fn silent_detector() -> MockTechDetector {
        let mut detector = MockTechDetector::new();
        detector.expect_detect().never();
        detector
    }

    #[tokio::test]
    async fn test_blank_lines_never_enter_the_queue() {
        let mut capture = MockCaptureEngine::new();
        capture
            .expect_capture()
            .times(2)
            .returning(|target, _| Ok(ok_page(target.as_str())));

        let config = Config {
            concurrency: 2,
            ..test_config(false)
        };
        let detector = Arc::new(silent_detector());
        let pipeline = TargetPipeline::new(Arc::new(capture), detector, &config);
        let scanner = Scanner::new(pipeline, config.concurrency);
        let observer = Arc::new(CountingObserver::default());

        let result = scanner
            .scan_lines(["example.com", "", "  ", "bad..url"], observer.clone())
            .await;

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.stats.total, 2);
        assert_eq!(observer.ticks.load(Ordering::SeqCst), 2);
        assert_eq!(observer.finished.load(Ordering::SeqCst), 1);

        let mut urls: Vec<&str> = result.records.iter().map(|r| r.url()).collect();
        urls.sort();
        assert_eq!(urls, vec!["http://bad..url", "http://example.com"]);
    }

    #[tokio::test]
    async fn test_detection_disabled_leaves_techs_empty() {
        let mut capture = MockCaptureEngine::new();
        capture
            .expect_capture()
            .returning(|target, _| Ok(ok_page(target.as_str())));

        let config = test_config(false);
        let detector = Arc::new(silent_detector());
        let pipeline = TargetPipeline::new(Arc::new(capture), detector, &config);
        let scanner = Scanner::new(pipeline, 3);

        let result = scanner
            .scan_lines(
                ["a.example", "b.example", "c.example", "d.example"],
                Arc::new(LogObserver),
            )
            .await;

        assert_eq!(result.records.len(), 4);
        assert!(result.records.iter().all(|r| r.techs.is_empty()));
    }

    #[tokio::test]
    async fn test_detection_uses_final_url() {
        let mut capture = MockCaptureEngine::new();
        capture.expect_capture().returning(|_, _| {
            Ok(CapturedPage {
                final_url: Some("https://moved.example/".to_string()),
                chain: Some(RedirectChain::from_hops([Some(301)], 200)),
                title: "Moved".to_string(),
                asset_ref: None,
            })
        });

        let mut detector = MockTechDetector::new();
        detector
            .expect_detect()
            .withf(|url| url == "https://moved.example/")
            .times(1)
            .returning(|_| Ok(TechSet::from(["WordPress".to_string(), "PHP".to_string()])));

        let config = test_config(true);
        let pipeline = TargetPipeline::new(Arc::new(capture), Arc::new(detector), &config);
        let scanner = Scanner::new(pipeline, 1);

        let result = scanner.scan_lines(["old.example"], Arc::new(LogObserver)).await;

        assert_eq!(result.stats.redirects, 1);
        let record = &result.records[0];
        assert_eq!(record.capture.first_status, 301);
        assert!(record.techs.contains("WordPress"));
    }

    #[tokio::test]
    async fn test_mixed_outcomes_keep_stat_invariants() {
        let mut capture = MockCaptureEngine::new();
        capture.expect_capture().returning(|target, budget| {
            let url = target.as_str();
            if url.contains("slow") {
                Err(ScanError::Timeout(budget))
            } else if url.contains("dead") {
                Err(ScanError::Navigation("net::ERR_CONNECTION_REFUSED".to_string()))
            } else if url.contains("moved") {
                Ok(CapturedPage {
                    final_url: Some("https://new.example/".to_string()),
                    chain: Some(RedirectChain::from_hops([Some(302)], 200)),
                    title: String::new(),
                    asset_ref: None,
                })
            } else {
                Ok(ok_page(url))
            }
        });

        let config = test_config(false);
        let detector = Arc::new(silent_detector());
        let pipeline = TargetPipeline::new(Arc::new(capture), detector, &config);
        let scanner = Scanner::new(pipeline, 4);

        let result = scanner
            .scan_lines(
                [
                    "ok1.example",
                    "slow1.example",
                    "dead.example",
                    "moved.example",
                    "ok2.example",
                    "slow2.example",
                ],
                Arc::new(LogObserver),
            )
            .await;

        let stats = result.stats;
        assert_eq!(stats.total, 6);
        assert_eq!(stats.success, 3);
        assert_eq!(stats.errors, 3);
        assert_eq!(stats.timeouts, 2);
        assert_eq!(stats.redirects, 1);
        assert_eq!(stats.success + stats.errors, stats.total);
        assert!(stats.timeouts <= stats.errors);

        let failed = result
            .records
            .iter()
            .filter(|r| r.capture.error.is_some())
            .all(|r| r.capture.final_url.is_none() && r.capture.first_status == 0);
        assert!(failed);
    }

    #[tokio::test]
    async fn test_record_count_matches_input_for_any_concurrency() {
        let lines: Vec<String> = (0..6).map(|i| format!("host{i}.example")).collect();

        for concurrency in 1..=lines.len() {
            let capture = Arc::new(SlowCapture::default());
            let config = test_config(false);
            let detector = Arc::new(silent_detector());
            let pipeline = TargetPipeline::new(capture.clone(), detector, &config);
            let scanner = Scanner::new(pipeline, concurrency);
            let observer = Arc::new(CountingObserver::default());

            let result = scanner.scan_lines(&lines, observer.clone()).await;

            assert_eq!(result.stats.total, lines.len(), "concurrency {concurrency}");
            assert_eq!(observer.ticks.load(Ordering::SeqCst), lines.len());
            assert_eq!(capture.calls.load(Ordering::SeqCst), lines.len());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pipeline_invocations_are_bounded() {
        let capture = Arc::new(SlowCapture::default());
        let config = test_config(false);
        let detector = Arc::new(silent_detector());
        let pipeline = TargetPipeline::new(capture.clone(), detector, &config);
        let scanner = Scanner::new(pipeline, 3);

        let lines: Vec<String> = (0..30).map(|i| format!("host{i}.example")).collect();
        let result = scanner.scan_lines(&lines, Arc::new(LogObserver)).await;

        assert_eq!(result.stats.total, 30);
        assert!(capture.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_crashing_target_does_not_abort_batch() {
        let capture = Arc::new(SlowCapture::default());
        let config = test_config(false);
        let detector = Arc::new(silent_detector());
        let pipeline = TargetPipeline::new(capture.clone(), detector, &config);
        let scanner = Scanner::new(pipeline, 2);
        let observer = Arc::new(CountingObserver::default());

        let result = scanner
            .scan_lines(
                ["one.example", "crash.example", "two.example", "three.example"],
                observer.clone(),
            )
            .await;

        assert_eq!(result.records.len(), 3);
        assert_eq!(observer.ticks.load(Ordering::SeqCst), 4);
        assert!(result.records.iter().all(|r| !r.url().contains("crash")));
    }

    #[tokio::test]
    async fn test_scan_result_renders_report() {
        let mut capture = MockCaptureEngine::new();
        capture
            .expect_capture()
            .returning(|target, _| Ok(ok_page(target.as_str())));

        let config = test_config(false);
        let detector = Arc::new(silent_detector());
        let pipeline = TargetPipeline::new(Arc::new(capture), detector, &config);
        let scanner = Scanner::new(pipeline, 2);
        let result = scanner
            .scan_lines(["alpha.example", "beta.example"], Arc::new(LogObserver))
            .await;

        let emitter = ReportEmitter::new().unwrap();
        let html = String::from_utf8(emitter.render(&result).unwrap()).unwrap();
        assert!(html.contains("alpha.example"));
        assert!(html.contains("beta.example"));
        assert!(html.contains(&emitter.run_id().to_string()));
    }

    #[cfg(feature = "browser_integration")]
    #[tokio::test]
    async fn test_real_browser_capture() {
        use crate::BrowserCapture;

        let output_dir =
            std::env::temp_dir().join(format!("recon-snap-it-{}", std::process::id()));
        std::fs::create_dir_all(&output_dir).unwrap();

        let config = Config {
            concurrency: 2,
            capture_timeout: Duration::from_secs(15),
            output_dir: output_dir.clone(),
            chrome_path: std::env::var("CHROME_PATH").ok(),
            ..Default::default()
        };

        let capture = match BrowserCapture::launch(&config).await {
            Ok(capture) => Arc::new(capture),
            Err(e) => {
                eprintln!("Chrome unavailable, skipping: {e}");
                return;
            }
        };

        let detector = Arc::new(silent_detector());
        let pipeline = TargetPipeline::new(capture.clone(), detector, &config);
        let scanner = Scanner::new(pipeline, config.concurrency);
        let result = scanner.scan_lines(["example.com"], Arc::new(LogObserver)).await;
        capture.shutdown().await;

        assert_eq!(result.stats.total, 1);
        let record = &result.records[0];
        match &record.capture.error {
            None => {
                let asset = record.capture.asset_ref.as_ref().unwrap();
                assert!(output_dir.join(asset).exists());
                assert!(record.capture.first_status > 0);
            }
            // Sandboxed CI runners often have no outbound network
            Some(e) => eprintln!("Capture failed (may be expected offline): {e}"),
        }

        let _ = std::fs::remove_dir_all(output_dir);
    }
}
