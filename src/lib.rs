//! # recon-snap
//!
//! Bulk web reconnaissance: screenshot every target in a list, record the
//! first HTTP status of its redirect chain, optionally fingerprint the
//! technologies it runs, and fold everything into one HTML report.
//!
//! ## Pipeline
//!
//! ```text
//! lines ─▶ Target::parse ─▶ WorkerPool (N workers, one shared queue)
//!                               │
//!                               ▼
//!                        TargetPipeline
//!                 capture ─▶ detect (optional)
//!                               │
//!                  ProgressTracker tick, TargetRecord
//!                               ▼
//!                  aggregate() ─▶ ReportEmitter ─▶ report.html
//! ```
//!
//! - At most `concurrency` targets are in flight at any moment.
//! - A failing target never stops the batch: capture errors land on the
//!   record, detection errors become an empty technology set, and a worker
//!   that faults on a target drops just that target.
//! - Browser tabs are admitted by a semaphore of the same size as the pool,
//!   all on one shared headless Chrome.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recon_snap::{
//!     BrowserCapture, Config, HttpTechDetector, LogObserver, Scanner, TargetPipeline,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         detection_enabled: true,
//!         ..Default::default()
//!     };
//!     std::fs::create_dir_all(&config.output_dir)?;
//!
//!     let capture = Arc::new(BrowserCapture::launch(&config).await?);
//!     let detector = Arc::new(HttpTechDetector::new(&config)?);
//!     let pipeline = TargetPipeline::new(capture.clone(), detector, &config);
//!     let scanner = Scanner::new(pipeline, config.concurrency);
//!
//!     let result = scanner
//!         .scan_lines(["example.com", "https://example.org"], Arc::new(LogObserver))
//!         .await;
//!     capture.shutdown().await;
//!
//!     println!("{} of {} captured", result.stats.success, result.stats.total);
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! recon-snap --input targets.txt --output shots/ --concurrency 50 --timeout 8 --detect --results
//! ```
//!
//! ## Benchmarks
//!
//! ```bash
//! # Pure components only, no Chrome required
//! cargo bench
//!
//! # Tests that drive a real headless Chrome
//! cargo test --features browser_integration
//! ```

/// Configuration and browser launch settings
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Target normalization and screenshot file naming
pub mod target;

/// Redirect chains and first-status resolution
pub mod redirect;

/// Page capture through headless Chrome
pub mod capture;

/// Technology fingerprinting over HTTP
pub mod detect;

/// Per-target capture-then-detect pipeline
pub mod pipeline;

/// Bounded worker pool draining a shared target queue
pub mod worker;

/// Completion tracking and progress display
pub mod progress;

/// Run statistics over per-target records
pub mod aggregate;

/// HTML report rendering
pub mod report;

/// Batch scan orchestration
pub mod scan;

/// Command-line interface implementation
pub mod cli;

/// Run metrics and Prometheus export
pub mod metrics;

#[cfg(test)]
mod tests;

pub use aggregate::*;
pub use capture::*;
pub use cli::*;
pub use config::*;
pub use detect::*;
pub use error::*;
pub use self::metrics::*;
pub use pipeline::*;
pub use progress::*;
pub use redirect::*;
pub use report::*;
pub use scan::*;
pub use target::*;
pub use worker::*;
