use crate::{
    parse_targets, BrowserCapture, BrowserReaper, Config, HttpTechDetector, LogObserver, Metrics,
    MetricsExporter, ProgressBarObserver, ProgressObserver, ReportEmitter, ScanError, Scanner,
    Stats, Target, TargetPipeline,
};
use clap::Parser;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "recon-snap")]
#[command(about = "Bulk web screenshots with redirect tracking and technology fingerprinting")]
#[command(version)]
pub struct Cli {
    #[arg(short, long, help = "Input file containing targets (one per line)")]
    pub input: PathBuf,

    #[arg(short, long, help = "Output directory for screenshots and report [default: output]")]
    pub output: Option<PathBuf>,

    #[arg(short, long, help = "Number of concurrent workers [default: 30]")]
    pub concurrency: Option<usize>,

    #[arg(short, long, help = "Per-call timeout in seconds [default: 5]")]
    pub timeout: Option<u64>,

    #[arg(short, long, help = "Run technology detection on each target")]
    pub detect: bool,

    #[arg(short, long, help = "Open the report when the scan finishes")]
    pub results: bool,

    #[arg(long, help = "Write Prometheus metrics to <output>/metrics.prom")]
    pub metrics: bool,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,
}

impl Cli {
    /// Flags given on the command line win over the configuration file.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.capture_timeout = Duration::from_secs(timeout);
            config.detection_timeout = Duration::from_secs(timeout);
        }
        if self.detect {
            config.detection_enabled = true;
        }
        if let Some(chrome_path) = &self.chrome_path {
            config.chrome_path = Some(chrome_path.clone());
        }
    }
}

pub struct CliRunner {
    pub config: Config,
    input: PathBuf,
    open_results: bool,
    export_metrics: bool,
    reaper: BrowserReaper,
}

impl CliRunner {
    pub fn new(config: Config, args: &Cli) -> Self {
        Self {
            config,
            input: args.input.clone(),
            open_results: args.results,
            export_metrics: args.metrics,
            reaper: BrowserReaper::default(),
        }
    }

    /// Register the launched browser with `reaper` so an interrupt can
    /// kill it.
    pub fn with_reaper(mut self, reaper: BrowserReaper) -> Self {
        self.reaper = reaper;
        self
    }

    pub async fn run(&self) -> Result<Stats, ScanError> {
        // Preconditions are checked before the browser starts
        let targets = read_targets(&self.input).await?;
        info!(
            "Loaded {} targets from {}",
            targets.len(),
            self.input.display()
        );

        fs::create_dir_all(&self.config.output_dir).await?;

        let exporter = if self.export_metrics {
            Some(MetricsExporter::install()?)
        } else {
            None
        };
        let metrics = Arc::new(if exporter.is_some() {
            Metrics::registered()
        } else {
            Metrics::new()
        });

        let capture = Arc::new(BrowserCapture::launch(&self.config).await?);
        self.reaper.register(capture.clone());
        let detector = Arc::new(HttpTechDetector::new(&self.config)?);
        let pipeline =
            TargetPipeline::new(capture.clone(), detector, &self.config).with_metrics(metrics);
        let scanner = Scanner::new(pipeline, self.config.concurrency);

        let observer: Arc<dyn ProgressObserver> = if std::io::stderr().is_terminal() {
            Arc::new(ProgressBarObserver::new(targets.len()))
        } else {
            Arc::new(LogObserver)
        };

        let result = scanner.scan(targets, observer).await;
        capture.shutdown().await;

        let emitter = ReportEmitter::new()?;
        let report_path = self.config.report_path();
        fs::write(&report_path, emitter.render(&result)?).await?;
        info!(
            "Report {} written to {}",
            emitter.run_id(),
            report_path.display()
        );

        if let Some(exporter) = exporter {
            exporter.write_to(&self.config.output_dir.join("metrics.prom"))?;
        }

        println!(
            "Scanned {} targets: {} ok, {} errors ({} timeouts), {} redirects",
            result.stats.total,
            result.stats.success,
            result.stats.errors,
            result.stats.timeouts,
            result.stats.redirects
        );
        println!("Report: {}", report_path.display());

        if self.open_results {
            open_report(&report_path);
        }

        Ok(result.stats)
    }
}

/// Read and normalize the input file. A missing file, or one with no
/// usable lines, is fatal.
pub async fn read_targets(path: &Path) -> Result<Vec<Target>, ScanError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ScanError::InputNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };

    let targets = parse_targets(content.lines());
    if targets.is_empty() {
        return Err(ScanError::EmptyInput(path.to_path_buf()));
    }

    Ok(targets)
}

/// Hand the report to the platform's default opener. Failure is not fatal.
pub fn open_report(path: &Path) {
    let spawned = if cfg!(target_os = "windows") {
        std::process::Command::new("cmd")
            .args(["/C", "start", ""])
            .arg(path)
            .spawn()
    } else if cfg!(target_os = "macos") {
        std::process::Command::new("open").arg(path).spawn()
    } else {
        std::process::Command::new("xdg-open").arg(path).spawn()
    };

    if let Err(e) = spawned {
        warn!("Could not open {}: {}", path.display(), e);
    }
}

pub fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
}
