//! Configuration management with serde serialization/deserialization
//!
//! This module holds the run configuration for a scan: concurrency, per-call
//! timeouts, whether technology detection runs, where artifacts land, and
//! how the shared headless browser is launched.

use crate::{ScanError, CAPTURE_GRACE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Main configuration structure for a scan run
///
/// # Examples
///
/// ```rust
/// use recon_snap::Config;
///
/// let config = Config {
///     concurrency: 10,
///     detection_enabled: true,
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Number of concurrent workers, and of open browser tabs (default: 30)
    pub concurrency: usize,

    /// Budget for one capture: navigation, title and screenshot (default: 5 seconds)
    pub capture_timeout: Duration,

    /// Budget for one detection fetch (default: 5 seconds)
    pub detection_timeout: Duration,

    /// Run technology detection after each capture (default: false)
    pub detection_enabled: bool,

    /// Directory receiving screenshots and the report (default: `output`)
    pub output_dir: PathBuf,

    /// Browser viewport used for every capture
    pub viewport: Viewport,

    /// User-Agent sent by the browser and the detector
    pub user_agent: Option<String>,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Accept invalid TLS certificates (default: true)
    ///
    /// Recon targets routinely serve self-signed or expired certificates.
    pub ignore_https_errors: bool,

    /// Capture the full scrollable page instead of the viewport (default: false)
    pub full_page: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: 30,
            capture_timeout: Duration::from_secs(5),
            detection_timeout: Duration::from_secs(5),
            detection_enabled: false,
            output_dir: PathBuf::from("output"),
            viewport: Viewport::default(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            chrome_path: None,
            ignore_https_errors: true,
            full_page: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.concurrency == 0 {
            return Err(ScanError::Configuration(
                "Concurrency must be greater than 0".to_string(),
            ));
        }

        if self.capture_timeout.is_zero() || self.detection_timeout.is_zero() {
            return Err(ScanError::Configuration(
                "Timeouts must be greater than 0".to_string(),
            ));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ScanError::Configuration(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("report.html")
    }

    /// Timeout for a single DevTools request. Outlasts the capture budget so
    /// the budget decides when a capture gives up.
    pub fn devtools_timeout(&self) -> Duration {
        self.capture_timeout + CAPTURE_GRACE
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }
}

/// Browser viewport configuration for screenshots
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1280)
    pub width: u32,

    /// Viewport height in pixels (default: 800)
    pub height: u32,

    /// Device pixel ratio (default: 1.0)
    pub device_scale_factor: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            device_scale_factor: 1.0,
        }
    }
}

/// Generate Chrome command-line arguments based on configuration
///
/// ```rust
/// use recon_snap::{Config, get_chrome_args};
///
/// let args = get_chrome_args(&Config::default());
/// assert!(args.contains(&"--headless".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    let mut args = vec![
        "--headless".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--mute-audio".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
        // Unique profile so parallel runs never share a Chrome singleton
        format!(
            "--user-data-dir={}",
            std::env::temp_dir()
                .join(format!("recon-snap-{}", std::process::id()))
                .display()
        ),
    ];

    if config.ignore_https_errors {
        args.push("--ignore-certificate-errors".to_string());
        args.push("--allow-running-insecure-content".to_string());
    }

    if let Some(user_agent) = &config.user_agent {
        args.push(format!("--user-agent={user_agent}"));
    }

    args
}

pub fn create_browser_config(
    config: &Config,
) -> Result<chromiumoxide::browser::BrowserConfig, ScanError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .request_timeout(config.devtools_timeout())
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(ScanError::BrowserLaunchFailed)
}
