//! Page capture: the render-and-screenshot stage of the pipeline
//!
//! [`CaptureEngine`] is the seam the pipeline talks to. [`BrowserCapture`]
//! implements it on top of one shared headless Chrome driven through the
//! DevTools protocol, admitting at most `concurrency` open tabs at a time.

use crate::{
    create_browser_config, resolve_first_status, Config, RedirectChain, ScanError, Target,
    Viewport,
};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// What a capture engine learned about one target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedPage {
    /// URL of the terminal document response, when one was received
    pub final_url: Option<String>,
    /// Redirect chain of the main document, when a response was received
    pub chain: Option<RedirectChain>,
    pub title: String,
    /// File name of the saved screenshot, relative to the output directory
    pub asset_ref: Option<String>,
}

/// Capture fields of a per-target record.
///
/// Failures never escape as errors: they land in `error` and leave the other
/// fields at their empty defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CaptureOutcome {
    pub requested_url: String,
    pub final_url: Option<String>,
    /// Status of the earliest response in the redirect chain, 0 without a response
    pub first_status: u16,
    pub title: String,
    pub asset_ref: Option<String>,
    pub error: Option<String>,
}

impl CaptureOutcome {
    pub fn captured(target: &Target, page: CapturedPage) -> Self {
        Self {
            requested_url: target.to_string(),
            final_url: page.final_url,
            first_status: page.chain.as_ref().map(resolve_first_status).unwrap_or(0),
            title: page.title,
            asset_ref: page.asset_ref,
            error: None,
        }
    }

    pub fn failed(target: &Target, error: &ScanError) -> Self {
        Self {
            requested_url: target.to_string(),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptureEngine: Send + Sync {
    /// Render `target` and save a snapshot, within `budget`.
    async fn capture(&self, target: &Target, budget: Duration) -> Result<CapturedPage, ScanError>;
}

/// A network request as seen by the page, reduced to what chain
/// extraction needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedRequest {
    pub request_id: String,
    pub is_document: bool,
    /// Status of the redirect response that spawned this request
    pub redirect_status: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObservedResponse {
    pub request_id: String,
    pub is_document: bool,
    pub status: i64,
    pub url: String,
}

/// Extract the main document's redirect chain and final URL.
///
/// The first document request is the navigation; Chrome reuses its request
/// id for every redirect hop.
pub fn document_chain(
    requests: &[ObservedRequest],
    responses: &[ObservedResponse],
) -> Option<(RedirectChain, String)> {
    let mut document: Option<&str> = None;
    let mut hops = Vec::new();

    for request in requests.iter().filter(|r| r.is_document) {
        let id = *document.get_or_insert(request.request_id.as_str());
        if id != request.request_id {
            continue;
        }
        if let Some(status) = request.redirect_status {
            hops.push(u16::try_from(status).ok());
        }
    }

    let id = document?;
    let terminal = responses
        .iter()
        .find(|r| r.is_document && r.request_id == id)?;

    Some((
        RedirectChain::from_hops(hops, u16::try_from(terminal.status).unwrap_or(0)),
        terminal.url.clone(),
    ))
}

/// Map a DevTools error, keeping chromiumoxide's own request timeout a
/// timeout rather than folding it into `other`.
fn cdp_error(error: CdpError, budget: Duration, other: fn(String) -> ScanError) -> ScanError {
    match error {
        CdpError::Timeout => ScanError::Timeout(budget),
        error => other(error.to_string()),
    }
}

/// A tab that can be closed from outside the task that opened it.
#[async_trait]
trait Tab: Clone + Send + 'static {
    async fn close_tab(self);
}

#[async_trait]
impl Tab for Page {
    async fn close_tab(self) {
        if let Err(e) = self.close().await {
            debug!("Failed to close tab: {}", e);
        }
    }
}

/// Closes its tab on every path. A capture future dropped by a timeout
/// never reaches the explicit close, so the drop hands it to the runtime.
struct TabGuard<T: Tab> {
    tab: T,
    armed: bool,
}

impl<T: Tab> TabGuard<T> {
    fn new(tab: T) -> Self {
        Self { tab, armed: true }
    }

    async fn close(mut self) {
        self.tab.clone().close_tab().await;
        self.armed = false;
    }
}

impl<T: Tab> Drop for TabGuard<T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(self.tab.clone().close_tab());
            }
            Err(_) => debug!("No runtime left to close an abandoned tab"),
        }
    }
}

/// A browser process that can be killed without a graceful close.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    async fn kill(&self);
}

/// Browsers that must not outlive this process. The interrupt handler
/// kills everything registered here before exiting.
#[derive(Clone, Default)]
pub struct BrowserReaper {
    browsers: Arc<std::sync::Mutex<Vec<Arc<dyn BrowserProcess>>>>,
}

impl BrowserReaper {
    pub fn register(&self, browser: Arc<dyn BrowserProcess>) {
        self.browsers().push(browser);
    }

    /// Kill every registered browser, waiting at most `grace` for each.
    /// Returns how many were killed in time.
    pub async fn kill_all(&self, grace: Duration) -> usize {
        let browsers: Vec<_> = self.browsers().drain(..).collect();
        let mut killed = 0;

        for browser in browsers {
            match timeout(grace, browser.kill()).await {
                Ok(()) => killed += 1,
                Err(_) => warn!("Browser still alive after {:?}, giving up", grace),
            }
        }

        killed
    }

    fn browsers(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn BrowserProcess>>> {
        match self.browsers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct BrowserCapture {
    // Tabs are opened under the read lock; only close and kill take it
    // exclusively
    browser: RwLock<Browser>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
    tabs: Arc<Semaphore>,
    output_dir: PathBuf,
    viewport: Viewport,
    full_page: bool,
}

impl BrowserCapture {
    pub async fn launch(config: &Config) -> Result<Self, ScanError> {
        let browser_config = create_browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScanError::BrowserLaunchFailed(e.to_string()))?;

        // The handler is the CDP event loop and must be polled for the
        // browser to make progress
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Browser handler error: {}", e);
                }
            }
            debug!("Browser handler stream ended");
        });

        info!(
            "Browser launched, admitting {} concurrent tabs",
            config.concurrency
        );

        Ok(Self {
            browser: RwLock::new(browser),
            handler: std::sync::Mutex::new(Some(handler_task)),
            tabs: Arc::new(Semaphore::new(config.concurrency)),
            output_dir: config.output_dir.clone(),
            viewport: config.viewport.clone(),
            full_page: config.full_page,
        })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down browser...");
        self.tabs.close();

        if let Err(e) = self.browser.write().await.close().await {
            debug!("Browser close failed: {}", e);
        }

        let handler = match self.handler.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handler) = handler {
            handler.abort();
        }

        info!("Browser shutdown complete");
    }

    async fn capture_in_new_tab(
        &self,
        target: &Target,
        budget: Duration,
    ) -> Result<CapturedPage, ScanError> {
        let page = self
            .browser
            .read()
            .await
            .new_page("about:blank")
            .await
            .map_err(|e| cdp_error(e, budget, ScanError::CaptureFailed))?;

        let tab = TabGuard::new(page);
        let result = self.capture_in_tab(&tab.tab, target, budget).await;
        tab.close().await;

        result
    }

    async fn capture_in_tab(
        &self,
        page: &Page,
        target: &Target,
        budget: Duration,
    ) -> Result<CapturedPage, ScanError> {
        let emulation = SetDeviceMetricsOverrideParams::builder()
            .width(self.viewport.width)
            .height(self.viewport.height)
            .device_scale_factor(self.viewport.device_scale_factor)
            .mobile(false)
            .build()
            .map_err(ScanError::CaptureFailed)?;

        page.execute(emulation)
            .await
            .map_err(|e| cdp_error(e, budget, ScanError::CaptureFailed))?;

        let mut requests = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| cdp_error(e, budget, ScanError::CaptureFailed))?;
        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| cdp_error(e, budget, ScanError::CaptureFailed))?;

        page.goto(target.as_str())
            .await
            .map_err(|e| cdp_error(e, budget, ScanError::Navigation))?;

        let observed_requests = drain_requests(&mut requests);
        let observed_responses = drain_responses(&mut responses);
        let document = document_chain(&observed_requests, &observed_responses);

        let title = page.get_title().await.ok().flatten().unwrap_or_default();

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(self.full_page)
            .build();

        let png = page
            .screenshot(params)
            .await
            .map_err(|e| cdp_error(e, budget, ScanError::CaptureFailed))?;

        let filename = target.screenshot_filename();
        tokio::fs::write(self.output_dir.join(&filename), &png).await?;

        let (chain, final_url) = match document {
            Some((chain, url)) => (Some(chain), Some(url)),
            None => (None, None),
        };

        Ok(CapturedPage {
            final_url,
            chain,
            title,
            asset_ref: Some(filename),
        })
    }
}

#[async_trait]
impl CaptureEngine for BrowserCapture {
    async fn capture(&self, target: &Target, budget: Duration) -> Result<CapturedPage, ScanError> {
        let _permit = self
            .tabs
            .acquire()
            .await
            .map_err(|e| ScanError::CaptureFailed(e.to_string()))?;

        // Opening the tab counts against the budget too
        match timeout(budget, self.capture_in_new_tab(target, budget)).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout(budget)),
        }
    }
}

#[async_trait]
impl BrowserProcess for BrowserCapture {
    async fn kill(&self) {
        match self.browser.write().await.kill().await {
            Some(Ok(())) => info!("Browser process killed"),
            Some(Err(e)) => warn!("Failed to kill browser: {}", e),
            None => debug!("Browser process already gone"),
        }
    }
}

// Events are buffered by the listener while navigation runs, so draining
// without waiting sees everything delivered up to the load event.
fn drain_requests(stream: &mut EventStream<EventRequestWillBeSent>) -> Vec<ObservedRequest> {
    let mut observed = Vec::new();
    while let Some(Some(event)) = stream.next().now_or_never() {
        observed.push(ObservedRequest {
            request_id: event.request_id.inner().clone(),
            is_document: event.r#type == Some(ResourceType::Document),
            redirect_status: event.redirect_response.as_ref().map(|r| r.status),
        });
    }
    observed
}

fn drain_responses(stream: &mut EventStream<EventResponseReceived>) -> Vec<ObservedResponse> {
    let mut observed = Vec::new();
    while let Some(Some(event)) = stream.next().now_or_never() {
        observed.push(ObservedResponse {
            request_id: event.request_id.inner().clone(),
            is_document: event.r#type == ResourceType::Document,
            status: event.response.status,
            url: event.response.url.clone(),
        });
    }
    observed
}
