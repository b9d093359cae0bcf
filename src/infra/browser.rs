//! Headless Chromium rasterizer driven over the DevTools protocol.

use std::path::PathBuf;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    cdp::browser_protocol::page::CaptureScreenshotFormat,
    handler::viewport::Viewport as CdpViewport,
    page::ScreenshotParams,
};
use futures::StreamExt;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::application::ports::{PageRasterizer, RasterizeError, Viewport};
use crate::config::CaptureSettings;

const CHARSET_PREAMBLE: &str = "<meta charset=\"UTF-8\">";
const META_CHARSET: &[u8] = b"<meta charset";
// Browsers only honour a charset declaration within the first 1024 bytes.
const CHARSET_PRESCAN_BYTES: usize = 1024;

/// Launches a fresh browser per capture and tears it down afterwards.
#[derive(Debug, Clone)]
pub struct ChromiumRasterizer {
    executable: Option<PathBuf>,
    no_sandbox: bool,
}

impl ChromiumRasterizer {
    pub fn new(settings: &CaptureSettings) -> Self {
        Self {
            executable: settings.browser_executable.clone(),
            no_sandbox: settings.no_sandbox,
        }
    }

    fn browser_config(&self, viewport: Viewport) -> Result<BrowserConfig, RasterizeError> {
        let mut builder = BrowserConfig::builder()
            .window_size(viewport.width, viewport.height)
            .viewport(CdpViewport {
                width: viewport.width,
                height: viewport.height,
                ..CdpViewport::default()
            })
            .arg("--ignore-certificate-errors")
            .arg("--hide-scrollbars");
        if let Some(path) = self.executable.as_ref() {
            builder = builder.chrome_executable(path);
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        builder.build().map_err(RasterizeError::Launch)
    }
}

#[async_trait]
impl PageRasterizer for ChromiumRasterizer {
    async fn rasterize(
        &self,
        html: &str,
        viewport: Viewport,
        deadline: Instant,
    ) -> Result<Vec<u8>, RasterizeError> {
        let config = self.browser_config(viewport)?;
        let (mut browser, mut handler) = timeout_at(deadline, Browser::launch(config))
            .await
            .map_err(|_| RasterizeError::DeadlineExceeded)?
            .map_err(|err| RasterizeError::Launch(err.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(target: "promptshot::capture", error = %err, "Browser handler stopped");
                    break;
                }
            }
        });

        // Close and reap below regardless of how the screenshot ends.
        let captured = timeout_at(deadline, screenshot(&browser, html))
            .await
            .unwrap_or(Err(RasterizeError::DeadlineExceeded));

        if let Err(err) = browser.close().await {
            warn!(target: "promptshot::capture", error = %err, "Failed to close browser");
        }
        if let Err(err) = browser.wait().await {
            warn!(target: "promptshot::capture", error = %err, "Failed to reap browser process");
        }
        events.abort();

        captured
    }
}

async fn screenshot(browser: &Browser, html: &str) -> Result<Vec<u8>, RasterizeError> {
    let page = browser
        .new_page(data_url(html))
        .await
        .map_err(|err| RasterizeError::Navigate(err.to_string()))?;
    page.wait_for_navigation()
        .await
        .map_err(|err| RasterizeError::Navigate(err.to_string()))?;

    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Png)
        .full_page(true)
        .build();
    page.screenshot(params)
        .await
        .map_err(|err| RasterizeError::Screenshot(err.to_string()))
}

/// `data:` URL for the document.
///
/// Markup without its own charset declaration gets a UTF-8 one in front; a
/// document that declares one is passed through with its DOCTYPE first.
pub fn data_url(html: &str) -> String {
    let encoded = if declares_charset(html) {
        STANDARD.encode(html.as_bytes())
    } else {
        let mut document = String::with_capacity(CHARSET_PREAMBLE.len() + html.len());
        document.push_str(CHARSET_PREAMBLE);
        document.push_str(html);
        STANDARD.encode(document.as_bytes())
    };
    format!("data:text/html;charset=utf-8;base64,{encoded}")
}

fn declares_charset(html: &str) -> bool {
    let head = &html.as_bytes()[..html.len().min(CHARSET_PRESCAN_BYTES)];
    head.windows(META_CHARSET.len())
        .any(|window| window.eq_ignore_ascii_case(META_CHARSET))
}
