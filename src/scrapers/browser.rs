use crate::scrapers::traits::PageFetcher;
use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Page fetcher backed by headless Chrome, for listings rendered client-side
pub struct BrowserFetcher {
    browser: Browser,
    settle: Duration,
    /// When set, every rendered page is dumped here as HTML plus a screenshot
    debug_dir: Option<PathBuf>,
    pages: AtomicUsize,
}

impl BrowserFetcher {
    /// Launch a headless Chrome instance
    pub fn new() -> Result<Self> {
        info!("Launching headless Chrome...");

        let options = LaunchOptions::default_builder()
            .headless(true)
            .build()
            .context("Failed to build launch options")?;

        let browser = Browser::new(options).context("Failed to launch Chrome browser")?;

        Ok(Self {
            browser,
            settle: Duration::from_secs(8),
            debug_dir: None,
            pages: AtomicUsize::new(0),
        })
    }

    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug_dir = Some(dir.into());
        self
    }

    fn render(browser: &Browser, url: &str, settle: Duration, dump: Option<PathBuf>) -> Result<String> {
        let tab = browser.new_tab()?;

        tab.navigate_to(url)?;
        tab.wait_until_navigated()?;

        debug!("Waiting {:?} for {} to render", settle, url);
        thread::sleep(settle);

        // Dismiss the consent banner if present
        let _ = tab.evaluate(
            r#"
            const button = document.querySelector('button[id*="accept"], button[id*="agree"]');
            if (button) button.click();
            "#,
            false,
        );
        thread::sleep(Duration::from_secs(1));

        let html = tab
            .evaluate("document.documentElement.outerHTML", false)?
            .value
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        if let Some(prefix) = dump {
            if let Some(dir) = prefix.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(prefix.with_extension("html"), &html)?;
            let png = tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)?;
            std::fs::write(prefix.with_extension("png"), png)?;
            info!("Saved page dump to {}", prefix.display());
        }

        let _ = tab.close(true);
        Ok(html)
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let browser = self.browser.clone();
        let url_owned = url.to_string();
        let settle = self.settle;
        let dump = self.debug_dir.as_ref().map(|dir| {
            let n = self.pages.fetch_add(1, Ordering::Relaxed);
            dir.join(format!("page_{:04}", n))
        });

        let html = tokio::task::spawn_blocking(move || Self::render(&browser, &url_owned, settle, dump))
            .await
            .context("Browser task panicked")??;

        if html.is_empty() {
            warn!("Browser returned empty HTML for {}", url);
            anyhow::bail!("Empty page from browser: {}", url);
        }
        Ok(html)
    }
}
