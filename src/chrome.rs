use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use log::info;
use tokio::task::JoinHandle;

use crate::driver::PortalDriver;
use crate::errors::DriverError;

/// Headless Chrome against the portal, driven over CDP.
///
/// The browser is configured so PDFs are saved straight into the per-flow
/// download directory instead of opening in the inline viewer; without that
/// the artifact never lands on disk as a distinct file.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    event_loop: JoinHandle<()>,
}

impl ChromeDriver {
    pub async fn launch(download_dir: &Path) -> Result<Self, DriverError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-extensions")
            .build()
            .map_err(DriverError::Browser)?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(cdp_err)?;
        let event_loop = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        browser
            .execute(
                SetDownloadBehaviorParams::builder()
                    .behavior(SetDownloadBehaviorBehavior::Allow)
                    .download_path(download_dir.display().to_string())
                    .build()
                    .map_err(DriverError::Browser)?,
            )
            .await
            .map_err(cdp_err)?;

        let page = browser.new_page("about:blank").await.map_err(cdp_err)?;
        info!(
            "launched headless browser, downloads land in {}",
            download_dir.display()
        );
        Ok(Self {
            browser,
            page,
            event_loop,
        })
    }
}

fn cdp_err(e: chromiumoxide::error::CdpError) -> DriverError {
    DriverError::Browser(e.to_string())
}

#[async_trait]
impl PortalDriver for ChromeDriver {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.page.goto(url).await.map_err(cdp_err)?;
        self.page.wait_for_navigation().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.page
            .url()
            .await
            .map_err(cdp_err)?
            .ok_or_else(|| DriverError::Browser("page has no url".to_string()))
    }

    async fn fill_by_name(&self, name: &str, value: &str) -> Result<(), DriverError> {
        let element = self
            .page
            .find_element(format!("[name=\"{name}\"]"))
            .await
            .map_err(|_| DriverError::ElementNotFound(name.to_string()))?;
        element.click().await.map_err(cdp_err)?;
        element.type_str(value).await.map_err(cdp_err)?;
        Ok(())
    }

    async fn click_by_name(&self, name: &str) -> Result<(), DriverError> {
        let element = self
            .page
            .find_element(format!("[name=\"{name}\"]"))
            .await
            .map_err(|_| DriverError::ElementNotFound(name.to_string()))?;
        element.click().await.map_err(cdp_err)?;
        self.page.wait_for_navigation().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn element_exists(&self, css: &str) -> Result<bool, DriverError> {
        let js = format!("document.querySelector('{css}') !== null");
        let result = self.page.evaluate(js).await.map_err(cdp_err)?;
        result
            .into_value::<bool>()
            .map_err(|e| DriverError::Browser(e.to_string()))
    }

    async fn click_via_script(&self, css: &str) -> Result<(), DriverError> {
        let js = format!(
            "(() => {{ const el = document.querySelector('{css}'); \
             if (!el) return false; el.click(); return true; }})()"
        );
        let result = self.page.evaluate(js).await.map_err(cdp_err)?;
        let clicked = result
            .into_value::<bool>()
            .map_err(|e| DriverError::Browser(e.to_string()))?;
        if !clicked {
            return Err(DriverError::ElementNotFound(css.to_string()));
        }
        Ok(())
    }

    // The frame is same-origin, so its content document is reachable from
    // the top document without a context switch.
    async fn element_exists_in_frame(
        &self,
        frame_css: &str,
        css: &str,
    ) -> Result<bool, DriverError> {
        let js = format!(
            "(() => {{ const f = document.querySelector('{frame_css}'); \
             if (!f || !f.contentDocument) return false; \
             return f.contentDocument.querySelector('{css}') !== null; }})()"
        );
        let result = self.page.evaluate(js).await.map_err(cdp_err)?;
        result
            .into_value::<bool>()
            .map_err(|e| DriverError::Browser(e.to_string()))
    }

    async fn click_in_frame(&self, frame_css: &str, css: &str) -> Result<(), DriverError> {
        let js = format!(
            "(() => {{ const f = document.querySelector('{frame_css}'); \
             if (!f || !f.contentDocument) return false; \
             const el = f.contentDocument.querySelector('{css}'); \
             if (!el) return false; el.click(); return true; }})()"
        );
        let result = self.page.evaluate(js).await.map_err(cdp_err)?;
        let clicked = result
            .into_value::<bool>()
            .map_err(|e| DriverError::Browser(e.to_string()))?;
        if !clicked {
            return Err(DriverError::ElementNotFound(format!("{frame_css} {css}")));
        }
        Ok(())
    }

    async fn back(&self) -> Result<(), DriverError> {
        self.page.evaluate("history.back()").await.map_err(cdp_err)?;
        self.page.wait_for_navigation().await.map_err(cdp_err)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.browser.close().await.map_err(cdp_err)?;
        let _ = self.browser.wait().await;
        self.event_loop.abort();
        Ok(())
    }
}
