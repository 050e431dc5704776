use std::path::{Path, PathBuf};

use log::info;
use tokio::time::{Instant, sleep};

use crate::config::{PortalMarkup, WaitPolicy};
use crate::driver::PortalDriver;
use crate::errors::{DriverError, ScraperError};

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// A live, authenticated browser connection to the portal.
///
/// Exclusively owned by the flow that opened it. The underlying automation
/// handle is not safe for concurrent use, so nothing hands out clones; a
/// second user gets a second session with its own download directory.
pub struct Session {
    driver: Box<dyn PortalDriver>,
    authenticated: bool,
    download_dir: PathBuf,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.authenticated)
            .field("download_dir", &self.download_dir)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub async fn current_url(&self) -> Result<String, ScraperError> {
        Ok(self.driver.current_url().await?)
    }

    pub(crate) fn driver(&self) -> &dyn PortalDriver {
        &*self.driver
    }

    /// Tear the browser down. Partial files in the download directory are
    /// left for later cleanup.
    pub async fn close(mut self) -> Result<(), ScraperError> {
        self.driver.close().await?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn scripted(
        driver: Box<dyn PortalDriver>,
        download_dir: PathBuf,
        authenticated: bool,
    ) -> Self {
        Self {
            driver,
            authenticated,
            download_dir,
        }
    }
}

/// Establishes one authenticated session against the portal for the
/// lifetime of a user's request flow.
pub struct SessionManager {
    login_url: String,
    markup: PortalMarkup,
    waits: WaitPolicy,
}

impl SessionManager {
    pub fn new(login_url: String, markup: PortalMarkup, waits: WaitPolicy) -> Self {
        Self {
            login_url,
            markup,
            waits,
        }
    }

    /// Log in and wait for the post-login marker. Both failure modes are
    /// terminal for the session: no retry is attempted here, the caller
    /// surfaces the error and must not proceed to search or download.
    pub async fn open(
        &self,
        driver: Box<dyn PortalDriver>,
        credentials: &Credentials,
        download_dir: &Path,
    ) -> Result<Session, ScraperError> {
        ensure_writable(download_dir)?;

        driver.goto(&self.login_url).await?;
        driver
            .fill_by_name(self.markup.username_field, &credentials.username)
            .await
            .map_err(form_missing)?;
        driver
            .fill_by_name(self.markup.password_field, &credentials.password)
            .await
            .map_err(form_missing)?;
        driver
            .click_by_name(self.markup.login_button)
            .await
            .map_err(form_missing)?;

        let deadline = Instant::now() + self.waits.login;
        loop {
            if driver.element_exists(self.markup.logout_marker).await? {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ScraperError::LoginTimeout(self.waits.login));
            }
            sleep(self.waits.poll).await;
        }

        info!("logged in to the portal at {}", self.login_url);
        Ok(Session {
            driver,
            authenticated: true,
            download_dir: download_dir.to_path_buf(),
        })
    }
}

fn form_missing(e: DriverError) -> ScraperError {
    match e {
        DriverError::ElementNotFound(_) => ScraperError::LoginFormNotFound,
        other => ScraperError::Driver(other),
    }
}

// Hard precondition, not an incidental effect: the directory must exist and
// be writable before any download is triggered into it.
fn ensure_writable(dir: &Path) -> Result<(), ScraperError> {
    if !dir.is_dir() {
        return Err(ScraperError::DownloadDirUnusable(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let probe = dir.join(".write-probe");
    std::fs::write(&probe, b"").map_err(|e| ScraperError::DownloadDirUnusable(e.to_string()))?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}
