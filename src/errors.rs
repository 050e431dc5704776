use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the browser driver itself, before the scraping core
/// assigns them a meaning.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("element not found: {0}")]
    ElementNotFound(String),
    #[error("browser error: {0}")]
    Browser(String),
}

/// The closed set of failures the scraping core can report.
///
/// Session-level variants (`LoginFormNotFound`, `LoginTimeout`) are fatal to
/// the whole user flow. Selection variants are recoverable by re-prompting.
/// Download-step variants are reported per selected record; one record's
/// failure never aborts the remaining records of an "all" selection.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("login form fields not found on the portal login page")]
    LoginFormNotFound,
    #[error("logged-in marker did not appear within {0:?}")]
    LoginTimeout(Duration),
    #[error("session is not authenticated")]
    NotAuthenticated,
    #[error("download directory is not usable: {0}")]
    DownloadDirUnusable(String),
    #[error("failed to scrape the listing page: {0}")]
    ScrapeFailed(String),
    #[error("selection {given} is outside 1..={max}")]
    SelectionOutOfRange { given: usize, max: usize },
    #[error("invalid selection {0:?}, expected a listing number or \"all\"")]
    InvalidSelection(String),
    #[error("popup opener not found on the detail page")]
    PopupNotFound,
    #[error("download frame did not appear within {0:?}")]
    FrameTimeout(Duration),
    #[error("download button was not clickable within {0:?}")]
    DownloadButtonTimeout(Duration),
    #[error("no new file appeared in the download directory within {0:?}")]
    DownloadTimeout(Duration),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}
