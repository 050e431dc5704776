mod chrome;
mod collate;
mod config;
mod download;
mod driver;
mod errors;
mod records;
mod search;
mod session;

pub use chrome::ChromeDriver;
pub use collate::{Selection, format_for_display, resolve_selection};
pub use config::{LoadFromEnv, PortalConfig, PortalMarkup, WaitPolicy};
pub use download::{DownloadOrchestrator, DownloadOutcome, FileTag};
pub use driver::PortalDriver;
pub use errors::{DriverError, ScraperError};
pub use records::{PastQuestionRecord, Semester, extract_course_code};
pub use search::{SearchEngine, normalize_query};
pub use session::{Credentials, Session, SessionManager};
