use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{info, warn};
use rand::Rng;
use tokio::time::{Instant, sleep};

use crate::config::{PortalMarkup, WaitPolicy};
use crate::errors::{DriverError, ScraperError};
use crate::records::{PastQuestionRecord, extract_course_code};
use crate::session::Session;

/// Identifies who a downloaded file belongs to. The random suffix keeps two
/// flows that share a user identifier from ever computing the same final
/// name; given the same tag and title the final path is deterministic.
#[derive(Debug, Clone)]
pub struct FileTag {
    pub user_id: String,
    pub suffix: String,
}

impl FileTag {
    pub fn new(user_id: impl Into<String>) -> Self {
        let suffix = rand::rng().random_range(100_000..1_000_000).to_string();
        Self::with_suffix(user_id, suffix)
    }

    pub fn with_suffix(user_id: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            suffix: suffix.into(),
        }
    }
}

/// Per-record result of an "all" run, for the partial-success summary.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub record: PastQuestionRecord,
    pub result: Result<PathBuf, ScraperError>,
}

/// Drives one detail page's download flow: open the popup, reach into the
/// injected frame, click the download control, then watch the download
/// directory until the file lands. Linear, no internal retries; every step
/// fails with its own error and the caller decides whether to re-attempt.
pub struct DownloadOrchestrator {
    markup: PortalMarkup,
    waits: WaitPolicy,
}

impl DownloadOrchestrator {
    pub fn new(markup: PortalMarkup, waits: WaitPolicy) -> Self {
        Self { markup, waits }
    }

    pub async fn download(
        &self,
        session: &mut Session,
        record: &PastQuestionRecord,
        tag: &FileTag,
    ) -> Result<PathBuf, ScraperError> {
        if !session.is_authenticated() {
            return Err(ScraperError::NotAuthenticated);
        }
        let started = SystemTime::now();
        let driver = session.driver();

        driver.goto(&record.detail_link).await?;

        // The opener can sit occluded in the headless viewport, so the click
        // goes through script execution instead of a native click.
        driver
            .click_via_script(self.markup.popup_opener)
            .await
            .map_err(|e| match e {
                DriverError::ElementNotFound(_) => ScraperError::PopupNotFound,
                other => ScraperError::Driver(other),
            })?;

        // The download control lives in a frame injected after the popup
        // opens; it is not in the initial DOM.
        let deadline = Instant::now() + self.waits.frame;
        loop {
            if driver.element_exists(self.markup.frame).await? {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ScraperError::FrameTimeout(self.waits.frame));
            }
            sleep(self.waits.poll).await;
        }

        let deadline = Instant::now() + self.waits.download_button;
        loop {
            if driver
                .element_exists_in_frame(self.markup.frame, self.markup.download_button)
                .await?
            {
                break;
            }
            if Instant::now() >= deadline {
                return Err(ScraperError::DownloadButtonTimeout(self.waits.download_button));
            }
            sleep(self.waits.poll).await;
        }
        driver
            .click_in_frame(self.markup.frame, self.markup.download_button)
            .await
            .map_err(|e| match e {
                DriverError::ElementNotFound(_) => {
                    ScraperError::DownloadButtonTimeout(self.waits.download_button)
                }
                other => ScraperError::Driver(other),
            })?;
        info!("initiated download for {}", record.title);

        // The browser gives no completion callback for file saves; the only
        // signal is a new .pdf appearing in the directory.
        let path = self.await_file(session.download_dir(), started).await?;

        if let Err(e) = driver.back().await {
            warn!("could not navigate back after downloading {}: {e}", record.title);
        }

        // Tag the artifact with the course code when the title carries one;
        // the raw title is the fallback for oddly-named papers.
        let label =
            extract_course_code(&record.title).unwrap_or_else(|| record.title.clone());
        let renamed = rename_downloaded(&path, tag, &label)?;
        info!("downloaded {} to {}", record.title, renamed.display());
        Ok(renamed)
    }

    /// Download every selected record, strictly one after another:
    /// concurrent saves into one directory would make the newest-file
    /// heuristic ambiguous. One record's failure never aborts the rest.
    pub async fn download_all(
        &self,
        session: &mut Session,
        records: &[&PastQuestionRecord],
        tag: &FileTag,
    ) -> Vec<DownloadOutcome> {
        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let result = self.download(session, record, tag).await;
            if let Err(e) = &result {
                warn!("download failed for {}: {e}", record.title);
            }
            outcomes.push(DownloadOutcome {
                record: (*record).clone(),
                result,
            });
        }
        outcomes
    }

    async fn await_file(&self, dir: &Path, since: SystemTime) -> Result<PathBuf, ScraperError> {
        let deadline = Instant::now() + self.waits.file;
        loop {
            if let Some(path) = newest_pdf_since(dir, since)? {
                return Ok(path);
            }
            if Instant::now() >= deadline {
                return Err(ScraperError::DownloadTimeout(self.waits.file));
            }
            sleep(self.waits.poll).await;
        }
    }
}

/// Newest `.pdf` in `dir` modified at or after `since`. Pre-existing files
/// never match, which is what keeps a timed-out attempt from returning a
/// stale artifact.
fn newest_pdf_since(dir: &Path, since: SystemTime) -> std::io::Result<Option<PathBuf>> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("pdf") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if modified < since {
            continue;
        }
        if newest.as_ref().is_none_or(|(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// Rename to `<user>_<suffix>_<title_prefix>.pdf` next to the original.
/// Deterministic for the same tag and title; an existing target is never
/// overwritten, it gets a numeric disambiguator instead.
fn rename_downloaded(path: &Path, tag: &FileTag, title: &str) -> std::io::Result<PathBuf> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let prefix: String = sanitize_filename(title).chars().take(12).collect();
    let base = format!("{}_{}_{prefix}", sanitize_filename(&tag.user_id), tag.suffix);

    let mut target = dir.join(format!("{base}.pdf"));
    let mut n = 1;
    while target.exists() && target != *path {
        target = dir.join(format!("{base}-{n}.pdf"));
        n += 1;
    }
    if target != *path {
        std::fs::rename(path, &target)?;
    }
    Ok(target)
}

// Windows-unsafe characters become underscores; slashes and spaces are
// dropped so the prefix reads as one token.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '/' && *c != ' ')
        .map(|c| match c {
            ':' | '\\' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::driver::fake::{FakeDriver, FakeState};
    use crate::records::Semester;
    use crate::session::Session;

    const FRAME_KEY: &str = "iframe.cboxIframe";
    const BUTTON_KEY: &str = "iframe.cboxIframe #download";

    fn quick_waits() -> WaitPolicy {
        WaitPolicy {
            login: Duration::from_millis(100),
            frame: Duration::from_millis(200),
            download_button: Duration::from_millis(200),
            file: Duration::from_millis(300),
            poll: Duration::from_millis(10),
        }
    }

    fn record(id: u32) -> PastQuestionRecord {
        PastQuestionRecord {
            title: format!("DCIT 103: Intro {id}"),
            year: "2019".to_string(),
            semester: Semester::First,
            detail_link: format!("https://portal.example/detail?id={id}"),
        }
    }

    fn orchestrator() -> DownloadOrchestrator {
        DownloadOrchestrator::new(PortalMarkup::default(), quick_waits())
    }

    fn happy_path_state(download_dir: &Path) -> FakeState {
        let mut state = FakeState::default();
        state.present.insert(".openPopUp".to_string());
        // The frame is injected a few polls after the popup opens, the
        // button a poll after that.
        state.appear_after.insert(FRAME_KEY.to_string(), 2);
        state.appear_after.insert(BUTTON_KEY.to_string(), 1);
        state.file_on_download_click = Some(download_dir.join("paper.pdf"));
        state
    }

    #[tokio::test]
    async fn download_walks_the_flow_and_returns_the_renamed_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new(happy_path_state(dir.path()));
        let state = driver.handle();
        let mut session = Session::scripted(Box::new(driver), dir.path().to_path_buf(), true);

        let tag = FileTag::with_suffix("1234567", "654321");
        let path = orchestrator()
            .download(&mut session, &record(1), &tag)
            .await
            .unwrap();

        assert_eq!(path, dir.path().join("1234567_654321_DCIT103.pdf"));
        assert!(path.exists());

        let state = state.lock().unwrap();
        assert_eq!(state.url, "https://portal.example/detail?id=1");
        assert_eq!(
            state.clicked,
            vec![".openPopUp".to_string(), BUTTON_KEY.to_string()]
        );
    }

    #[tokio::test]
    async fn missing_popup_opener_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new(FakeState::default());
        let mut session = Session::scripted(Box::new(driver), dir.path().to_path_buf(), true);

        let err = orchestrator()
            .download(&mut session, &record(1), &FileTag::with_suffix("u", "1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ScraperError::PopupNotFound));
    }

    #[tokio::test]
    async fn frame_that_never_appears_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FakeState::default();
        state.present.insert(".openPopUp".to_string());
        let driver = FakeDriver::new(state);
        let mut session = Session::scripted(Box::new(driver), dir.path().to_path_buf(), true);

        let err = orchestrator()
            .download(&mut session, &record(1), &FileTag::with_suffix("u", "1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ScraperError::FrameTimeout(_)));
    }

    #[tokio::test]
    async fn button_that_never_becomes_clickable_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = FakeState::default();
        state.present.insert(".openPopUp".to_string());
        state.appear_after.insert(FRAME_KEY.to_string(), 0);
        let driver = FakeDriver::new(state);
        let mut session = Session::scripted(Box::new(driver), dir.path().to_path_buf(), true);

        let err = orchestrator()
            .download(&mut session, &record(1), &FileTag::with_suffix("u", "1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ScraperError::DownloadButtonTimeout(_)));
    }

    #[tokio::test]
    async fn no_file_within_the_window_is_a_download_timeout_not_a_stale_hit() {
        let dir = tempfile::tempdir().unwrap();
        // A pdf from an earlier attempt is already sitting there.
        std::fs::write(dir.path().join("stale.pdf"), b"%PDF-1.4").unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut state = happy_path_state(dir.path());
        state.file_on_download_click = None; // the click never produces a file
        let driver = FakeDriver::new(state);
        let mut session = Session::scripted(Box::new(driver), dir.path().to_path_buf(), true);

        let err = orchestrator()
            .download(&mut session, &record(1), &FileTag::with_suffix("u", "1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ScraperError::DownloadTimeout(_)));
        assert!(dir.path().join("stale.pdf").exists());
    }

    #[tokio::test]
    async fn download_refuses_an_unauthenticated_session() {
        let dir = tempfile::tempdir().unwrap();
        let driver = FakeDriver::new(happy_path_state(dir.path()));
        let mut session = Session::scripted(Box::new(driver), dir.path().to_path_buf(), false);

        let err = orchestrator()
            .download(&mut session, &record(1), &FileTag::with_suffix("u", "1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ScraperError::NotAuthenticated));
    }

    #[tokio::test]
    async fn all_run_continues_past_a_failing_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = happy_path_state(dir.path());
        // Record 1's detail page lost its popup opener; record 2 is fine.
        state
            .fail_popup_on
            .insert("https://portal.example/detail?id=1".to_string());
        let driver = FakeDriver::new(state);
        let mut session = Session::scripted(Box::new(driver), dir.path().to_path_buf(), true);

        let records = [record(1), record(2)];
        let selected: Vec<&PastQuestionRecord> = records.iter().collect();
        let outcomes = orchestrator()
            .download_all(&mut session, &selected, &FileTag::with_suffix("u", "9"))
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0].result,
            Err(ScraperError::PopupNotFound)
        ));
        assert!(outcomes[1].result.is_ok());
    }

    #[test]
    fn rename_is_deterministic_and_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let tag = FileTag::with_suffix("42", "111111");

        let first = dir.path().join("a.pdf");
        std::fs::write(&first, b"one").unwrap();
        let renamed = rename_downloaded(&first, &tag, "DCIT 103: Intro").unwrap();
        assert_eq!(renamed, dir.path().join("42_111111_DCIT103_Intr.pdf"));

        // Same tag and title again: the first artifact must survive.
        let second = dir.path().join("b.pdf");
        std::fs::write(&second, b"two").unwrap();
        let renamed_again = rename_downloaded(&second, &tag, "DCIT 103: Intro").unwrap();
        assert_eq!(renamed_again, dir.path().join("42_111111_DCIT103_Intr-1.pdf"));
        assert_eq!(std::fs::read(&renamed).unwrap(), b"one");
        assert_eq!(std::fs::read(&renamed_again).unwrap(), b"two");
    }

    #[test]
    fn newest_pdf_ignores_other_extensions_and_older_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.pdf"), b"old").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"txt").unwrap();
        // Margin around `since` so coarse mtime clocks can't blur which
        // side of the cutoff each file falls on.
        std::thread::sleep(Duration::from_millis(20));
        let since = SystemTime::now();
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(dir.path().join("partial.crdownload"), b"...").unwrap();
        std::fs::write(dir.path().join("fresh.pdf"), b"new").unwrap();

        let found = newest_pdf_since(dir.path(), since).unwrap().unwrap();
        assert_eq!(found, dir.path().join("fresh.pdf"));

        let far_future = since + Duration::from_secs(3600);
        assert!(newest_pdf_since(dir.path(), far_future).unwrap().is_none());
    }
}
