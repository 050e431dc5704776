use log::info;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::config::PortalMarkup;
use crate::errors::{DriverError, ScraperError};
use crate::records::{PastQuestionRecord, extract_semester, extract_year};
use crate::session::Session;

/// Issues quoted queries through the live session and scrapes the listing
/// page that comes back into structured records.
pub struct SearchEngine {
    client: reqwest::Client,
    origin: String,
    markup: PortalMarkup,
}

impl SearchEngine {
    pub fn new(origin: String, markup: PortalMarkup) -> anyhow::Result<Self> {
        // The portal serves an incomplete certificate chain; the listing
        // fetch accepts it the same way the browser session does.
        let client = reqwest::ClientBuilder::new()
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(Self {
            client,
            origin,
            markup,
        })
    }

    /// Submit `query` through the session's search form. The portal only
    /// returns precise matches for quoted phrases, so the query is wrapped
    /// in double quotes before submission.
    pub async fn search(&self, session: &mut Session, query: &str) -> Result<(), ScraperError> {
        if !session.is_authenticated() {
            return Err(ScraperError::NotAuthenticated);
        }
        let driver = session.driver();
        let quoted = format!("\"{query}\"");
        driver
            .fill_by_name(self.markup.search_field, &quoted)
            .await
            .map_err(search_form_missing)?;
        driver
            .click_by_name(self.markup.search_button)
            .await
            .map_err(search_form_missing)?;
        info!("searched the portal for {quoted}");
        Ok(())
    }

    /// Fetch the session's current listing page and parse it into records.
    ///
    /// The fetch is a plain GET independent of the browser session; the
    /// listing page is public and needs no cookies. Zero results come back
    /// as an empty vec, which is a different thing from `ScrapeFailed`.
    pub async fn scrape_results(
        &self,
        session: &Session,
    ) -> Result<Vec<PastQuestionRecord>, ScraperError> {
        if !session.is_authenticated() {
            return Err(ScraperError::NotAuthenticated);
        }
        let url = session.current_url().await?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ScraperError::ScrapeFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ScraperError::ScrapeFailed(format!(
                "listing page returned {}",
                response.status()
            )));
        }
        let html = response
            .text()
            .await
            .map_err(|e| ScraperError::ScrapeFailed(e.to_string()))?;

        let records = parse_listing(&html, &self.origin, &self.markup);
        info!("scraped {} past question records from {url}", records.len());
        Ok(records)
    }
}

fn search_form_missing(e: DriverError) -> ScraperError {
    match e {
        DriverError::ElementNotFound(name) => {
            ScraperError::ScrapeFailed(format!("search form control missing: {name}"))
        }
        other => ScraperError::Driver(other),
    }
}

/// Parse one listing page. Records keep the page's top-to-bottom order;
/// a block missing any required field is skipped outright rather than
/// carried with holes.
pub(crate) fn parse_listing(
    html: &str,
    origin: &str,
    markup: &PortalMarkup,
) -> Vec<PastQuestionRecord> {
    let document = Html::parse_document(html);
    let block_selector = Selector::parse(markup.result_block).unwrap();
    let title_selector = Selector::parse(markup.title_anchor).unwrap();
    let year_selector = Selector::parse(markup.year_field).unwrap();
    let semester_selector = Selector::parse(markup.semester_field).unwrap();

    let mut records = Vec::new();
    for block in document.select(&block_selector) {
        let Some(title_node) = block.select(&title_selector).next() else {
            continue;
        };
        let Some(href) = title_node.value().attr("href") else {
            continue;
        };
        let Some(year_node) = block.select(&year_selector).next() else {
            continue;
        };
        let Some(semester_node) = block.select(&semester_selector).next() else {
            continue;
        };

        let title = extract_text(title_node).trim().to_string();
        if title.is_empty() {
            continue;
        }
        records.push(PastQuestionRecord {
            title,
            year: extract_year(&extract_text(year_node)),
            semester: extract_semester(&extract_text(semester_node)),
            detail_link: absolutize(origin, href),
        });
    }
    records
}

fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>()
}

fn absolutize(origin: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{origin}{href}")
    } else {
        format!("{origin}/{href}")
    }
}

/// Boundary-side validation: a course is a 4-letter name plus a 3-digit
/// code, normalized to `"name code"` before it ever reaches `search`.
pub fn normalize_query(raw: &str) -> Option<String> {
    let pattern = Regex::new(r"^\s*([A-Za-z]{4})[\s\-:/]?(\d{3})\s*$").unwrap();
    let caps = pattern.captures(raw)?;
    Some(format!("{} {}", caps[1].to_lowercase(), &caps[2]))
}
