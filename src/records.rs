use std::fmt;

use regex::Regex;

/// One scraped past-question listing, in the order the portal printed it.
/// Immutable after creation; the position in the scraped sequence is the
/// numbering contract for user selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PastQuestionRecord {
    pub title: String,
    pub year: String,
    pub semester: Semester,
    pub detail_link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Semester {
    First,
    Second,
    Supplementary,
    Unknown,
}

impl fmt::Display for Semester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Semester::First => "First",
            Semester::Second => "Second",
            Semester::Supplementary => "Supplementary",
            Semester::Unknown => "Unknown",
        };
        write!(f, "{name}")
    }
}

/// Pull a course code out of freeform title text, normalized to
/// `"ABCD 123"`. The portal titles separate name and code with anything
/// from a space to a dash to nothing at all.
pub fn extract_course_code(title: &str) -> Option<String> {
    let pattern = Regex::new(r"\b([A-Za-z]{4})[\s\-:/]?(\d{3})\b").unwrap();
    pattern
        .captures(title)
        .map(|caps| format!("{} {}", &caps[1], &caps[2]))
}

/// Map the portal's freeform semester text onto the closed set.
pub fn extract_semester(text: &str) -> Semester {
    let lowered = text.to_lowercase();
    if lowered.trim().is_empty() {
        Semester::Unknown
    } else if lowered.contains("first") {
        Semester::First
    } else if lowered.contains("second") {
        Semester::Second
    } else {
        Semester::Supplementary
    }
}

/// Portal years read like "2018/2019"; the later year is the exam year.
pub fn extract_year(text: &str) -> String {
    match text.rsplit_once('/') {
        Some((_, tail)) => tail.trim().to_string(),
        None => text.trim().to_string(),
    }
}
