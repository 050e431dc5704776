use std::str::FromStr;

use crate::errors::ScraperError;
use crate::records::PastQuestionRecord;

/// A user's reply to the numbered listing: one 1-based index or the "all"
/// wildcard. Some callers send `-1` for "all"; both spellings normalize
/// here, at the boundary, so nothing downstream re-derives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    All,
    Index(usize),
}

impl FromStr for Selection {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") || trimmed == "-1" {
            return Ok(Selection::All);
        }
        match trimmed.parse::<usize>() {
            Ok(i) => Ok(Selection::Index(i)),
            Err(_) => Err(ScraperError::InvalidSelection(trimmed.to_string())),
        }
    }
}

/// Number records 1..N in scraped order, one entry per paragraph. This
/// numbering is the contract `resolve_selection` maps back from, so the
/// records must arrive in page order and never re-sorted.
pub fn format_for_display(records: &[PastQuestionRecord]) -> String {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            format!(
                "{}. {}, {}, {}",
                i + 1,
                record.title,
                record.year,
                record.semester
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Map a selection back onto the scraped records. Indices are 1-based and
/// match the numbering `format_for_display` printed.
pub fn resolve_selection(
    records: &[PastQuestionRecord],
    selection: Selection,
) -> Result<Vec<&PastQuestionRecord>, ScraperError> {
    match selection {
        Selection::All => Ok(records.iter().collect()),
        Selection::Index(i) => {
            if i == 0 || i > records.len() {
                return Err(ScraperError::SelectionOutOfRange {
                    given: i,
                    max: records.len(),
                });
            }
            Ok(vec![&records[i - 1]])
        }
    }
}
