//! Contents-listing extraction.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::{
    normalize_title, parse_heading, parse_page_marker, section_number, strip_markup, PageLabel, TitleKey,
};
use crate::view::DocumentView;

static TABLE_ROW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\|(.*)\|\s*$").expect("valid table row regex"));

static SEPARATOR_ROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\|[-:| ]+\|\s*$").expect("valid separator row regex"));

static RUNNING_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:table of )?contents\s*(?:[ivxlcdm]+|\d+)?\s*$").expect("valid running header regex")
});

/// `Title .... 97` or `Title 97`; roman page labels only after leaders.
static TRAILING_PAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)(?:\s*(?:\.\s?){2,}\s*(\d+|[ivxlcdmIVXLCDM]+)|\s+(\d+))\s*$").expect("valid trailing page regex")
});

static BARE_SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(?:\.\d{1,3})*\.?$").expect("valid bare section regex"));

static DIVISION_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:chapter|part|section|appendix)$").expect("valid division regex"));

/// One row of a contents listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TocEntry {
    /// Title as printed, markup removed.
    pub title: String,
    /// Lowercase, punctuation-free form of `title`.
    pub normalized: String,
    pub printed_page: Option<PageLabel>,
    /// Explicit dotted section number such as "1.2.4".
    pub section_number: Option<String>,
    /// Row index in the listing.
    pub position: usize,
}

impl TocEntry {
    pub fn new(title: impl Into<String>, printed_page: Option<PageLabel>, position: usize) -> Self {
        let title = title.into();
        Self {
            normalized: normalize_title(&title),
            section_number: section_number(&title),
            title,
            printed_page,
            position,
        }
    }

    pub fn key(&self) -> TitleKey {
        TitleKey::new(&self.title)
    }
}

/// Extracts [`TocEntry`] rows from emitted text.
pub struct TocParser;

impl TocParser {
    /// Rows of the Contents region; without one, table rows anywhere that
    /// end in a page number.
    pub fn parse(view: &DocumentView) -> Vec<TocEntry> {
        let region = view.contents_region();
        let (start, end, scoped) = match region {
            Some((start, end)) => (start, end, true),
            None => (1, view.line_count(), false),
        };

        let mut entries = Vec::new();
        let lines = view.slice(start, end + 1);
        for (i, line) in lines.iter().enumerate() {
            let next = lines.get(i + 1).copied().unwrap_or("");
            let parsed = if TABLE_ROW_RE.is_match(line) {
                parse_table_row(line, next, scoped)
            } else if scoped {
                parse_plain_row(line)
            } else {
                None
            };
            if let Some((title, page, explicit)) = parsed {
                let mut entry = TocEntry::new(title, page, entries.len());
                if explicit.is_some() {
                    entry.section_number = explicit;
                }
                entries.push(entry);
            }
        }

        log::debug!(
            "parsed {} contents rows ({})",
            entries.len(),
            if scoped { "contents region" } else { "whole document" }
        );
        entries
    }
}

type Row = (String, Option<PageLabel>, Option<String>);

fn parse_table_row(line: &str, next: &str, scoped: bool) -> Option<Row> {
    if SEPARATOR_ROW_RE.is_match(line) {
        return None;
    }
    let inner = TABLE_ROW_RE.captures(line)?.get(1)?.as_str();
    let cells: Vec<String> = inner.split('|').map(|c| strip_markup(c.replace('\\', "").trim())).collect();

    let page_at = cells.iter().rposition(|c| !c.is_empty());
    let page = page_at.and_then(|i| PageLabel::parse(&cells[i]));

    let title_cells: Vec<&str> = match (page, page_at) {
        (Some(_), Some(i)) => cells[..i].iter().map(String::as_str).filter(|c| !c.is_empty()).collect(),
        _ => {
            // Column labels of a header row, or a data table outside the Contents region.
            if !scoped || SEPARATOR_ROW_RE.is_match(next) {
                return None;
            }
            cells.iter().map(String::as_str).filter(|c| !c.is_empty()).collect()
        }
    };
    let first = *title_cells.first()?;

    let explicit = BARE_SECTION_RE
        .is_match(first)
        .then(|| first.trim_end_matches('.').to_string());
    let title = title_cells.join(" ");
    if normalize_title(&title).chars().count() < 2 || explicit.as_deref() == Some(title.trim_end_matches('.')) {
        return None;
    }
    Some((title, page, explicit))
}

fn parse_plain_row(line: &str) -> Option<Row> {
    let trimmed = line.trim();
    if trimmed.is_empty() || parse_page_marker(trimmed).is_some() {
        return None;
    }
    let text = match parse_heading(trimmed) {
        Some((_, raw)) => strip_markup(raw),
        None => strip_markup(trimmed),
    };
    if RUNNING_HEADER_RE.is_match(&text) || text.to_lowercase().split_whitespace().any(|w| w == "contents") {
        return None;
    }

    let caps = TRAILING_PAGE_RE.captures(&text)?;
    let title = caps.get(1)?.as_str().trim().trim_end_matches(['.', ' ']).to_string();
    let page = caps.get(2).or_else(|| caps.get(3)).and_then(|m| PageLabel::parse(m.as_str()));
    if normalize_title(&title).chars().count() < 2 || DIVISION_ONLY_RE.is_match(&title) {
        return None;
    }
    Some((title, page, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<TocEntry> {
        TocParser::parse(&DocumentView::new(text))
    }

    #[test]
    fn test_contents_table_rows() {
        let text = "<!-- page 3 -->

# Contents

| Intro | 1 |
| --- | --- |
| Background | 4 |
| Methods | 9 |

<!-- page 22 -->

# Intro

Body text.";
        let entries = parse(text);
        let rows: Vec<(&str, Option<PageLabel>)> =
            entries.iter().map(|e| (e.title.as_str(), e.printed_page)).collect();
        assert_eq!(
            rows,
            vec![
                ("Intro", Some(PageLabel::Arabic(1))),
                ("Background", Some(PageLabel::Arabic(4))),
                ("Methods", Some(PageLabel::Arabic(9))),
            ]
        );
        assert_eq!(entries[2].position, 2);
        assert_eq!(entries[1].normalized, "background");
    }

    #[test]
    fn test_section_number_cell_and_roman_pages() {
        let text = "# Table of Contents

| Preface | ix |
| 1 | Introduction | 1 |
| 1.2 | Background | 4 |

# Preface";
        let entries = parse(text);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].printed_page, Some(PageLabel::Roman(9)));
        assert_eq!(entries[0].section_number, None);
        assert_eq!(entries[2].title, "1.2 Background");
        assert_eq!(entries[2].section_number.as_deref(), Some("1.2"));
        assert_eq!(entries[1].section_number.as_deref(), Some("1"));
    }

    #[test]
    fn test_plain_rows_with_leaders_and_running_headers() {
        let text = "## CONTENTS

Good News, Bad News 98

CONTENTS vii

Getting Started ........ 12

Foreword ..... xi

### 6 HOW TO USE THE INDICATORS 97

Chapter 3

# It's Only A Game";
        let entries = parse(text);
        let rows: Vec<(&str, u32)> = entries
            .iter()
            .map(|e| (e.title.as_str(), e.printed_page.map(|p| p.value()).unwrap_or(0)))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("Good News, Bad News", 98),
                ("Getting Started", 12),
                ("Foreword", 11),
                ("6 HOW TO USE THE INDICATORS", 97),
            ]
        );
    }

    #[test]
    fn test_whole_document_fallback_only_takes_table_rows() {
        let text = "<!-- page 1 -->

Some prose that ends in a number 42

| Alpha | 5 |
| --- | --- |
| Beta | 7 |

| Name | Role |
| --- | --- |
| Ann | Lead |";
        let entries = parse(text);
        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);
    }

    #[test]
    fn test_header_row_without_page_skipped() {
        let text = "# Contents

| Title | Page |
| --- | --- |
| Intro | 1 |

# Intro";
        let entries = parse(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].title, "Intro");
    }
}
