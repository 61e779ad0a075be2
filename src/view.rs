//! Line-addressed view of emitted text.
//!
//! Built once per document: a page for every line, the first line of every
//! page marker, the heading catalog and the bounds of the Contents region.
//! Line numbers are 1-based throughout.

use std::collections::BTreeMap;

use crate::text::{parse_heading, parse_page_marker, strip_markup, TitleKey, MARGIN_NOTES_HEADING};

/// One heading line of the emitted text.
#[derive(Debug, Clone)]
pub struct HeadingLine {
    pub line: usize,
    pub level: u8,
    pub title: String,
    /// Page of the nearest preceding marker.
    pub page: Option<u32>,
    pub key: TitleKey,
    /// Inside the Contents region (or the Contents heading itself).
    pub in_contents: bool,
}

pub struct DocumentView<'a> {
    lines: Vec<&'a str>,
    /// `line_pages[i]` is the page of line `i + 1`.
    line_pages: Vec<Option<u32>>,
    markers: BTreeMap<u32, usize>,
    headings: Vec<HeadingLine>,
    contents: Option<(usize, usize)>,
}

impl<'a> DocumentView<'a> {
    pub fn new(text: &'a str) -> Self {
        let lines: Vec<&str> = text.lines().collect();

        let mut line_pages = Vec::with_capacity(lines.len());
        let mut markers = BTreeMap::new();
        let mut current = None;
        for (i, line) in lines.iter().enumerate() {
            if let Some(page) = parse_page_marker(line) {
                current = Some(page);
                markers.entry(page).or_insert(i + 1);
            }
            line_pages.push(current);
        }

        let mut headings = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            let Some((level, raw)) = parse_heading(line) else {
                continue;
            };
            let title = strip_markup(raw);
            if title.is_empty() || title.eq_ignore_ascii_case(MARGIN_NOTES_HEADING) {
                continue;
            }
            headings.push(HeadingLine {
                line: i + 1,
                level,
                key: TitleKey::new(&title),
                title,
                page: line_pages[i],
                in_contents: false,
            });
        }

        let contents = contents_bounds(&lines, &headings);
        if let Some((start, end)) = contents {
            for heading in &mut headings {
                // start - 1 is the Contents heading itself.
                heading.in_contents = heading.line + 1 >= start && heading.line <= end;
            }
        }

        Self {
            lines,
            line_pages,
            markers,
            headings,
            contents,
        }
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, n: usize) -> Option<&'a str> {
        n.checked_sub(1).and_then(|i| self.lines.get(i)).copied()
    }

    /// Lines `start..end` (1-based, end exclusive), clamped to the document.
    pub fn slice(&self, start: usize, end: usize) -> &[&'a str] {
        let lo = start.max(1).min(self.lines.len() + 1) - 1;
        let hi = end.max(1).min(self.lines.len() + 1) - 1;
        if lo >= hi { &[] } else { &self.lines[lo..hi] }
    }

    pub fn page_at(&self, line: usize) -> Option<u32> {
        line.checked_sub(1).and_then(|i| self.line_pages.get(i)).copied().flatten()
    }

    pub fn marker_line(&self, page: u32) -> Option<usize> {
        self.markers.get(&page).copied()
    }

    /// Number of distinct page markers.
    pub fn page_count(&self) -> usize {
        self.markers.len()
    }

    pub fn last_page(&self) -> Option<u32> {
        self.markers.keys().next_back().copied()
    }

    /// Inclusive line range covering pages `first..=last`, `None` when no
    /// marker falls in that range.
    pub fn page_window(&self, first: u32, last: u32) -> Option<(usize, usize)> {
        let start = self.markers.range(first..=last).map(|(_, &line)| line).min()?;
        let end = self
            .markers
            .range(last.saturating_add(1)..)
            .map(|(_, &line)| line)
            .filter(|&line| line > start)
            .min()
            .map_or(self.lines.len(), |line| line - 1);
        Some((start, end))
    }

    pub fn headings(&self) -> &[HeadingLine] {
        &self.headings
    }

    /// Headings outside the Contents region.
    pub fn body_headings(&self) -> impl Iterator<Item = &HeadingLine> {
        self.headings.iter().filter(|h| !h.in_contents)
    }

    /// Inclusive line range between the Contents heading and the first body heading.
    pub fn contents_region(&self) -> Option<(usize, usize)> {
        self.contents
    }

    /// First line after the Contents region, or 1.
    pub fn body_start(&self) -> usize {
        self.contents.map_or(1, |(_, end)| end + 1)
    }
}

fn is_contents_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    let compact: String = lower.chars().filter(|c| c.is_alphanumeric()).collect();
    lower.contains("table of contents") || compact.ends_with("contents")
}

/// The region runs to the line before the next heading that is neither a
/// Contents continuation nor a contents row with a trailing page number.
fn contents_bounds(lines: &[&str], headings: &[HeadingLine]) -> Option<(usize, usize)> {
    let open = headings.iter().position(|h| is_contents_title(&h.title))?;
    let start = headings[open].line + 1;

    let end = headings[open + 1..]
        .iter()
        .find(|h| {
            let ends_with_number = h.title.trim_end().chars().last().is_some_and(|c| c.is_ascii_digit());
            !h.title.to_lowercase().contains("contents") && !ends_with_number
        })
        .map_or(lines.len(), |h| h.line - 1);

    Some((start, end.max(start.saturating_sub(1))))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "<!-- page 1 -->

# Contents

| Intro | 1 |
| --- | --- |
| Background | 4 |

<!-- page 2 -->

## Contents (continued)

### Appendix A 90

<!-- page 3 -->

# Intro

Text here.

### Marginal notes

a note

<!-- page 4 -->

## 1.2.4 Posterior Predictive";

    #[test]
    fn test_pages_and_markers() {
        let view = DocumentView::new(DOC);
        assert_eq!(view.page_count(), 4);
        assert_eq!(view.last_page(), Some(4));
        assert_eq!(view.page_at(1), Some(1));
        assert_eq!(view.page_at(5), Some(1));
        assert_eq!(view.marker_line(3), Some(15));
        assert_eq!(view.page_at(17), Some(3));
        assert_eq!(view.page_at(0), None);
    }

    #[test]
    fn test_heading_catalog_skips_margin_notes() {
        let view = DocumentView::new(DOC);
        let titles: Vec<&str> = view.headings().iter().map(|h| h.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Contents", "Contents (continued)", "Appendix A 90", "Intro", "1.2.4 Posterior Predictive"]
        );
        let last = view.headings().last().unwrap();
        assert_eq!((last.level, last.page), (2, Some(4)));
    }

    #[test]
    fn test_contents_region_spans_continuations() {
        let view = DocumentView::new(DOC);
        assert_eq!(view.contents_region(), Some((4, 16)));
        assert_eq!(view.body_start(), 17);

        let body: Vec<&str> = view.body_headings().map(|h| h.title.as_str()).collect();
        assert_eq!(body, vec!["Intro", "1.2.4 Posterior Predictive"]);
    }

    #[test]
    fn test_page_window() {
        let view = DocumentView::new(DOC);
        assert_eq!(view.page_window(2, 3), Some((9, 24)));
        assert_eq!(view.page_window(4, 9), Some((25, view.line_count())));
        assert_eq!(view.page_window(7, 9), None);
    }

    #[test]
    fn test_slice_is_end_exclusive() {
        let view = DocumentView::new("a\nb\nc\nd");
        assert_eq!(view.slice(2, 4), &["b", "c"]);
        assert_eq!(view.slice(3, 100), &["c", "d"]);
        assert!(view.slice(4, 2).is_empty());
        assert_eq!(view.line(1), Some("a"));
        assert_eq!(view.line(0), None);
    }
}
