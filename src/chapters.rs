//! Chapter detection over emitted text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::text::{page_marker, parse_page_marker};

static CHAPTER_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^#{1,2}\s+(chapter\s+\d+.*|chapter\s+[ivxlcdm]+\b.*|\d+\.\s+[a-z].*|\d+\s+[a-z].*)$")
        .expect("valid chapter start regex")
});

/// A contiguous page range of the emitted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    /// `front` for pages before the first chapter, otherwise `ch01`, `ch02`, ...
    pub id: String,
    pub title: String,
    pub start_page: u32,
    pub end_page: u32,
}

impl Chapter {
    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.start_page..=self.end_page
    }
}

/// Split emitted text into `(page, content)` pairs at page markers.
///
/// Text before the first marker is dropped.
pub fn split_pages(text: &str) -> Vec<(u32, String)> {
    let mut pages: Vec<(u32, String)> = Vec::new();
    for line in text.lines() {
        if let Some(page) = parse_page_marker(line) {
            pages.push((page, String::new()));
            continue;
        }
        if let Some((_, content)) = pages.last_mut() {
            content.push_str(line);
            content.push('\n');
        }
    }
    for (_, content) in &mut pages {
        *content = content.trim().to_string();
    }
    pages
}

/// Partitions a paginated document into chapters.
pub struct ChapterSplitter {
    scan_chars: usize,
}

impl ChapterSplitter {
    pub fn new(config: &LayoutConfig) -> Self {
        Self {
            scan_chars: config.chapter_scan_chars,
        }
    }

    /// First chapter heading near the top of each page, as `(page, title)`.
    pub fn detect_starts(&self, text: &str) -> Vec<(u32, String)> {
        split_pages(text)
            .into_iter()
            .filter_map(|(page, content)| {
                let head = truncate_chars(&content, self.scan_chars);
                CHAPTER_START_RE
                    .captures(head)
                    .and_then(|c| c.get(1))
                    .map(|m| (page, m.as_str().trim().to_string()))
            })
            .collect()
    }

    /// Chapter ranges covering every page; `title` names the single chapter
    /// produced when no chapter heading is found.
    pub fn split(&self, text: &str, title: &str) -> Vec<Chapter> {
        let pages = split_pages(text);
        let (Some(first), Some(last)) = (pages.first().map(|p| p.0), pages.last().map(|p| p.0)) else {
            return Vec::new();
        };

        let mut starts = self.detect_starts(text);
        starts.dedup_by_key(|(page, _)| *page);

        if starts.is_empty() {
            return vec![Chapter {
                id: "ch01".to_string(),
                title: title.to_string(),
                start_page: first,
                end_page: last,
            }];
        }

        let mut chapters = Vec::with_capacity(starts.len() + 1);
        if starts[0].0 > first {
            chapters.push(Chapter {
                id: "front".to_string(),
                title: "Front matter".to_string(),
                start_page: first,
                end_page: starts[0].0 - 1,
            });
        }
        for (i, (start, heading)) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map_or(last, |(next, _)| next - 1);
            chapters.push(Chapter {
                id: format!("ch{:02}", i + 1),
                title: heading.clone(),
                start_page: *start,
                end_page: end,
            });
        }

        log::debug!("detected {} chapters", chapters.len());
        chapters
    }
}

/// The emitted text of one chapter, with its page markers.
pub fn chapter_text(text: &str, chapter: &Chapter) -> String {
    let mut out = String::new();
    for (page, content) in split_pages(text) {
        if !chapter.pages().contains(&page) {
            continue;
        }
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&page_marker(page));
        if !content.is_empty() {
            out.push_str("\n\n");
            out.push_str(&content);
        }
    }
    out
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pages: &[(u32, &str)]) -> String {
        pages
            .iter()
            .map(|(n, body)| format!("{}\n\n{}", page_marker(*n), body))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_front_matter_and_chapters() {
        let text = doc(&[
            (1, "Title page"),
            (2, "# Contents\n\nstuff"),
            (3, "# 1. Introduction\n\nBody"),
            (4, "More body"),
            (5, "# Chapter 2 Methods\n\nBody"),
            (6, "End"),
        ]);
        let splitter = ChapterSplitter::new(&LayoutConfig::default());
        let chapters = splitter.split(&text, "Book");

        let summary: Vec<(&str, u32, u32)> = chapters
            .iter()
            .map(|c| (c.id.as_str(), c.start_page, c.end_page))
            .collect();
        assert_eq!(summary, vec![("front", 1, 2), ("ch01", 3, 4), ("ch02", 5, 6)]);
        assert_eq!(chapters[1].title, "1. Introduction");
    }

    #[test]
    fn test_no_chapters_single_range() {
        let text = doc(&[(1, "a"), (2, "b"), (3, "## 1.2 Not a chapter")]);
        let chapters = ChapterSplitter::new(&LayoutConfig::default()).split(&text, "Whole");
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Whole");
        assert_eq!((chapters[0].start_page, chapters[0].end_page), (1, 3));
    }

    #[test]
    fn test_heading_beyond_scan_window_ignored() {
        let filler = "x".repeat(900);
        let body = format!("{}\n\n# 3. Late Heading", filler);
        let text = doc(&[(1, &body)]);
        let splitter = ChapterSplitter::new(&LayoutConfig::default());
        assert!(splitter.detect_starts(&text).is_empty());
    }

    #[test]
    fn test_chapter_text_keeps_markers() {
        let text = doc(&[(1, "a"), (2, "b"), (3, "c")]);
        let chapter = Chapter {
            id: "ch01".into(),
            title: "t".into(),
            start_page: 2,
            end_page: 3,
        };
        assert_eq!(chapter_text(&text, &chapter), "<!-- page 2 -->\n\nb\n\n<!-- page 3 -->\n\nc");
    }

    #[test]
    fn test_split_pages() {
        let pages = split_pages("preamble\n<!-- page 1 -->\n\nhello\n<!-- page 2 -->\n");
        assert_eq!(pages, vec![(1, "hello".to_string()), (2, String::new())]);
    }
}
