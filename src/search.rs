//! Read-only lookups over a built index.
//!
//! All results are in document order. Line ranges are 1-based with an
//! exclusive end, matching [`IndexNode`].

use serde::{Deserialize, Serialize};

use crate::text::normalize_title;
use crate::tree::{Index, IndexNode};

/// One row of a section listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntry {
    pub id: String,
    pub title: String,
    pub page: u32,
    /// Nesting level in the tree, roots are 1.
    pub depth: usize,
}

/// Sections down to `max_depth` nesting levels, in document order.
pub fn list_sections(index: &Index, max_depth: usize) -> Vec<SectionEntry> {
    fn walk(nodes: &[IndexNode], depth: usize, max_depth: usize, out: &mut Vec<SectionEntry>) {
        if depth > max_depth {
            return;
        }
        for node in nodes {
            out.push(SectionEntry {
                id: node.id.clone(),
                title: node.title.clone(),
                page: node.page_start,
                depth,
            });
            walk(&node.children, depth + 1, max_depth, out);
        }
    }

    let mut out = Vec::new();
    walk(&index.roots, 1, max_depth, &mut out);
    out
}

/// Indented `- Title (p. N)` lines.
pub fn format_toc(index: &Index, max_depth: usize) -> Vec<String> {
    list_sections(index, max_depth)
        .into_iter()
        .map(|s| format!("{}- {} (p. {})", "  ".repeat(s.depth - 1), s.title, s.page))
        .collect()
}

/// A title search hit: an index node or a catalogued heading no node starts at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleMatch {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub line_start: usize,
    pub line_end: usize,
}

/// Case-insensitive substring search over normalized titles.
pub fn search_titles(index: &Index, query: &str) -> Vec<TitleMatch> {
    let query = normalize_title(query);
    if query.is_empty() {
        return Vec::new();
    }

    let nodes = index.flatten();
    let mut hits: Vec<TitleMatch> = nodes
        .iter()
        .filter(|n| normalize_title(&n.title).contains(&query))
        .map(|n| TitleMatch {
            title: n.title.clone(),
            node_id: Some(n.id.clone()),
            page: Some(n.page_start),
            line_start: n.line_start,
            line_end: n.line_end,
        })
        .collect();

    for (i, heading) in index.headings.iter().enumerate() {
        if nodes.iter().any(|n| n.line_start == heading.line) || !normalize_title(&heading.title).contains(&query) {
            continue;
        }
        let line_end = index.headings[i + 1..]
            .iter()
            .find(|h| h.level <= heading.level)
            .map_or(index.line_count + 1, |h| h.line);
        hits.push(TitleMatch {
            title: heading.title.clone(),
            node_id: None,
            page: heading.page,
            line_start: heading.line,
            line_end,
        });
    }

    hits.sort_by_key(|h| (h.line_start, h.line_end));
    hits
}

/// Nodes whose title or body text contains `query`, case-insensitive.
pub fn search_content<'a>(index: &'a Index, text: &str, query: &str) -> Vec<&'a IndexNode> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }

    let mut nodes = index.flatten();
    nodes.sort_by_key(|n| (n.line_start, n.line_end));
    nodes
        .into_iter()
        .filter(|n| n.title.to_lowercase().contains(&query) || section_text(n, text).to_lowercase().contains(&query))
        .collect()
}

/// Lines `start..end` of `text` (1-based, end exclusive), clamped.
pub fn read_range(text: &str, start: usize, end: usize) -> String {
    let start = start.max(1);
    if end <= start {
        return String::new();
    }
    text.lines()
        .skip(start - 1)
        .take(end - start)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn section_text(node: &IndexNode, text: &str) -> String {
    read_range(text, node.line_start, node.line_end)
}

/// A node by id, else the first whose title contains `query`.
pub fn find_section<'a>(index: &'a Index, query: &str) -> Option<&'a IndexNode> {
    index.find(query).or_else(|| {
        let query = normalize_title(query);
        if query.is_empty() {
            return None;
        }
        index.flatten().into_iter().find(|n| normalize_title(&n.title).contains(&query))
    })
}
