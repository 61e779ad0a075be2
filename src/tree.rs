//! Section index model.
//!
//! An [`Index`] is the resolved hierarchy of a document: root
//! [`IndexNode`]s with their page and line ranges, plus everything the
//! resolver could not place. Line ranges are 1-based and half-open,
//! `[line_start, line_end)`.

use std::collections::HashMap;

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::calibrate::AnchorSource;
use crate::meta::Annotation;
use crate::text::{section_id, PageLabel};

/// Bumped whenever resolution changes in a way that invalidates stored indexes.
pub const INDEX_VERSION: u32 = 3;

/// Where a node's expected page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum PageSource {
    Metadata,
    Offset,
    Fallback,
}

/// Which search step placed a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    PageLocal,
    FullDocument,
    HeadingScan,
    Fallback,
}

/// Which producer supplied the section descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorSource {
    Toc,
    Metadata,
    HeadingScan,
    Fallback,
    #[default]
    None,
}

/// A node in the section tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct IndexNode {
    /// `sec_1_2` for numbered sections, otherwise a title slug; unique per index.
    pub id: String,
    pub title: String,
    pub depth: u8,
    /// Internal page of the heading.
    pub page_start: u32,
    /// Internal page of the node's last line.
    pub page_end: u32,
    pub line_start: usize,
    /// Exclusive.
    pub line_end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printed_page: Option<PageLabel>,
    /// Page the descriptor pointed at before searching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_source: Option<PageSource>,
    pub resolved_by: ResolvedBy,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<IndexNode>,
}

impl IndexNode {
    /// Nodes in this subtree, self first.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(IndexNode::node_count).sum::<usize>()
    }

    pub fn contains_line(&self, line: usize) -> bool {
        (self.line_start..self.line_end).contains(&line)
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a IndexNode>) {
        out.push(self);
        for child in &self.children {
            child.collect(out);
        }
    }

    pub fn format_tree(&self, indent: usize) -> String {
        let prefix = "  ".repeat(indent);
        let mut result = format!(
            "{}{} [p.{}-{}, lines {}-{}]\n",
            prefix,
            self.title,
            self.page_start,
            self.page_end,
            self.line_start,
            self.line_end.saturating_sub(1)
        );
        for child in &self.children {
            result.push_str(&child.format_tree(indent + 1));
        }
        result
    }
}

/// A descriptor that matched no heading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct UnresolvedEntry {
    pub title: String,
    /// Position among the descriptors.
    pub position: usize,
    /// Depth implied by the section number, or 1.
    pub depth: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub printed_page: Option<PageLabel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_page: Option<u32>,
    /// Id of the resolved node preceding it in descriptor order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// A heading line of the emitted text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct HeadingRecord {
    pub line: usize,
    pub level: u8,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    CalibrationAnchor {
        title: String,
        printed: u32,
        internal: u32,
        source: AnchorSource,
        offset: i64,
    },
    AnchorMismatch {
        title: String,
        offset: i64,
    },
    NoAnchor,
    Escalated {
        reason: String,
    },
    FallbackFailed {
        message: String,
    },
    FallbackMerged {
        nodes: usize,
    },
    SkippedFragment {
        detail: String,
    },
}

/// The resolved section index of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Index {
    pub version: u32,
    pub name: String,
    pub source: DescriptorSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    pub page_count: usize,
    pub line_count: usize,
    pub roots: Vec<IndexNode>,
    #[serde(default)]
    pub unresolved: Vec<UnresolvedEntry>,
    #[serde(default)]
    pub headings: Vec<HeadingRecord>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

impl Index {
    pub fn empty(name: impl Into<String>, page_count: usize, line_count: usize) -> Self {
        Self {
            version: INDEX_VERSION,
            name: name.into(),
            source: DescriptorSource::None,
            offset: None,
            page_count,
            line_count,
            roots: Vec::new(),
            unresolved: Vec::new(),
            headings: Vec::new(),
            annotations: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn is_current(&self) -> bool {
        self.version == INDEX_VERSION
    }

    pub fn node_count(&self) -> usize {
        self.roots.iter().map(IndexNode::node_count).sum()
    }

    pub fn max_depth(&self) -> u8 {
        self.flatten().iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// All nodes in document order.
    pub fn flatten(&self) -> Vec<&IndexNode> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.collect(&mut out);
        }
        out
    }

    pub fn find(&self, id: &str) -> Option<&IndexNode> {
        self.flatten().into_iter().find(|n| n.id == id)
    }

    /// Deepest node whose range covers `line`.
    pub fn node_at_line(&self, line: usize) -> Option<&IndexNode> {
        self.flatten().into_iter().filter(|n| n.contains_line(line)).last()
    }

    pub fn format(&self) -> String {
        let mut result = format!(
            "Document: {} ({} pages, {} sections, {} unresolved)\n",
            self.name,
            self.page_count,
            self.node_count(),
            self.unresolved.len()
        );
        result.push_str(&"─".repeat(50));
        result.push('\n');
        for node in &self.roots {
            result.push_str(&node.format_tree(0));
        }
        result
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// A resolved section before nesting.
#[derive(Debug, Clone)]
pub struct FlatNode {
    pub title: String,
    pub depth: u8,
    pub line_start: usize,
    pub page_start: u32,
    pub section_number: Option<String>,
    pub printed_page: Option<PageLabel>,
    pub expected_page: Option<u32>,
    pub page_source: Option<PageSource>,
    pub resolved_by: ResolvedBy,
    /// Position among the descriptors.
    pub position: usize,
}

/// Assigns unique ids in descriptor order.
#[derive(Debug, Default)]
pub struct IdAllocator {
    seen: HashMap<String, usize>,
}

impl IdAllocator {
    pub fn allocate(&mut self, title: &str, position: usize) -> String {
        let base = section_id(title, position);
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}_{}", base, count)
        }
    }
}

/// Nest flat nodes into a forest.
///
/// `nodes` must be sorted by `line_start` and `ids` aligned with them. A
/// node ends where the next node of the same or shallower depth starts, or
/// after the last line. `page_at` maps a line to its enclosing page.
pub fn build_tree(
    nodes: Vec<FlatNode>,
    ids: Vec<String>,
    line_count: usize,
    page_at: impl Fn(usize) -> Option<u32>,
) -> Vec<IndexNode> {
    let n = nodes.len();

    let mut ends = vec![line_count + 1; n];
    let mut following: Vec<usize> = Vec::new();
    for i in (0..n).rev() {
        while following.last().is_some_and(|&j| nodes[j].depth > nodes[i].depth) {
            following.pop();
        }
        if let Some(&j) = following.last() {
            ends[i] = nodes[j].line_start;
        }
        following.push(i);
    }

    let mut parents: Vec<Option<usize>> = vec![None; n];
    let mut ancestors: Vec<usize> = Vec::new();
    for i in 0..n {
        while ancestors.last().is_some_and(|&j| nodes[j].depth >= nodes[i].depth) {
            ancestors.pop();
        }
        parents[i] = ancestors.last().copied();
        ancestors.push(i);
    }

    let mut arena: Vec<Option<IndexNode>> = nodes
        .into_iter()
        .zip(ids)
        .zip(ends)
        .map(|((flat, id), line_end)| {
            let page_end = line_end
                .checked_sub(1)
                .and_then(&page_at)
                .unwrap_or(flat.page_start)
                .max(flat.page_start);
            Some(IndexNode {
                id,
                title: flat.title,
                depth: flat.depth,
                page_start: flat.page_start,
                page_end,
                line_start: flat.line_start,
                line_end,
                section_number: flat.section_number,
                printed_page: flat.printed_page,
                expected_page: flat.expected_page,
                page_source: flat.page_source,
                resolved_by: flat.resolved_by,
                children: Vec::new(),
            })
        })
        .collect();

    // Children always follow their parent, so a reverse pass sees every subtree complete.
    let mut roots = Vec::new();
    for i in (0..n).rev() {
        let Some(node) = arena[i].take() else {
            continue;
        };
        match parents[i].and_then(|p| arena[p].as_mut()) {
            Some(parent) => parent.children.insert(0, node),
            None => roots.push(node),
        }
    }
    roots.reverse();
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(title: &str, depth: u8, line_start: usize, page: u32) -> FlatNode {
        FlatNode {
            title: title.to_string(),
            depth,
            line_start,
            page_start: page,
            section_number: None,
            printed_page: None,
            expected_page: None,
            page_source: None,
            resolved_by: ResolvedBy::PageLocal,
            position: 0,
        }
    }

    fn build(nodes: Vec<FlatNode>, line_count: usize) -> Vec<IndexNode> {
        let mut ids = IdAllocator::default();
        let ids = nodes.iter().map(|n| ids.allocate(&n.title, n.position)).collect();
        build_tree(nodes, ids, line_count, |line| Some((line / 10) as u32 + 1))
    }

    fn assert_contained(node: &IndexNode, line_count: usize) {
        assert!(node.line_start >= 1 && node.line_start <= node.line_end);
        assert!(node.line_end <= line_count + 1);
        for child in &node.children {
            assert!(child.line_start >= node.line_start && child.line_end <= node.line_end);
            assert_contained(child, line_count);
        }
    }

    #[test]
    fn test_nesting_and_ranges() {
        let roots = build(
            vec![
                flat("1 Intro", 1, 3, 1),
                flat("1.1 Scope", 2, 10, 2),
                flat("1.1.1 Detail", 3, 15, 2),
                flat("1.2 Plan", 2, 22, 3),
                flat("2 Methods", 1, 40, 5),
            ],
            60,
        );

        assert_eq!(roots.len(), 2);
        let intro = &roots[0];
        assert_eq!((intro.line_start, intro.line_end), (3, 40));
        assert_eq!(intro.children.len(), 2);
        assert_eq!(intro.children[0].children[0].title, "1.1.1 Detail");
        assert_eq!(intro.children[0].line_end, 22);
        assert_eq!(intro.children[0].children[0].line_end, 22);
        assert_eq!(intro.page_end, 4);
        assert_eq!(roots[1].line_end, 61);
        assert_eq!(roots[1].page_end, 7);

        for root in &roots {
            assert_contained(root, 60);
        }
    }

    #[test]
    fn test_shallow_after_deep_becomes_root() {
        let roots = build(
            vec![flat("A", 1, 1, 1), flat("A.1", 3, 5, 1), flat("B", 1, 9, 1), flat("C", 2, 12, 2)],
            20,
        );
        let titles: Vec<&str> = roots.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(roots[1].children[0].title, "C");
    }

    #[test]
    fn test_unique_ids() {
        let mut ids = IdAllocator::default();
        assert_eq!(ids.allocate("Exercises", 0), "exercises");
        assert_eq!(ids.allocate("Exercises", 1), "exercises_2");
        assert_eq!(ids.allocate("1.2 Background", 2), "sec_1_2");
    }

    #[test]
    fn test_index_lookup_and_json() {
        let mut index = Index::empty("book", 7, 60);
        index.roots = build(vec![flat("1 Intro", 1, 3, 1), flat("1.1 Scope", 2, 10, 2)], 60);

        assert_eq!(index.node_count(), 2);
        assert_eq!(index.max_depth(), 2);
        assert_eq!(index.find("sec_1_1").map(|n| n.line_start), Some(10));
        assert_eq!(index.node_at_line(12).map(|n| n.id.as_str()), Some("sec_1_1"));
        assert_eq!(index.node_at_line(5).map(|n| n.id.as_str()), Some("sec_1"));
        assert!(index.format().contains("  1.1 Scope [p.2-7, lines 10-60]"));

        let parsed = Index::from_json(&index.to_json().unwrap()).unwrap();
        assert_eq!(parsed, index);
        assert!(parsed.is_current());
    }
}
