//! Section resolution.
//!
//! Candidate section descriptors come from exactly one producer, in order
//! of preference: contents rows, Section-class metadata entries, or a raw
//! scan of body headings. Each descriptor is matched to a heading line,
//! first near its expected page and then across the document. The
//! placed descriptors are nested by heading level into the [`Index`].
//! When the result looks systemically wrong, the optional fallback
//! collaborator is consulted once; its answers only fill gaps.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::calibrate::{Calibration, OffsetCalibrator};
use crate::config::IndexConfig;
use crate::error::BookIndexError;
use crate::llm::{FallbackRequest, FallbackSection, SectionFallback};
use crate::meta::LayoutModel;
use crate::text::{section_depth, PageLabel, TitleKey};
use crate::toc::{TocEntry, TocParser};
use crate::tree::{
    build_tree, DescriptorSource, Diagnostic, FlatNode, HeadingRecord, IdAllocator, Index, PageSource, ResolvedBy,
    UnresolvedEntry,
};
use crate::view::{DocumentView, HeadingLine};

/// One candidate section before matching.
#[derive(Debug, Clone)]
struct Descriptor {
    title: String,
    key: TitleKey,
    printed_page: Option<PageLabel>,
    section_number: Option<String>,
    expected: Option<(u32, PageSource)>,
    /// Depth used when no heading level is available.
    depth_hint: u8,
    /// Added by the fallback; dropped again if it cannot be placed.
    from_fallback: bool,
}

impl Descriptor {
    fn new(title: &str, printed_page: Option<PageLabel>, section_number: Option<String>) -> Self {
        let key = TitleKey::new(title);
        let section_number = section_number.or_else(|| key.section.clone());
        Self {
            title: title.to_string(),
            depth_hint: section_number.as_deref().map_or(1, section_depth),
            key,
            printed_page,
            section_number,
            expected: None,
            from_fallback: false,
        }
    }

    fn expected_page(&self) -> Option<u32> {
        self.expected.map(|(page, _)| page)
    }
}

#[derive(Debug, Clone, Copy)]
struct Placement {
    line: usize,
    level: u8,
    page: u32,
    by: ResolvedBy,
}

/// Placements aligned with the descriptor list.
#[derive(Debug, Default)]
struct Pass {
    placed: Vec<Option<Placement>>,
    claimed: HashSet<usize>,
    last_line: usize,
}

impl Pass {
    fn resolved(&self) -> usize {
        self.placed.iter().flatten().count()
    }

    fn claim(&mut self, heading: &HeadingLine, by: ResolvedBy, fallback_page: Option<u32>) -> Placement {
        self.claimed.insert(heading.line);
        self.last_line = heading.line;
        Placement {
            line: heading.line,
            level: heading.level,
            page: heading.page.or(fallback_page).unwrap_or(1),
            by,
        }
    }

    /// Placements in descriptor order that go backwards in the text.
    fn inversions(&self) -> usize {
        let lines: Vec<usize> = self.placed.iter().flatten().map(|p| p.line).collect();
        lines.windows(2).filter(|w| w[1] < w[0]).count()
    }
}

/// Builds an [`Index`] from emitted text and optional metadata.
pub struct IndexResolver {
    config: IndexConfig,
    fallback: Option<Arc<dyn SectionFallback>>,
}

impl IndexResolver {
    pub fn new(config: IndexConfig) -> Self {
        Self { config, fallback: None }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn SectionFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Resolve the section tree of `text`. Never fails: everything that
    /// cannot be placed is reported inside the returned index.
    pub async fn resolve(&self, name: &str, text: &str, layout: &LayoutModel) -> Index {
        let view = DocumentView::new(text);
        let mut index = Index::empty(name, view.page_count(), view.line_count());
        index.headings = view
            .body_headings()
            .map(|h| HeadingRecord {
                line: h.line,
                level: h.level,
                title: h.title.clone(),
                page: h.page,
            })
            .collect();
        index.annotations = layout.annotations();

        let entries = TocParser::parse(&view);
        let calibration = OffsetCalibrator::calibrate(&entries, &view, layout);
        index.offset = calibration.offset;
        record_calibration(&mut index.diagnostics, &calibration, !entries.is_empty());

        let (source, mut descriptors) = self.descriptors(&entries, &view, layout, &calibration);
        index.source = source;

        let mut pass = Pass {
            placed: vec![None; descriptors.len()],
            ..Pass::default()
        };
        for (i, d) in descriptors.iter().enumerate() {
            let placement = if source == DescriptorSource::HeadingScan {
                self.place_scanned(&view, d, &mut pass)
            } else {
                self.place(&view, d, &mut pass)
            };
            pass.placed[i] = placement;
        }

        if let Some(reason) = self.escalation_reason(&descriptors, &pass) {
            log::warn!("escalating section resolution: {}", reason);
            index.diagnostics.push(Diagnostic::Escalated { reason });
            self.escalate(&view, &mut descriptors, &mut pass, &mut index).await;
        }

        self.finish(&view, &descriptors, &pass, &mut index);
        log::info!(
            "resolved {} sections ({} unresolved) from {:?}",
            index.node_count(),
            index.unresolved.len(),
            index.source
        );
        index
    }

    fn descriptors(
        &self,
        entries: &[TocEntry],
        view: &DocumentView,
        layout: &LayoutModel,
        calibration: &Calibration,
    ) -> (DescriptorSource, Vec<Descriptor>) {
        if !entries.is_empty() {
            let descriptors = entries
                .iter()
                .map(|entry| {
                    let mut d = Descriptor::new(&entry.title, entry.printed_page, entry.section_number.clone());
                    d.expected = layout
                        .page_for(&d.key)
                        .map(|p| (p, PageSource::Metadata))
                        .or_else(|| {
                            entry
                                .printed_page
                                .and_then(|label| calibration.apply(label))
                                .map(|p| (p, PageSource::Offset))
                        });
                    d
                })
                .collect();
            return (DescriptorSource::Toc, descriptors);
        }

        let sections: Vec<Descriptor> = layout
            .sections()
            .map(|entry| {
                let mut d = Descriptor::new(&entry.title, None, None);
                d.expected = entry.page.map(|p| (p, PageSource::Metadata));
                d
            })
            .collect();
        if !sections.is_empty() {
            return (DescriptorSource::Metadata, sections);
        }

        if self.config.heading_scan_fallback {
            let scanned = view
                .body_headings()
                .map(|h| {
                    let mut d = Descriptor::new(&h.title, None, None);
                    d.depth_hint = h.level;
                    d
                })
                .collect();
            return (DescriptorSource::HeadingScan, scanned);
        }

        (DescriptorSource::None, Vec::new())
    }

    /// Page-local search around the expected page, then the whole body.
    fn place(&self, view: &DocumentView, d: &Descriptor, pass: &mut Pass) -> Option<Placement> {
        if let Some(page) = d.expected_page() {
            let first = page.saturating_sub(self.config.window_pages_before);
            let last = page.saturating_add(self.config.window_pages_after);
            if let Some(window) = view.page_window(first, last) {
                if let Some(h) = find_heading(view, &d.key, window, &pass.claimed) {
                    return Some(pass.claim(h, ResolvedBy::PageLocal, Some(page)));
                }
            }
        }

        let after = (pass.last_line + 1, usize::MAX);
        let body = (view.body_start(), usize::MAX);
        let h = find_heading(view, &d.key, after, &pass.claimed).or_else(|| find_heading(view, &d.key, body, &pass.claimed))?;
        log::debug!("'{}' found outside its expected page window at line {}", d.title, h.line);
        Some(pass.claim(h, ResolvedBy::FullDocument, d.expected_page()))
    }

    /// Scanned descriptors are their own headings: the next unclaimed one.
    fn place_scanned(&self, view: &DocumentView, d: &Descriptor, pass: &mut Pass) -> Option<Placement> {
        let h = find_heading(view, &d.key, (pass.last_line + 1, usize::MAX), &pass.claimed)?;
        Some(pass.claim(h, ResolvedBy::HeadingScan, None))
    }

    fn escalation_reason(&self, descriptors: &[Descriptor], pass: &Pass) -> Option<String> {
        let resolved = pass.resolved();
        if resolved == 0 {
            return Some(if descriptors.is_empty() {
                "no section descriptors".to_string()
            } else {
                format!("none of {} sections resolved", descriptors.len())
            });
        }
        let unresolved = descriptors.len() - resolved;
        if unresolved as f64 / descriptors.len() as f64 > self.config.max_unresolved_fraction {
            return Some(format!("{} of {} sections unresolved", unresolved, descriptors.len()));
        }
        let inversions = pass.inversions();
        if inversions >= self.config.inverted_range_threshold {
            return Some(format!("{} sections out of document order", inversions));
        }
        None
    }

    /// Ask the fallback once and merge its answer into the gaps.
    async fn escalate(&self, view: &DocumentView<'_>, descriptors: &mut Vec<Descriptor>, pass: &mut Pass, index: &mut Index) {
        let Some(fallback) = &self.fallback else {
            log::debug!("no fallback collaborator configured");
            return;
        };

        let request = FallbackRequest {
            headings: index.headings.clone(),
            unresolved: unresolved_entries(descriptors, pass),
        };
        let timeout = Duration::from_secs(self.config.fallback_timeout_secs);
        let sections = match tokio::time::timeout(timeout, fallback.resolve_fallback(&request)).await {
            Ok(Ok(sections)) => sections,
            Ok(Err(e)) => {
                log::warn!("fallback failed: {}", e);
                index.diagnostics.push(Diagnostic::FallbackFailed { message: e.to_string() });
                return;
            }
            Err(_) => {
                let e = BookIndexError::FallbackTimeout(self.config.fallback_timeout_secs);
                log::warn!("{}", e);
                index.diagnostics.push(Diagnostic::FallbackFailed { message: e.to_string() });
                return;
            }
        };

        let tree_was_empty = pass.resolved() == 0;
        let mut merged = 0;
        for section in &sections {
            let key = TitleKey::new(&section.title);
            if key.is_empty() {
                continue;
            }
            let target = (0..descriptors.len()).find(|&i| pass.placed[i].is_none() && descriptors[i].key.matches(&key));
            let i = match target {
                Some(i) => i,
                None if tree_was_empty => {
                    descriptors.push(fallback_descriptor(section));
                    pass.placed.push(None);
                    descriptors.len() - 1
                }
                // Rule-resolved trees only take answers for their own gaps.
                None => continue,
            };
            if let Some(page) = section.page {
                descriptors[i].expected = Some((page, PageSource::Fallback));
            }
            if let Some(placement) = self.place_from_fallback(view, &descriptors[i], section, pass) {
                pass.placed[i] = Some(placement);
                merged += 1;
            }
        }

        if merged > 0 && tree_was_empty {
            index.source = DescriptorSource::Fallback;
        }
        log::info!("fallback returned {} sections, {} placed", sections.len(), merged);
        index.diagnostics.push(Diagnostic::FallbackMerged { nodes: merged });
    }

    fn place_from_fallback(
        &self,
        view: &DocumentView,
        d: &Descriptor,
        section: &FallbackSection,
        pass: &mut Pass,
    ) -> Option<Placement> {
        if let Some(mut placement) = self.place(view, d, pass) {
            placement.by = ResolvedBy::Fallback;
            return Some(placement);
        }
        // No matching heading: start at the page the fallback named.
        let page = section.page?;
        let line = view.marker_line(page)?;
        Some(Placement {
            line,
            level: section.depth.unwrap_or(d.depth_hint).clamp(1, 6),
            page,
            by: ResolvedBy::Fallback,
        })
    }

    fn finish(&self, view: &DocumentView, descriptors: &[Descriptor], pass: &Pass, index: &mut Index) {
        let ids = allocate_ids(descriptors, pass);

        let mut flat: Vec<(FlatNode, String)> = Vec::new();
        for (position, (d, placed)) in descriptors.iter().zip(&pass.placed).enumerate() {
            let (Some(p), Some(id)) = (placed, &ids[position]) else {
                continue;
            };
            flat.push((
                FlatNode {
                    title: d.title.clone(),
                    depth: p.level.clamp(1, 6),
                    line_start: p.line,
                    page_start: p.page,
                    section_number: d.section_number.clone(),
                    printed_page: d.printed_page,
                    expected_page: d.expected_page(),
                    page_source: d.expected.map(|(_, source)| source),
                    resolved_by: p.by,
                    position,
                },
                id.clone(),
            ));
        }
        flat.sort_by_key(|(node, _)| (node.line_start, node.position));

        let (nodes, ids): (Vec<FlatNode>, Vec<String>) = flat.into_iter().unzip();
        index.roots = build_tree(nodes, ids, view.line_count(), |line| view.page_at(line));
        index.unresolved = unresolved_entries(descriptors, pass);
    }
}

/// Ids for placed descriptors, allocated in descriptor order.
fn allocate_ids(descriptors: &[Descriptor], pass: &Pass) -> Vec<Option<String>> {
    let mut allocator = IdAllocator::default();
    descriptors
        .iter()
        .zip(&pass.placed)
        .enumerate()
        .map(|(position, (d, placed))| placed.map(|_| allocator.allocate(&d.title, position)))
        .collect()
}

fn unresolved_entries(descriptors: &[Descriptor], pass: &Pass) -> Vec<UnresolvedEntry> {
    let ids = allocate_ids(descriptors, pass);
    let mut after: Option<String> = None;
    let mut entries = Vec::new();
    for (position, d) in descriptors.iter().enumerate() {
        if let Some(id) = &ids[position] {
            after = Some(id.clone());
            continue;
        }
        if d.from_fallback {
            continue;
        }
        entries.push(UnresolvedEntry {
            title: d.title.clone(),
            position,
            depth: d.depth_hint,
            printed_page: d.printed_page,
            expected_page: d.expected_page(),
            after: after.clone(),
        });
    }
    entries
}

fn fallback_descriptor(section: &FallbackSection) -> Descriptor {
    let mut d = Descriptor::new(&section.title, None, None);
    if let Some(depth) = section.depth {
        d.depth_hint = depth.clamp(1, 6);
    }
    d.from_fallback = true;
    d
}

/// First unclaimed body heading in `lines` (inclusive) matching `key`.
fn find_heading<'v>(
    view: &'v DocumentView,
    key: &TitleKey,
    lines: (usize, usize),
    claimed: &HashSet<usize>,
) -> Option<&'v HeadingLine> {
    view.body_headings()
        .find(|h| h.line >= lines.0 && h.line <= lines.1 && !claimed.contains(&h.line) && key.matches(&h.key))
}

fn record_calibration(diagnostics: &mut Vec<Diagnostic>, calibration: &Calibration, has_toc: bool) {
    match (&calibration.anchor, calibration.offset) {
        (Some(anchor), Some(offset)) => diagnostics.push(Diagnostic::CalibrationAnchor {
            title: anchor.title.clone(),
            printed: anchor.printed,
            internal: anchor.internal,
            source: anchor.source,
            offset,
        }),
        _ if has_toc => diagnostics.push(Diagnostic::NoAnchor),
        _ => {}
    }
    if let (true, Some(check)) = (calibration.mismatch(), &calibration.check) {
        diagnostics.push(Diagnostic::AnchorMismatch {
            title: check.title.clone(),
            offset: check.offset(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutConfig;
    use crate::error::{BookIndexError, Result};
    use crate::meta::MetaEntry;
    use crate::tree::IndexNode;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFallback {
        calls: AtomicUsize,
        sections: Vec<FallbackSection>,
    }

    impl StubFallback {
        fn new(sections: Vec<FallbackSection>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                sections,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SectionFallback for StubFallback {
        async fn resolve_fallback(&self, _request: &FallbackRequest) -> Result<Vec<FallbackSection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.sections.clone())
        }
    }

    struct HangingFallback;

    #[async_trait]
    impl SectionFallback for HangingFallback {
        async fn resolve_fallback(&self, _request: &FallbackRequest) -> Result<Vec<FallbackSection>> {
            std::future::pending::<()>().await;
            Err(BookIndexError::LlmApi("unreachable".into()))
        }
    }

    fn section(title: &str, page: u32) -> FallbackSection {
        FallbackSection {
            title: title.to_string(),
            depth: None,
            page: Some(page),
        }
    }

    const BOOK: &str = "<!-- page 3 -->

# Contents

| Intro | 1 |
| --- | --- |
| Background | 4 |
| Methods | 9 |

<!-- page 22 -->

# Intro

Opening text.

<!-- page 25 -->

## Background

More text.

<!-- page 30 -->

## Methods

Final text.";

    async fn resolve(text: &str) -> Index {
        IndexResolver::new(IndexConfig::default())
            .resolve("book", text, &LayoutModel::default())
            .await
    }

    fn assert_ranges(nodes: &[IndexNode], lo: usize, hi: usize) {
        let mut previous_end = lo;
        for node in nodes {
            assert!(node.line_start >= previous_end && node.line_start <= node.line_end);
            assert!(node.line_start >= lo && node.line_end <= hi);
            previous_end = node.line_end;
            assert_ranges(&node.children, node.line_start, node.line_end);
        }
    }

    #[tokio::test]
    async fn test_offset_scenario() {
        let index = resolve(BOOK).await;

        assert_eq!(index.source, DescriptorSource::Toc);
        assert_eq!(index.offset, Some(21));
        assert!(index.unresolved.is_empty());

        let pages: Vec<(&str, u32, Option<u32>)> = index
            .flatten()
            .iter()
            .map(|n| (n.title.as_str(), n.page_start, n.expected_page))
            .collect();
        assert_eq!(
            pages,
            vec![("Intro", 22, Some(22)), ("Background", 25, Some(25)), ("Methods", 30, Some(30))]
        );

        let background = index.find("background").unwrap();
        assert_eq!(background.page_source, Some(PageSource::Offset));
        assert_eq!(background.resolved_by, ResolvedBy::PageLocal);
        assert_eq!((background.line_start, background.line_end), (18, 24));

        assert_eq!(index.roots.len(), 1);
        assert_eq!(index.roots[0].children.len(), 2);
        assert_eq!(index.roots[0].line_end, index.line_count + 1);
        assert_ranges(&index.roots, 1, index.line_count + 1);
        assert!(!index.diagnostics.iter().any(|d| matches!(d, Diagnostic::Escalated { .. })));
    }

    #[tokio::test]
    async fn test_all_unresolved_escalates_once() {
        let text = "<!-- page 1 -->

| Alpha | 5 |
| --- | --- |
| Beta | 7 |

Plain text without headings.";
        let stub = StubFallback::new(vec![]);
        let index = IndexResolver::new(IndexConfig::default())
            .with_fallback(stub.clone())
            .resolve("doc", text, &LayoutModel::default())
            .await;

        assert!(index.roots.is_empty());
        let titles: Vec<&str> = index.unresolved.iter().map(|u| u.title.as_str()).collect();
        assert_eq!(titles, vec!["Alpha", "Beta"]);
        assert!(index.unresolved.iter().all(|u| u.after.is_none()));
        assert_eq!(stub.calls(), 1);
        assert!(index.diagnostics.iter().any(|d| matches!(d, Diagnostic::Escalated { .. })));
    }

    #[tokio::test]
    async fn test_fallback_never_overrides_resolved_nodes() {
        let text = BOOK.replace("## Background", "## Backgr0und").replace("## Methods", "## Meth0ds");
        let stub = StubFallback::new(vec![
            section("Intro", 40),
            section("Background", 25),
            section("Methods", 30),
            section("Appendix", 30),
        ]);
        let index = IndexResolver::new(IndexConfig::default())
            .with_fallback(stub.clone())
            .resolve("book", &text, &LayoutModel::default())
            .await;

        assert_eq!(stub.calls(), 1);
        let intro = index.find("intro").unwrap();
        assert_eq!((intro.page_start, intro.resolved_by), (22, ResolvedBy::PageLocal));

        let background = index.find("background").unwrap();
        assert_eq!(background.resolved_by, ResolvedBy::Fallback);
        assert_eq!(background.page_start, 25);
        assert_eq!(background.page_source, Some(PageSource::Fallback));

        assert!(index.unresolved.is_empty());
        assert!(index.find("appendix").is_none());
        assert!(index.diagnostics.contains(&Diagnostic::FallbackMerged { nodes: 2 }));
    }

    #[tokio::test]
    async fn test_fallback_builds_tree_when_nothing_resolved() {
        let text = "<!-- page 1 -->\n\nNo headings here.\n\n<!-- page 2 -->\n\n# Real Start\n\ntext";
        let config = IndexConfig {
            heading_scan_fallback: false,
            ..IndexConfig::default()
        };
        let stub = StubFallback::new(vec![section("Real Start", 2), section("Preface", 1)]);
        let index = IndexResolver::new(config)
            .with_fallback(stub)
            .resolve("doc", text, &LayoutModel::default())
            .await;

        assert_eq!(index.source, DescriptorSource::Fallback);
        let lines: Vec<(&str, usize)> = index.flatten().iter().map(|n| (n.title.as_str(), n.line_start)).collect();
        assert_eq!(lines, vec![("Preface", 1), ("Real Start", 7)]);
    }

    #[tokio::test]
    async fn test_fallback_timeout_is_degraded_not_fatal() {
        let text = "<!-- page 1 -->\n\n| Alpha | 5 |\n| Beta | 7 |";
        let config = IndexConfig {
            fallback_timeout_secs: 0,
            ..IndexConfig::default()
        };
        let index = IndexResolver::new(config)
            .with_fallback(Arc::new(HangingFallback))
            .resolve("doc", text, &LayoutModel::default())
            .await;
        assert_eq!(index.unresolved.len(), 2);
        assert!(index.diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::FallbackFailed { message } if message == &BookIndexError::FallbackTimeout(0).to_string()
        )));
    }

    #[tokio::test]
    async fn test_no_fallback_keeps_rule_result() {
        let text = "<!-- page 1 -->\n\n| Alpha | 5 |\n| Beta | 7 |";
        let index = IndexResolver::new(IndexConfig::default())
            .with_fallback(Arc::new(crate::llm::NoFallback))
            .resolve("doc", text, &LayoutModel::default())
            .await;
        assert!(index.roots.is_empty());
        assert_eq!(index.unresolved.len(), 2);
        assert!(index.diagnostics.iter().any(|d| matches!(d, Diagnostic::Escalated { .. })));
        assert!(index.diagnostics.contains(&Diagnostic::FallbackMerged { nodes: 0 }));
    }

    #[tokio::test]
    async fn test_lettered_divisions_do_not_cross_match() {
        let text = "<!-- page 3 -->

# Contents

| Appendix A Proofs | 10 |
| --- | --- |
| Appendix B Proofs | 11 |

<!-- page 10 -->

Plain text without a heading.

<!-- page 11 -->

# Appendix B Proofs

Proof text.";
        let index = resolve(text).await;

        let nodes: Vec<(&str, u32)> = index.flatten().iter().map(|n| (n.title.as_str(), n.page_start)).collect();
        assert_eq!(nodes, vec![("Appendix B Proofs", 11)]);
        let unresolved: Vec<&str> = index.unresolved.iter().map(|u| u.title.as_str()).collect();
        assert_eq!(unresolved, vec!["Appendix A Proofs"]);
        assert_eq!(index.offset, Some(0));
    }

    #[test]
    fn test_rebuild_is_identical() {
        let first = tokio_test::block_on(resolve(BOOK));
        let second = tokio_test::block_on(resolve(BOOK));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_full_document_search_recovers_wrong_offset() {
        // The printed page of Methods is wrong; its heading is still found.
        let text = BOOK.replace("| Methods | 9 |", "| Methods | 2 |");
        let index = resolve(&text).await;
        let methods = index.find("methods").unwrap();
        assert_eq!(methods.resolved_by, ResolvedBy::FullDocument);
        assert_eq!(methods.page_start, 30);
        assert_eq!(methods.expected_page, Some(23));
    }

    #[tokio::test]
    async fn test_unresolved_entry_keeps_position() {
        let text = BOOK.replace("| Methods | 9 |", "| Background | 4 |\n| Results | 12 |\n| Methods | 9 |");
        let index = resolve(&text).await;
        let results = index.unresolved.iter().find(|u| u.title == "Results").unwrap();
        assert_eq!(results.after.as_deref(), Some("background"));
        assert_eq!(results.expected_page, Some(33));
        // The duplicated row cannot claim the same heading twice.
        assert_eq!(index.unresolved.iter().filter(|u| u.title == "Background").count(), 1);
        assert_eq!(index.node_count(), 3);
    }

    #[tokio::test]
    async fn test_metadata_descriptors() {
        let text = "<!-- page 1 -->\n\n# Preface\n\n<!-- page 2 -->\n\n## 1.1 Setup\n\nbody\n\n<!-- page 3 -->\n\n## 1.2 Usage";
        let meta = |title: &str, page| MetaEntry {
            title: title.into(),
            page_id: Some(page),
            polygon: vec![[100.0, 120.0], [300.0, 120.0]],
        };
        let layout = LayoutModel::build(
            vec![
                meta("1.1 Setup", 2),
                meta("1.2 Usage", 3),
                MetaEntry {
                    polygon: vec![[20.0, 300.0], [80.0, 300.0]],
                    ..meta("side note", 3)
                },
            ],
            Some(612.0),
            &LayoutConfig::default(),
        );
        let index = IndexResolver::new(IndexConfig::default())
            .resolve("doc", text, &layout)
            .await;

        assert_eq!(index.source, DescriptorSource::Metadata);
        let ids: Vec<&str> = index.flatten().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["sec_1_1", "sec_1_2"]);
        assert_eq!(index.annotations.len(), 1);
        assert_eq!(index.find("sec_1_2").unwrap().page_source, Some(PageSource::Metadata));
    }

    #[tokio::test]
    async fn test_heading_scan_without_toc_or_metadata() {
        let text = "<!-- page 1 -->\n\n# 1 Alpha\n\ntext\n\n## 1.1 Beta\n\n<!-- page 2 -->\n\n# 2 Gamma\n\n### Marginal notes\n\nnote";
        let index = resolve(text).await;

        assert_eq!(index.source, DescriptorSource::HeadingScan);
        assert_eq!(index.roots.len(), 2);
        assert_eq!(index.roots[0].children[0].title, "1.1 Beta");
        assert_eq!(index.roots[1].page_start, 2);
        assert!(index.flatten().iter().all(|n| n.resolved_by == ResolvedBy::HeadingScan));
        assert_eq!(index.headings.len(), 3);
    }
}
