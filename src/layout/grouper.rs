//! Line and paragraph grouping of positioned fragments.

use crate::config::LayoutConfig;
use crate::document::{Fragment, SourcePage};

/// Fragments sharing one vertical band, ordered left to right.
#[derive(Debug, Clone)]
pub struct Line {
    pub fragments: Vec<Fragment>,
    /// Top edge of the first fragment that opened the line.
    pub y0: f64,
    /// Leftmost fragment start.
    pub x0: f64,
    /// Largest font size on the line.
    pub font_size: f64,
    /// Set when the gap above this line is a paragraph break.
    pub starts_paragraph: bool,
}

impl Line {
    fn from_fragments(mut fragments: Vec<Fragment>, y0: f64) -> Self {
        fragments.sort_by(|a, b| a.bbox.x0.total_cmp(&b.bbox.x0));
        let x0 = fragments.first().map(|f| f.bbox.x0).unwrap_or(0.0);
        let font_size = fragments.iter().map(|f| f.font_size).fold(0.0, f64::max);
        Self {
            fragments,
            y0,
            x0,
            font_size,
            starts_paragraph: false,
        }
    }

    /// Split off the fragments matching `pred` into a new line at the same height.
    pub fn split_off_where(&mut self, pred: impl Fn(&Fragment) -> bool) -> Option<Line> {
        let (taken, kept): (Vec<_>, Vec<_>) = self.fragments.drain(..).partition(|f| pred(f));
        self.fragments = kept;
        if let Some(first) = self.fragments.first() {
            self.x0 = first.bbox.x0;
            self.font_size = self.fragments.iter().map(|f| f.font_size).fold(0.0, f64::max);
        }
        if taken.is_empty() {
            None
        } else {
            let mut line = Line::from_fragments(taken, self.y0);
            line.starts_paragraph = true;
            Some(line)
        }
    }

    /// Fragment texts joined left to right with single spaces.
    pub fn text(&self) -> String {
        self.fragments
            .iter()
            .map(|f| f.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Like [`Line::text`], with bold and italic fragments wrapped in emphasis.
    pub fn rendered(&self) -> String {
        self.fragments
            .iter()
            .filter(|f| !f.text.trim().is_empty())
            .map(|f| {
                let t = f.text.trim();
                match (f.bold, f.italic) {
                    (true, true) => format!("***{}***", t),
                    (true, false) => format!("**{}**", t),
                    (false, true) => format!("*{}*", t),
                    (false, false) => t.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn char_len(&self) -> usize {
        self.text().chars().count()
    }
}

/// Per-page statistics used by classification.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageStats {
    /// Median vertical distance between consecutive lines; `None` with fewer than two lines.
    pub median_gap: Option<f64>,
    /// Median of the per-line font sizes.
    pub median_font_size: f64,
    pub width: f64,
}

/// Output of grouping one page.
#[derive(Debug, Clone)]
pub struct GroupedPage {
    pub number: u32,
    pub lines: Vec<Line>,
    pub stats: PageStats,
    /// Fragments skipped as malformed.
    pub diagnostics: Vec<String>,
}

/// Groups the fragments of a page into lines and paragraphs.
pub struct SpanGrouper<'a> {
    config: &'a LayoutConfig,
}

impl<'a> SpanGrouper<'a> {
    pub fn new(config: &'a LayoutConfig) -> Self {
        Self { config }
    }

    pub fn group(&self, page: &SourcePage) -> GroupedPage {
        let mut diagnostics = Vec::new();
        let mut fragments: Vec<Fragment> = Vec::with_capacity(page.fragments.len());
        let mut dropped_in_images = 0usize;

        for (i, fragment) in page.fragments.iter().enumerate() {
            if fragment.text.trim().is_empty() {
                continue;
            }
            if let Some(defect) = fragment.defect() {
                diagnostics.push(format!(
                    "page {}: skipped fragment {} ({}): {:?}",
                    page.number, i, defect, fragment.text
                ));
                continue;
            }
            let (cx, cy) = fragment.bbox.center();
            if page.image_boxes.iter().any(|b| b.contains(cx, cy)) {
                dropped_in_images += 1;
                continue;
            }
            fragments.push(fragment.clone());
        }

        if dropped_in_images > 0 {
            log::debug!(
                "page {}: dropped {} fragments inside image boxes",
                page.number,
                dropped_in_images
            );
        }

        let mut lines = self.group_lines(fragments);
        let median_gap = mark_paragraphs(&mut lines, self.config.paragraph_gap_multiplier);
        let median_font_size = upper_median(lines.iter().map(|l| l.font_size).collect()).unwrap_or(11.0);

        GroupedPage {
            number: page.number,
            lines,
            stats: PageStats {
                median_gap,
                median_font_size,
                width: page.effective_width(),
            },
            diagnostics,
        }
    }

    /// Sort by (y, x) and join fragments whose top edge is within tolerance of the line's.
    fn group_lines(&self, mut fragments: Vec<Fragment>) -> Vec<Line> {
        fragments.sort_by(|a, b| {
            a.bbox
                .y0
                .total_cmp(&b.bbox.y0)
                .then(a.bbox.x0.total_cmp(&b.bbox.x0))
        });

        let tolerance = self.config.line_y_tolerance;
        let mut lines = Vec::new();
        let mut current: Vec<Fragment> = Vec::new();
        let mut current_y = 0.0;

        for fragment in fragments {
            if !current.is_empty() && (fragment.bbox.y0 - current_y).abs() > tolerance {
                lines.push(Line::from_fragments(std::mem::take(&mut current), current_y));
            }
            if current.is_empty() {
                current_y = fragment.bbox.y0;
            }
            current.push(fragment);
        }
        if !current.is_empty() {
            lines.push(Line::from_fragments(current, current_y));
        }

        lines
    }
}

/// Flag paragraph starts; returns the median gap when one exists.
fn mark_paragraphs(lines: &mut [Line], multiplier: f64) -> Option<f64> {
    if let Some(first) = lines.first_mut() {
        first.starts_paragraph = true;
    }
    if lines.len() <= 1 {
        return None;
    }

    let gaps: Vec<f64> = lines.windows(2).map(|w| w[1].y0 - w[0].y0).collect();
    let median = upper_median(gaps.clone())?;
    let threshold = median * multiplier;

    for (i, gap) in gaps.iter().enumerate() {
        if *gap > threshold {
            lines[i + 1].starts_paragraph = true;
        }
    }
    Some(median)
}

/// Element at `len / 2` of the sorted values.
pub(crate) fn upper_median(mut values: Vec<f64>) -> Option<f64> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(values[values.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::BBox;

    fn frag(text: &str, x: f64, y: f64, size: f64) -> Fragment {
        Fragment::new(text, BBox::new(x, y, x + 8.0 * text.len() as f64, y + size), size)
    }

    fn page(fragments: Vec<Fragment>) -> SourcePage {
        SourcePage {
            width: Some(612.0),
            ..SourcePage::new(1, fragments)
        }
    }

    #[test]
    fn test_near_identical_y_collapses_to_one_line() {
        let config = LayoutConfig::default();
        let fragments: Vec<Fragment> = (0..40)
            .map(|i| frag("w", 100.0 + 10.0 * i as f64, 200.0 + 0.05 * i as f64, 10.0))
            .collect();
        let grouped = SpanGrouper::new(&config).group(&page(fragments));
        assert_eq!(grouped.lines.len(), 1);
        assert_eq!(grouped.lines[0].fragments.len(), 40);
        assert!(grouped.stats.median_gap.is_none());
    }

    #[test]
    fn test_fragments_joined_left_to_right() {
        let config = LayoutConfig::default();
        let fragments = vec![frag("world", 200.0, 100.4, 10.0), frag("hello", 100.0, 100.0, 10.0)];
        let grouped = SpanGrouper::new(&config).group(&page(fragments));
        assert_eq!(grouped.lines.len(), 1);
        assert_eq!(grouped.lines[0].text(), "hello world");
    }

    #[test]
    fn test_paragraph_break_on_large_gap() {
        let config = LayoutConfig::default();
        let ys = [100.0, 112.0, 124.0, 136.0, 156.0, 168.0];
        let fragments = ys.iter().map(|&y| frag("line", 100.0, y, 10.0)).collect();
        let grouped = SpanGrouper::new(&config).group(&page(fragments));

        assert_eq!(grouped.stats.median_gap, Some(12.0));
        let starts: Vec<bool> = grouped.lines.iter().map(|l| l.starts_paragraph).collect();
        assert_eq!(starts, vec![true, false, false, false, true, false]);
    }

    #[test]
    fn test_malformed_fragments_skipped_with_diagnostic() {
        let config = LayoutConfig::default();
        let mut bad = frag("bad", 100.0, 100.0, 10.0);
        bad.bbox.x1 = bad.bbox.x0;
        let mut nan = frag("nan", 100.0, 120.0, 10.0);
        nan.bbox.y0 = f64::NAN;
        let good = frag("good", 100.0, 140.0, 10.0);

        let grouped = SpanGrouper::new(&config).group(&page(vec![bad, nan, good]));
        assert_eq!(grouped.lines.len(), 1);
        assert_eq!(grouped.diagnostics.len(), 2);
    }

    #[test]
    fn test_fragments_inside_images_dropped() {
        let config = LayoutConfig::default();
        let mut p = page(vec![frag("label", 120.0, 120.0, 8.0), frag("text", 100.0, 300.0, 10.0)]);
        p.image_boxes.push(BBox::new(100.0, 100.0, 400.0, 200.0));
        let grouped = SpanGrouper::new(&config).group(&p);
        assert_eq!(grouped.lines.len(), 1);
        assert_eq!(grouped.lines[0].text(), "text");
    }

    #[test]
    fn test_empty_page() {
        let config = LayoutConfig::default();
        let grouped = SpanGrouper::new(&config).group(&page(vec![]));
        assert!(grouped.lines.is_empty());
        assert!(grouped.stats.median_gap.is_none());
    }

    #[test]
    fn test_rendered_emphasis() {
        let mut bold = frag("Note", 100.0, 100.0, 10.0);
        bold.bold = true;
        let line = Line::from_fragments(vec![bold, frag("this", 150.0, 100.0, 10.0)], 100.0);
        assert_eq!(line.rendered(), "**Note** this");
        assert_eq!(line.text(), "Note this");
    }
}
