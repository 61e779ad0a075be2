//! Page layout analysis: fragments to lines, lines to typed runs.

pub mod classifier;
pub mod grouper;
pub mod table;

pub use classifier::{ClassifiedPage, ContentClassifier, Kind, Run};
pub use grouper::{GroupedPage, Line, PageStats, SpanGrouper};
pub use table::{detect_table, TableGrid};

use crate::config::LayoutConfig;
use crate::document::SourcePage;

/// Group and classify a single page.
pub fn analyze_page(page: &SourcePage, config: &LayoutConfig) -> ClassifiedPage {
    let grouped = SpanGrouper::new(config).group(page);
    log::debug!(
        "page {}: {} lines, median gap {:?}",
        page.number,
        grouped.lines.len(),
        grouped.stats.median_gap
    );
    ContentClassifier::new(config).classify(grouped)
}
