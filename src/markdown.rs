//! Markdown emission of classified pages.
//!
//! The emitted document is one flowing text. Every page opens with a
//! `<!-- page N -->` marker line; those markers are the only link between
//! an output line and the page it came from.

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;

use crate::chapters::{Chapter, ChapterSplitter};
use crate::config::LayoutConfig;
use crate::document::SourceDocument;
use crate::layout::{analyze_page, ClassifiedPage, Kind, Run};
use crate::text::{page_marker, DIAGRAM_PLACEHOLDER, MARGIN_NOTES_HEADING};

static BLANK_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank run regex"));

/// The paginated text of a converted document.
#[derive(Debug, Clone)]
pub struct EmittedDocument {
    pub name: String,
    pub text: String,
    pub page_count: usize,
    pub chapters: Vec<Chapter>,
    /// Fragments skipped during layout, one entry each.
    pub diagnostics: Vec<String>,
}

impl EmittedDocument {
    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

/// Serializes classified pages into paginated markdown.
pub struct MarkdownEmitter<'a> {
    config: &'a LayoutConfig,
}

impl<'a> MarkdownEmitter<'a> {
    pub fn new(config: &'a LayoutConfig) -> Self {
        Self { config }
    }

    pub fn emit(&self, doc: &SourceDocument) -> EmittedDocument {
        // Page statistics are independent, so layout runs in parallel; collect keeps page order.
        let pages: Vec<ClassifiedPage> = doc
            .pages
            .par_iter()
            .map(|page| analyze_page(page, self.config))
            .collect();

        let mut raw = String::new();
        let mut diagnostics = Vec::new();
        for page in &pages {
            raw.push_str(&render_page(page));
            diagnostics.extend(page.diagnostics.iter().cloned());
        }

        let text = cleanup(&raw);
        let chapters = ChapterSplitter::new(self.config).split(&text, &doc.name);

        log::info!(
            "emitted {} pages, {} lines, {} chapters ({} fragments skipped)",
            pages.len(),
            text.lines().count(),
            chapters.len(),
            diagnostics.len()
        );

        EmittedDocument {
            name: doc.name.clone(),
            text,
            page_count: pages.len(),
            chapters,
            diagnostics,
        }
    }
}

/// Render one page: marker, main-flow runs, then the margin subsection.
pub fn render_page(page: &ClassifiedPage) -> String {
    let mut blocks = vec![page_marker(page.number)];
    blocks.extend(page.runs.iter().filter_map(render_run));

    let notes: Vec<&str> = page
        .margin_runs
        .iter()
        .map(|r| r.text.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if !notes.is_empty() {
        blocks.push(format!("### {}", MARGIN_NOTES_HEADING));
        blocks.extend(notes.into_iter().map(String::from));
    }

    let mut out = blocks.join("\n\n");
    out.push_str("\n\n");
    out
}

fn render_run(run: &Run) -> Option<String> {
    let text = run.text.trim();
    if text.is_empty() {
        return None;
    }
    let rendered = match run.kind {
        Kind::Heading => {
            let level = run.heading_level.unwrap_or(2).clamp(1, 6) as usize;
            let title = text.split_whitespace().collect::<Vec<_>>().join(" ");
            format!("{} {}", "#".repeat(level), title.trim_start_matches('#').trim())
        }
        Kind::Equation => format!("$$\n{}\n$$", text),
        Kind::Diagram => DIAGRAM_PLACEHOLDER.to_string(),
        Kind::Table => text.to_string(),
        Kind::Body | Kind::Margin => escape_block_start(text),
    };
    Some(rendered)
}

/// Keep body text from being read back as a heading or a page marker.
fn escape_block_start(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.starts_with('#') || line.starts_with("<!--") {
                format!("\\{}", line)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse blank runs and replace glyph-soup lines with one placeholder.
pub fn cleanup(raw: &str) -> String {
    let collapsed = BLANK_RUN_RE.replace_all(raw.trim(), "\n\n");

    let mut out: Vec<&str> = Vec::new();
    for line in collapsed.lines() {
        let odd = line
            .chars()
            .filter(|&c| !c.is_whitespace() && (c == '\u{FFFD}' || c.is_control() || ('\u{E000}'..='\u{F8FF}').contains(&c)))
            .count();
        if line.chars().count() >= 8 && odd >= 3 {
            let previous = out.iter().rev().find(|l| !l.trim().is_empty());
            if previous.map(|l| l.trim()) != Some(DIAGRAM_PLACEHOLDER) {
                out.push(DIAGRAM_PLACEHOLDER);
            }
            continue;
        }
        out.push(line);
    }

    let joined = out.join("\n");
    BLANK_RUN_RE.replace_all(joined.trim(), "\n\n").into_owned()
}
