//! Content classification of grouped lines into typed runs.
//!
//! Each line gets exactly one kind. The checks are applied in a fixed
//! precedence order: heading, equation, diagram, table, margin, body.
//! Consecutive lines of the same kind are merged into a single [`Run`].

use once_cell::sync::Lazy;
use regex::Regex;

use super::grouper::{GroupedPage, Line, PageStats};
use super::table::detect_table;
use crate::config::LayoutConfig;
use crate::text::{section_depth, section_number, PageLabel, DIAGRAM_PLACEHOLDER};

static CHAPTER_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i:chapter)\s+(?:\d{1,3}|[IVXLCDM]{1,6})\b").expect("valid chapter heading regex")
});

static NUMBERED_HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{1,3}\.|\d{1,3}(?:\.\d{1,3})+\.?)\s+\p{Lu}").expect("valid numbered heading regex")
});

static LEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\.\s?){3,}\s*\S+\s*$").expect("valid leader regex"));

static EQUATION_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\d{1,3}\.\d{1,3}\)\s*$").expect("valid equation number regex"));

/// What a run of lines represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Heading,
    Body,
    Equation,
    Diagram,
    Table,
    Margin,
}

/// A maximal sequence of lines sharing one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub kind: Kind,
    /// Internal page number the run came from.
    pub page: u32,
    /// Rendered content: paragraphs for body, a pipe grid for tables,
    /// the placeholder for diagrams.
    pub text: String,
    /// Only set for headings.
    pub heading_level: Option<u8>,
}

/// Main-flow runs of a page plus the margin notes lifted out of it.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedPage {
    pub number: u32,
    pub runs: Vec<Run>,
    pub margin_runs: Vec<Run>,
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tag {
    Heading(u8),
    Equation,
    Diagram,
    Body,
}

pub struct ContentClassifier<'a> {
    config: &'a LayoutConfig,
}

impl<'a> ContentClassifier<'a> {
    pub fn new(config: &'a LayoutConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, page: GroupedPage) -> ClassifiedPage {
        let GroupedPage {
            number,
            lines,
            stats,
            diagnostics,
        } = page;

        let continued: Vec<bool> = (0..lines.len())
            .map(|i| lines.get(i + 1).is_some_and(continues_sentence))
            .collect();
        let tagged: Vec<(Tag, Line)> = lines
            .into_iter()
            .zip(continued)
            .map(|(line, continued)| (self.tag_line(&line, continued, &stats), line))
            .collect();

        let mut builder = RunBuilder::new(number, &stats, self.config.paragraph_gap_multiplier);
        let mut i = 0;
        while i < tagged.len() {
            let (tag, line) = &tagged[i];
            match tag {
                Tag::Heading(level) => builder.push_heading(*level, line),
                Tag::Equation => builder.push_line(Kind::Equation, line.clone()),
                Tag::Diagram => builder.push_line(Kind::Diagram, line.clone()),
                Tag::Body => {
                    let end = tagged[i..]
                        .iter()
                        .position(|(t, l)| *t != Tag::Body || l.fragments.len() < 2)
                        .map_or(tagged.len(), |p| i + p);
                    if end - i >= self.config.table_min_rows {
                        let rows: Vec<Line> = tagged[i..end].iter().map(|(_, l)| l.clone()).collect();
                        if let Some(grid) = detect_table(&rows, self.config) {
                            builder.push_table(grid.to_markdown());
                            i = end;
                            continue;
                        }
                    }
                    self.push_body_or_margin(&mut builder, line.clone(), stats.width);
                }
            }
            i += 1;
        }

        let (runs, margin_runs) = builder.finish();
        ClassifiedPage {
            number,
            runs,
            margin_runs,
            diagnostics,
        }
    }

    fn tag_line(&self, line: &Line, continued: bool, stats: &PageStats) -> Tag {
        let text = line.text();
        if let Some(level) = self.heading_level(line, &text, continued, stats) {
            Tag::Heading(level)
        } else if self.is_equation(&text) {
            Tag::Equation
        } else if self.is_diagram(&text) {
            Tag::Diagram
        } else {
            Tag::Body
        }
    }

    /// Route a body line to the margin when it sits outside the central band.
    fn push_body_or_margin(&self, builder: &mut RunBuilder, mut line: Line, width: f64) {
        if width <= 0.0 {
            builder.push_line(Kind::Body, line);
            return;
        }
        let left = width * self.config.margin_fraction;
        let right = width * (1.0 - self.config.margin_fraction);
        let marginal = |x0: f64, x1: f64| x1 <= left || x0 >= right;

        if line.fragments.iter().all(|f| marginal(f.bbox.x0, f.bbox.x1)) {
            builder.push_margin(line);
            return;
        }
        let note = line.split_off_where(|f| marginal(f.bbox.x0, f.bbox.x1));
        builder.push_line(Kind::Body, line);
        if let Some(note) = note {
            builder.push_margin(note);
        }
    }

    /// Heading level when the line qualifies by font size or by numbering pattern.
    ///
    /// A numbered line at body size must not be smaller than the median and
    /// must not run on into a lowercase continuation line, which is how a
    /// wrapped list item looks.
    fn heading_level(&self, line: &Line, text: &str, continued: bool, stats: &PageStats) -> Option<u8> {
        let len = text.chars().count();
        if len == 0 || len >= self.config.heading_max_len || !text.chars().any(char::is_alphabetic) {
            return None;
        }

        let patterned = !looks_like_toc_row(line, text);
        let chapter = patterned && CHAPTER_HEADING_RE.is_match(text);
        let numbered = patterned
            && NUMBERED_HEADING_RE.is_match(text)
            && !text.ends_with('.')
            && line.font_size >= stats.median_font_size
            && !continued;
        let by_font = line.font_size >= self.config.heading_font_size_min
            && line.font_size - stats.median_font_size >= self.config.heading_size_above_median;

        if !(chapter || numbered || by_font) {
            return None;
        }

        let level = if chapter {
            1
        } else if let Some(number) = section_number(text) {
            section_depth(&number)
        } else if line.font_size >= stats.median_font_size * self.config.heading_level1_ratio {
            1
        } else {
            2
        };
        Some(level)
    }

    fn is_equation(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.len() < self.config.equation_min_len {
            return false;
        }
        if text.contains('=') && EQUATION_NUMBER_RE.is_match(text) {
            return true;
        }
        if !chars.iter().any(|&c| is_operator(c)) {
            return false;
        }
        let considered = chars.iter().filter(|&&c| !is_garbage(c)).count();
        if considered == 0 {
            return false;
        }
        let math = chars.iter().filter(|&&c| is_math_char(c)).count();
        math as f64 / considered as f64 >= self.config.equation_math_ratio_min
    }

    fn is_diagram(&self, text: &str) -> bool {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let n = chars.len();
        if n < 2 {
            return false;
        }
        let ratio = |count: usize| count as f64 / n as f64;

        let garbage = chars.iter().filter(|&&c| is_garbage(c)).count();
        if ratio(garbage) >= self.config.diagram_garbage_ratio_min {
            return true;
        }

        let replacement = chars.iter().filter(|&&c| c == '\u{FFFD}').count();
        if n >= 5 && ratio(replacement) >= 0.15 {
            return true;
        }

        let odd = chars.iter().filter(|&&c| is_odd_glyph(c)).count();
        if odd >= 3 || (n >= 12 && ratio(odd) > 0.2) {
            return true;
        }

        if n >= 10 {
            let stray = chars.iter().filter(|&&c| "@`¬\u{AD}".contains(c)).count();
            if stray >= 2 {
                return true;
            }

            // Long runs of one symbol, leaders excepted.
            let mut counts = std::collections::HashMap::new();
            for &c in chars.iter().filter(|c| !c.is_alphanumeric() && !".·…".contains(**c)) {
                *counts.entry(c).or_insert(0usize) += 1;
            }
            if counts.values().any(|&c| ratio(c) > 0.35) {
                return true;
            }
        }

        if n >= 15 {
            let symbolic = chars
                .iter()
                .filter(|&&c| !c.is_alphanumeric() && !c.is_ascii_punctuation() && !is_typographic(c))
                .count();
            if ratio(symbolic) > 0.3 {
                return true;
            }
        }

        false
    }
}

/// A contents row: dot leaders, or a page number set well apart at the right.
fn looks_like_toc_row(line: &Line, text: &str) -> bool {
    if LEADER_RE.is_match(text) {
        return true;
    }
    match line.fragments.as_slice() {
        [.., prev, last] => {
            PageLabel::parse(&last.text).is_some() && last.bbox.x0 - prev.bbox.x1 > 3.0 * line.font_size
        }
        _ => false,
    }
}

fn is_operator(c: char) -> bool {
    "=+*/^<>±×÷√∑∏∫".contains(c) || ('\u{2200}'..='\u{22FF}').contains(&c)
}

fn is_math_char(c: char) -> bool {
    c.is_ascii_digit()
        || "=+-*/^_()[]{}|<>\\'".contains(c)
        || "±×÷·√∞∑∏∫∂′″".contains(c)
        || ('\u{0370}'..='\u{03FF}').contains(&c)
        || ('\u{2190}'..='\u{21FF}').contains(&c)
        || ('\u{2200}'..='\u{22FF}').contains(&c)
}

/// Box drawing, block elements and filled squares left behind by vector art.
fn is_garbage(c: char) -> bool {
    ('\u{2500}'..='\u{259F}').contains(&c) || matches!(c, '■' | '□' | '▪' | '\u{FFFD}')
}

fn is_odd_glyph(c: char) -> bool {
    c.is_control()
        || ('\u{E000}'..='\u{F8FF}').contains(&c)
        || ('\u{200B}'..='\u{200F}').contains(&c)
        || ('\u{2060}'..='\u{206F}').contains(&c)
        || ('\u{0300}'..='\u{036F}').contains(&c)
}

fn is_typographic(c: char) -> bool {
    "‘’“”–—…•·§¶†‡°€£¥©®™«»".contains(c)
}

/// Append a wrapped line, rejoining words split by an end-of-line hyphen.
pub(crate) fn join_wrapped(acc: &mut String, next: &str) {
    if acc.is_empty() {
        acc.push_str(next);
        return;
    }
    let hyphenated = acc.ends_with('-')
        && acc.chars().rev().nth(1).is_some_and(char::is_alphabetic)
        && next.chars().next().is_some_and(char::is_lowercase);
    if hyphenated {
        acc.pop();
    } else {
        acc.push(' ');
    }
    acc.push_str(next);
}

/// Accumulates classified lines into merged runs.
struct RunBuilder {
    page: u32,
    margin_break: f64,
    runs: Vec<Run>,
    margin_runs: Vec<Run>,
    pending: Option<(Kind, Vec<Line>)>,
    margin_pending: Vec<Line>,
}

impl RunBuilder {
    fn new(page: u32, stats: &PageStats, multiplier: f64) -> Self {
        Self {
            page,
            margin_break: stats.median_gap.map_or(f64::MAX, |g| g * multiplier),
            runs: Vec::new(),
            margin_runs: Vec::new(),
            pending: None,
            margin_pending: Vec::new(),
        }
    }

    fn push_line(&mut self, kind: Kind, line: Line) {
        if let Some((k, lines)) = &mut self.pending {
            if *k == kind {
                lines.push(line);
                return;
            }
        }
        self.flush();
        self.pending = Some((kind, vec![line]));
    }

    fn push_heading(&mut self, level: u8, line: &Line) {
        self.flush();
        self.runs.push(Run {
            kind: Kind::Heading,
            page: self.page,
            text: line.text(),
            heading_level: Some(level),
        });
    }

    fn push_table(&mut self, markdown: String) {
        self.flush();
        self.runs.push(Run {
            kind: Kind::Table,
            page: self.page,
            text: markdown,
            heading_level: None,
        });
    }

    fn push_margin(&mut self, line: Line) {
        let continues = self
            .margin_pending
            .last()
            .is_some_and(|prev| line.y0 - prev.y0 <= self.margin_break);
        if !continues {
            self.flush_margin();
        }
        self.margin_pending.push(line);
    }

    fn flush(&mut self) {
        let Some((kind, lines)) = self.pending.take() else {
            return;
        };
        let text = match kind {
            Kind::Body => render_paragraphs(&lines),
            Kind::Equation => lines.iter().map(Line::text).collect::<Vec<_>>().join("\n"),
            Kind::Diagram => DIAGRAM_PLACEHOLDER.to_string(),
            _ => lines.iter().map(Line::rendered).collect::<Vec<_>>().join("\n"),
        };
        self.runs.push(Run {
            kind,
            page: self.page,
            text,
            heading_level: None,
        });
    }

    fn flush_margin(&mut self) {
        if self.margin_pending.is_empty() {
            return;
        }
        let mut text = String::new();
        for line in self.margin_pending.drain(..) {
            join_wrapped(&mut text, &line.rendered());
        }
        self.margin_runs.push(Run {
            kind: Kind::Margin,
            page: self.page,
            text,
            heading_level: None,
        });
    }

    fn finish(mut self) -> (Vec<Run>, Vec<Run>) {
        self.flush();
        self.flush_margin();
        (self.runs, self.margin_runs)
    }
}

/// Same paragraph and opening in lowercase.
fn continues_sentence(line: &Line) -> bool {
    !line.starts_paragraph && line.text().trim_start().chars().next().is_some_and(char::is_lowercase)
}

fn render_paragraphs(lines: &[Line]) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    for line in lines {
        let rendered = line.rendered();
        match paragraphs.last_mut() {
            Some(current) if !line.starts_paragraph => join_wrapped(current, &rendered),
            _ => paragraphs.push(rendered),
        }
    }
    paragraphs.join("\n\n")
}
