//! Text conventions shared by the emitter and the index resolver.
//!
//! Pages are delimited by `<!-- page N -->` lines (the `{N}----` form used by
//! other converters is accepted on input) and headings by a run of `#`
//! whose length is the heading level.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use bincode::{Decode, Encode};

static PAGE_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:<!--\s*page\s+(\d+)\s*-->|\{(\d+)\}\s*-+)\s*$").expect("valid page marker regex")
});

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").expect("valid heading regex"));

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid html tag regex"));

static SECTION_NUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,3}(?:\.\d{1,3})*)(?:\.|\s|$)").expect("valid section number regex"));

static DIVISION_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(chapter|part|appendix|section)\s+(\d+|[ivxlcdm]+|[a-z])\b\s*")
        .expect("valid division prefix regex")
});

/// Heading text used for the per-page margin subsection.
pub const MARGIN_NOTES_HEADING: &str = "Marginal notes";

/// Placeholder emitted instead of diagram glyph soup.
pub const DIAGRAM_PLACEHOLDER: &str = "*[Diagram]*";

/// Render the page-boundary marker for an internal page number.
pub fn page_marker(page: u32) -> String {
    format!("<!-- page {} -->", page)
}

/// Internal page number carried by a marker line, if the line is one.
pub fn parse_page_marker(line: &str) -> Option<u32> {
    let caps = PAGE_MARKER_RE.captures(line)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

/// Heading level and raw heading text, if the line is a heading.
pub fn parse_heading(line: &str) -> Option<(u8, &str)> {
    let caps = HEADING_RE.captures(line)?;
    let level = caps.get(1)?.as_str().len() as u8;
    let text = caps.get(2)?.as_str();
    Some((level, text))
}

/// Remove HTML tags and emphasis markers, collapsing whitespace.
pub fn strip_markup(text: &str) -> String {
    let no_tags = HTML_TAG_RE.replace_all(text, "");
    let no_emphasis = no_tags.replace("**", "").replace("__", "").replace('*', "");
    no_emphasis.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Leading dotted section number of a title (`"1.2.4 Foo"` → `"1.2.4"`).
pub fn section_number(title: &str) -> Option<String> {
    SECTION_NUM_RE
        .captures(title.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Depth implied by a dotted section number (`"1"` → 1, `"1.2.4"` → 3).
pub fn section_depth(number: &str) -> u8 {
    number.split('.').filter(|p| !p.is_empty()).count().clamp(1, 6) as u8
}

/// Strip a leading section number: `"1.2. Foo bar"` → `"Foo bar"`.
pub fn strip_section_number(title: &str) -> &str {
    let trimmed = title.trim();
    match SECTION_NUM_RE.find(trimmed) {
        Some(m) => trimmed[m.end()..].trim_start_matches(['.', ' ']).trim(),
        None => trimmed,
    }
}

/// Lowercase, punctuation-insensitive form of a title.
///
/// Dots survive only between digits and hyphens only inside words, so
/// section numbers and compound words are kept while separators vanish.
pub fn normalize_title(title: &str) -> String {
    let plain = strip_markup(title).replace('&', " and ");
    let chars: Vec<char> = plain.chars().collect();
    let mut out = String::with_capacity(plain.len());

    for (i, &c) in chars.iter().enumerate() {
        let prev = if i > 0 { chars.get(i - 1).copied() } else { None };
        let next = chars.get(i + 1).copied();
        let keep = match c {
            '.' => {
                prev.is_some_and(|p| p.is_ascii_digit()) && next.is_some_and(|n| n.is_ascii_digit())
            }
            '-' => prev.is_some_and(char::is_alphanumeric) && next.is_some_and(char::is_alphanumeric),
            c => c.is_alphanumeric(),
        };
        if keep {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Pre-normalized comparison key for a section title.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TitleKey {
    /// Full normalized title.
    pub norm: String,
    /// Normalized title without its leading section number.
    pub core: String,
    /// Core without a leading "chapter 3" / "part ii" style prefix.
    pub bare: String,
    /// The stripped prefix as (kind, designator), e.g. ("part", "2").
    pub division: Option<(String, String)>,
    /// Sorted words of `core`, for order-insensitive comparison.
    pub tokens: Vec<String>,
    /// Leading section number, if any.
    pub section: Option<String>,
}

impl TitleKey {
    pub fn new(title: &str) -> Self {
        let plain = strip_markup(title);
        let section = section_number(&plain);
        let norm = normalize_title(&plain);
        let core = normalize_title(strip_section_number(&plain));
        let division = DIVISION_PREFIX_RE.captures(&core).map(|c| {
            let kind = c[1].to_string();
            let designator = division_designator(&kind, &c[2]);
            (kind, designator)
        });
        let bare = DIVISION_PREFIX_RE.replace(&core, "").trim().to_string();
        let mut tokens: Vec<String> = core.split(' ').filter(|t| !t.is_empty()).map(String::from).collect();
        tokens.sort();
        Self {
            norm,
            core,
            bare,
            division,
            tokens,
            section,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.norm.is_empty()
    }

    /// Whether two titles refer to the same section.
    pub fn matches(&self, other: &TitleKey) -> bool {
        if let (Some(a), Some(b)) = (&self.section, &other.section) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (&self.division, &other.division) {
            if a != b {
                return false;
            }
        }
        if !self.core.is_empty() && self.core == other.core {
            return true;
        }
        if !self.norm.is_empty() && self.norm == other.norm {
            return true;
        }
        if !self.bare.is_empty() && self.bare == other.bare {
            return true;
        }
        self.tokens.len() >= 2 && self.tokens == other.tokens
    }
}

/// Designators compare by value, so "part ii" and "part 2" agree.
/// Appendix letters stay letters.
fn division_designator(kind: &str, raw: &str) -> String {
    if kind != "appendix" {
        if let Ok(n) = raw.parse::<u32>() {
            return n.to_string();
        }
        if let Some(n) = roman_to_int(raw) {
            return n.to_string();
        }
    }
    raw.to_string()
}

/// Convert a lowercase or uppercase roman numeral.
pub fn roman_to_int(s: &str) -> Option<u32> {
    let s = s.trim().to_ascii_lowercase();
    if s.is_empty() || s.len() > 8 {
        return None;
    }
    let value = |c: char| match c {
        'i' => Some(1),
        'v' => Some(5),
        'x' => Some(10),
        'l' => Some(50),
        'c' => Some(100),
        'd' => Some(500),
        'm' => Some(1000),
        _ => None,
    };
    let digits: Vec<i64> = s.chars().map(value).collect::<Option<_>>()?;
    let mut acc: i64 = 0;
    for (i, &v) in digits.iter().enumerate() {
        if digits.get(i + 1).is_some_and(|&n| n > v) {
            acc -= v;
        } else {
            acc += v;
        }
    }
    u32::try_from(acc).ok().filter(|&v| v > 0)
}

/// A printed page label from a contents listing.
///
/// Front matter is usually numbered with roman numerals and the main
/// matter with arabic ones; the two are separate lexical classes and only
/// the arabic class is calibrated against internal page numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[serde(tag = "class", content = "value", rename_all = "lowercase")]
pub enum PageLabel {
    Arabic(u32),
    Roman(u32),
}

impl PageLabel {
    /// Parse a page cell: digits are arabic, `ivxlcdm` strings are roman.
    pub fn parse(cell: &str) -> Option<Self> {
        let cell = cell.trim();
        if cell.is_empty() {
            return None;
        }
        if cell.chars().all(|c| c.is_ascii_digit()) {
            return cell.parse().ok().map(PageLabel::Arabic);
        }
        if cell.chars().all(|c| "ivxlcdmIVXLCDM".contains(c)) {
            return roman_to_int(cell).map(PageLabel::Roman);
        }
        None
    }

    pub fn arabic(&self) -> Option<u32> {
        match self {
            PageLabel::Arabic(n) => Some(*n),
            PageLabel::Roman(_) => None,
        }
    }

    pub fn value(&self) -> u32 {
        match self {
            PageLabel::Arabic(n) | PageLabel::Roman(n) => *n,
        }
    }
}

impl fmt::Display for PageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageLabel::Arabic(n) => write!(f, "{}", n),
            PageLabel::Roman(n) => write!(f, "{} (roman)", n),
        }
    }
}

/// Stable identifier for a section: `sec_1_2_4` when numbered, else a slug.
pub fn section_id(title: &str, position: usize) -> String {
    if let Some(num) = section_number(&strip_markup(title)) {
        return format!("sec_{}", num.replace('.', "_"));
    }
    let slug: String = normalize_title(title)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        format!("sec_{:03}", position)
    } else {
        slug.chars().take(30).collect::<String>().trim_end_matches('_').to_string()
    }
}
