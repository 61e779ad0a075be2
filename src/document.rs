//! Input model: positioned text fragments grouped by page.
//!
//! Rendering and font parsing happen upstream. This crate receives every
//! page as a flat list of fragments with bounding boxes and font sizes,
//! plus the rectangles of any images on the page.

use crate::error::{BookIndexError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// An axis-aligned box in page coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x0 <= x && x <= self.x1 && self.y0 <= y && y <= self.y1
    }

    /// True when every coordinate is finite and the box has a positive area.
    pub fn is_well_formed(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 > self.x0
            && self.y1 > self.y0
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// One positioned piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub text: String,
    pub bbox: BBox,
    pub font_size: f64,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
}

impl Fragment {
    pub fn new(text: impl Into<String>, bbox: BBox, font_size: f64) -> Self {
        Self {
            text: text.into(),
            bbox,
            font_size,
            bold: false,
            italic: false,
        }
    }

    /// Reason this fragment cannot be laid out, if any.
    pub fn defect(&self) -> Option<&'static str> {
        if !self.bbox.is_well_formed() {
            Some("malformed bounding box")
        } else if !self.font_size.is_finite() || self.font_size <= 0.0 {
            Some("invalid font size")
        } else {
            None
        }
    }
}

/// All fragments of a single page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePage {
    /// 1-indexed internal page number.
    pub number: u32,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default)]
    pub fragments: Vec<Fragment>,
    /// Image rectangles; fragments centred inside them are figure labels.
    #[serde(default)]
    pub image_boxes: Vec<BBox>,
}

impl SourcePage {
    pub fn new(number: u32, fragments: Vec<Fragment>) -> Self {
        Self {
            number,
            fragments,
            ..Default::default()
        }
    }

    /// Page width, falling back to the right edge of the widest fragment.
    pub fn effective_width(&self) -> f64 {
        match self.width {
            Some(w) if w.is_finite() && w > 0.0 => w,
            _ => self
                .fragments
                .iter()
                .map(|f| f.bbox.x1)
                .filter(|x| x.is_finite())
                .fold(0.0, f64::max),
        }
    }
}

/// A page-structured document ready for layout analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Document name/title.
    pub name: String,
    /// Original file path (if loaded from file).
    #[serde(skip)]
    pub path: Option<PathBuf>,
    /// Pages in document order.
    pub pages: Vec<SourcePage>,
}

impl SourceDocument {
    /// Create a new document with given name and pages.
    pub fn new(name: impl Into<String>, pages: Vec<SourcePage>) -> Self {
        Self {
            name: name.into(),
            path: None,
            pages,
        }
    }

    /// Load a fragments JSON file (`{"name": ..., "pages": [...]}`).
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BookIndexError::DocumentNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| BookIndexError::io(path, e))?;

        let mut doc: SourceDocument = serde_json::from_str(&content)
            .map_err(|e| BookIndexError::InvalidInput(format!("{}: {}", path.display(), e)))?;

        if doc.name.trim().is_empty() {
            doc.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string();
        }
        doc.path = Some(path.to_path_buf());
        doc.normalize_page_numbers();

        Ok(doc)
    }

    /// Number pages 1..=n when the input left them at zero, and sort them.
    fn normalize_page_numbers(&mut self) {
        if self.pages.iter().all(|p| p.number == 0) {
            for (i, page) in self.pages.iter_mut().enumerate() {
                page.number = i as u32 + 1;
            }
        }
        self.pages.sort_by_key(|p| p.number);
    }

    /// Get total number of pages.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Total number of fragments across all pages.
    pub fn fragment_count(&self) -> usize {
        self.pages.iter().map(|p| p.fragments.len()).sum()
    }

    /// Widest declared page width, if any page declares one.
    pub fn page_width(&self) -> Option<f64> {
        self.pages
            .iter()
            .filter_map(|p| p.width)
            .filter(|w| w.is_finite() && *w > 0.0)
            .reduce(f64::max)
    }
}

/// Derive a filesystem-safe slug from a document name.
pub fn slug_from_name(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
            last_dash = false;
        } else if (c.is_whitespace() || c == '-' || c == '_') && !last_dash && !slug.is_empty() {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "book".to_string()
    } else {
        slug
    }
}
