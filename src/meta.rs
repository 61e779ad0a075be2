//! Structural metadata and its layout classification.
//!
//! Metadata is an external list of `{title, page_id, polygon}` records,
//! read from the `table_of_contents` array of a `*_meta.json` file. Each
//! record is classified by where its polygon sits on the page. Only
//! [`EntryClass::Section`] records may supply a trusted page number.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::error::{BookIndexError, Result};
use crate::text::{normalize_title, TitleKey};

/// Upper bound of the running-header band when no gap is found.
const DEFAULT_RUNNING_HEADER_Y: f64 = 55.0;
/// Minimum vertical gap separating running headers from the first body entry.
const RUNNING_HEADER_GAP: f64 = 15.0;
/// Titles at least this similar (by containment) count as the same section.
const CONTAINMENT_MIN: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub page_id: Option<u32>,
    /// Corner points, top-left first.
    #[serde(default)]
    pub polygon: Vec<[f64; 2]>,
}

impl MetaEntry {
    fn top_left(&self) -> Option<(f64, f64)> {
        match self.polygon.as_slice() {
            [first, _, ..] => Some((first[0], first[1])),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MetaFile {
    #[serde(default)]
    table_of_contents: Vec<MetaEntry>,
}

/// Read the metadata entries of a `*_meta.json` file.
pub fn load_meta(path: &Path) -> Result<Vec<MetaEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| BookIndexError::io(path, e))?;
    let file: MetaFile = serde_json::from_str(&content)
        .map_err(|e| BookIndexError::InvalidInput(format!("{}: {}", path.display(), e)))?;
    Ok(file.table_of_contents)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryClass {
    Section,
    Margin,
    RunningHeader,
}

#[derive(Debug, Clone)]
pub struct LayoutEntry {
    pub title: String,
    pub page: Option<u32>,
    pub class: EntryClass,
    pub key: TitleKey,
}

/// A margin-classified metadata entry kept for reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Annotation {
    pub title: String,
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct LayoutModel {
    entries: Vec<LayoutEntry>,
    running_header_y_max: f64,
    band: Option<(f64, f64)>,
    by_norm: HashMap<String, u32>,
    by_core: HashMap<String, u32>,
}

impl LayoutModel {
    /// Classify `entries`. Without a known page width, the width is
    /// estimated from the polygon extents.
    pub fn build(entries: Vec<MetaEntry>, page_width: Option<f64>, config: &LayoutConfig) -> Self {
        let running_header_y_max = running_header_band(&entries);

        let width = page_width.filter(|w| w.is_finite() && *w > 0.0).or_else(|| {
            let xs = entries.iter().flat_map(|e| e.polygon.iter().map(|p| p[0]));
            let (min, max) = xs.fold((f64::MAX, f64::MIN), |(lo, hi), x| (lo.min(x), hi.max(x)));
            (max > min).then_some(max + min.max(0.0))
        });
        let band = width.map(|w| (w * config.margin_fraction, w * (1.0 - config.margin_fraction)));

        let mut model = Self {
            entries: Vec::with_capacity(entries.len()),
            running_header_y_max,
            band,
            by_norm: HashMap::new(),
            by_core: HashMap::new(),
        };

        for entry in entries {
            let title = entry.title.split_whitespace().collect::<Vec<_>>().join(" ");
            if title.is_empty() {
                continue;
            }
            let class = model.classify(&entry);
            let key = TitleKey::new(&title);
            if class == EntryClass::Section {
                if let Some(page) = entry.page_id {
                    model.by_norm.entry(key.norm.clone()).or_insert(page);
                    model.by_core.entry(key.core.clone()).or_insert(page);
                }
            }
            model.entries.push(LayoutEntry {
                title,
                page: entry.page_id,
                class,
                key,
            });
        }

        log::debug!(
            "layout model: {} entries, {} sections, header band y <= {}",
            model.entries.len(),
            model.sections().count(),
            model.running_header_y_max
        );
        model
    }

    /// Entries without geometry cannot be refuted and count as sections.
    pub fn classify(&self, entry: &MetaEntry) -> EntryClass {
        let Some((x, y)) = entry.top_left() else {
            return EntryClass::Section;
        };
        if y <= self.running_header_y_max {
            return EntryClass::RunningHeader;
        }
        match self.band {
            Some((left, right)) if x < left || x > right => EntryClass::Margin,
            _ => EntryClass::Section,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LayoutEntry] {
        &self.entries
    }

    pub fn sections(&self) -> impl Iterator<Item = &LayoutEntry> {
        self.entries.iter().filter(|e| e.class == EntryClass::Section)
    }

    /// Page of the Section entry matching `key`: exact normalized title,
    /// then number-stripped title, then best containment above 0.8.
    pub fn page_for(&self, key: &TitleKey) -> Option<u32> {
        if let Some(&page) = self.by_norm.get(&key.norm) {
            return Some(page);
        }
        if !key.core.is_empty() {
            if let Some(&page) = self.by_core.get(&key.core) {
                return Some(page);
            }
        }

        let core = key.core.as_str();
        if core.chars().count() <= 5 {
            return None;
        }
        let mut best: Option<(f64, u32)> = None;
        for entry in self.sections() {
            let (Some(page), other) = (entry.page, entry.key.core.as_str()) else {
                continue;
            };
            if other.chars().count() <= 5 {
                continue;
            }
            let score = if other.contains(core) {
                core.len() as f64 / other.len() as f64
            } else if core.contains(other) {
                other.len() as f64 / core.len() as f64
            } else {
                continue;
            };
            if best.is_none_or(|(s, _)| score > s) {
                best = Some((score, page));
            }
        }
        best.filter(|(s, _)| *s > CONTAINMENT_MIN).map(|(_, p)| p)
    }

    /// Margin entries, normalized, for the index.
    pub fn annotations(&self) -> Vec<Annotation> {
        self.entries
            .iter()
            .filter(|e| e.class == EntryClass::Margin)
            .map(|e| Annotation {
                title: normalize_title(&e.title),
                page: e.page,
            })
            .collect()
    }
}

/// Top-of-page y values under 100 are scanned for the first gap wider than
/// 15pt; its midpoint bounds the running-header band.
fn running_header_band(entries: &[MetaEntry]) -> f64 {
    let mut tops: Vec<f64> = entries
        .iter()
        .filter_map(|e| e.top_left().map(|(_, y)| y))
        .filter(|y| y.is_finite() && *y < 100.0)
        .collect();
    tops.sort_by(f64::total_cmp);
    tops.windows(2)
        .find(|w| w[1] - w[0] > RUNNING_HEADER_GAP)
        .map_or(DEFAULT_RUNNING_HEADER_Y, |w| (w[0] + w[1]) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(title: &str, page: u32, x: f64, y: f64) -> MetaEntry {
        MetaEntry {
            title: title.to_string(),
            page_id: Some(page),
            polygon: vec![[x, y], [x + 200.0, y], [x + 200.0, y + 12.0], [x, y + 12.0]],
        }
    }

    fn model(entries: Vec<MetaEntry>) -> LayoutModel {
        LayoutModel::build(entries, Some(612.0), &LayoutConfig::default())
    }

    #[test]
    fn test_classification() {
        let m = model(vec![
            entry("CHAPTER 2 RUNNING HEAD", 30, 100.0, 30.0),
            entry("Model checking", 31, 100.0, 120.0),
            entry("Exercise 2.1", 31, 20.0, 300.0),
        ]);
        let classes: Vec<EntryClass> = m.entries().iter().map(|e| e.class).collect();
        assert_eq!(classes, vec![EntryClass::RunningHeader, EntryClass::Section, EntryClass::Margin]);
        assert_eq!(
            m.annotations(),
            vec![Annotation {
                title: "exercise 2.1".into(),
                page: Some(31)
            }]
        );
    }

    #[test]
    fn test_running_header_gap_detection() {
        let entries = vec![
            entry("a", 1, 100.0, 40.0),
            entry("b", 1, 100.0, 45.0),
            entry("c", 1, 100.0, 80.0),
        ];
        assert_eq!(running_header_band(&entries), 62.5);
        assert_eq!(running_header_band(&[]), DEFAULT_RUNNING_HEADER_Y);
    }

    #[test]
    fn test_page_lookup_precedence() {
        let m = model(vec![
            entry("1.2 Background", 14, 100.0, 120.0),
            entry("Hierarchical models in practice", 80, 100.0, 120.0),
            entry("Exercise answers", 99, 20.0, 300.0),
        ]);
        assert_eq!(m.page_for(&TitleKey::new("1.2 Background")), Some(14));
        assert_eq!(m.page_for(&TitleKey::new("Background")), Some(14));
        assert_eq!(m.page_for(&TitleKey::new("Hierarchical models in practices")), Some(80));
        // Margin entries are never trusted.
        assert_eq!(m.page_for(&TitleKey::new("Exercise answers")), None);
        assert_eq!(m.page_for(&TitleKey::new("Unknown")), None);
    }

    #[test]
    fn test_entry_without_polygon_is_section() {
        let m = model(vec![MetaEntry {
            title: "Preface".into(),
            page_id: Some(5),
            polygon: vec![],
        }]);
        assert_eq!(m.entries()[0].class, EntryClass::Section);
        assert_eq!(m.page_for(&TitleKey::new("preface")), Some(5));
    }

    #[test]
    fn test_load_meta() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("book_meta.json");
        std::fs::write(
            &path,
            r#"{"table_of_contents": [{"title": "Intro", "page_id": 22, "polygon": [[100, 120], [300, 120]]}]}"#,
        )
        .unwrap();
        let entries = load_meta(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].page_id, Some(22));
        assert_eq!(entries[0].top_left(), Some((100.0, 120.0)));
    }
}
