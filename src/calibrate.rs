//! Printed-to-internal page offset calibration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::meta::LayoutModel;
use crate::text::{PageLabel, TitleKey};
use crate::toc::TocEntry;
use crate::view::{DocumentView, HeadingLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSource {
    /// A contents row whose title appears as a body heading.
    Heading,
    /// The most common difference between metadata pages and printed pages.
    Metadata,
}

/// One printed/internal page pair the offset was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Anchor {
    pub title: String,
    pub printed: u32,
    pub internal: u32,
    pub source: AnchorSource,
}

impl Anchor {
    pub fn offset(&self) -> i64 {
        i64::from(self.internal) - i64::from(self.printed)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calibration {
    pub offset: Option<i64>,
    pub anchor: Option<Anchor>,
    /// Second heading anchor, advisory only.
    pub check: Option<Anchor>,
}

impl Calibration {
    /// Whether the advisory second anchor disagrees with the first.
    pub fn mismatch(&self) -> bool {
        match (&self.anchor, &self.check) {
            (Some(a), Some(b)) => a.offset() != b.offset(),
            _ => false,
        }
    }

    /// Internal page for a printed label. Roman labels are never shifted.
    pub fn apply(&self, label: PageLabel) -> Option<u32> {
        let offset = self.offset?;
        let printed = label.arabic()?;
        u32::try_from(i64::from(printed) + offset).ok().filter(|&p| p > 0)
    }
}

pub struct OffsetCalibrator;

impl OffsetCalibrator {
    pub fn calibrate(entries: &[TocEntry], view: &DocumentView, layout: &LayoutModel) -> Calibration {
        let calibration = Self::from_headings(entries, view);
        if calibration.offset.is_some() {
            return calibration;
        }
        let calibration = Self::from_metadata(entries, layout);
        if calibration.offset.is_none() && !entries.is_empty() {
            log::warn!("no calibration anchor among {} contents rows", entries.len());
        }
        calibration
    }

    fn from_headings(entries: &[TocEntry], view: &DocumentView) -> Calibration {
        let mut anchors = entries.iter().filter_map(|entry| {
            let printed = entry.printed_page?.arabic()?;
            let key = entry.key();
            let heading = view.body_headings().find(|h| same_title(&key, h))?;
            Some(Anchor {
                title: entry.title.clone(),
                printed,
                internal: heading.page?,
                source: AnchorSource::Heading,
            })
        });

        let Some(anchor) = anchors.next() else {
            return Calibration::default();
        };
        let check = anchors.next();
        let calibration = Calibration {
            offset: Some(anchor.offset()),
            anchor: Some(anchor),
            check,
        };
        if calibration.mismatch() {
            log::warn!("second calibration anchor disagrees: {:?}", calibration.check);
        }
        log::info!("page offset {:?} from heading anchor", calibration.offset);
        calibration
    }

    /// Majority vote; ties go to the offset seen first.
    fn from_metadata(entries: &[TocEntry], layout: &LayoutModel) -> Calibration {
        let mut votes: HashMap<i64, usize> = HashMap::new();
        let mut order: Vec<Anchor> = Vec::new();
        for entry in entries {
            let Some(printed) = entry.printed_page.and_then(|p| p.arabic()) else {
                continue;
            };
            let Some(internal) = layout.page_for(&entry.key()) else {
                continue;
            };
            let anchor = Anchor {
                title: entry.title.clone(),
                printed,
                internal,
                source: AnchorSource::Metadata,
            };
            let count = votes.entry(anchor.offset()).or_insert(0);
            if *count == 0 {
                order.push(anchor);
            }
            *count += 1;
        }

        let mut best: Option<(&Anchor, usize)> = None;
        for anchor in &order {
            let count = votes.get(&anchor.offset()).copied().unwrap_or(0);
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((anchor, count));
            }
        }
        match best {
            Some((anchor, count)) => {
                log::info!("page offset {} from {} metadata votes", anchor.offset(), count);
                Calibration {
                    offset: Some(anchor.offset()),
                    anchor: Some(anchor.clone()),
                    check: None,
                }
            }
            None => Calibration::default(),
        }
    }
}

fn same_title(key: &TitleKey, heading: &HeadingLine) -> bool {
    (!key.norm.is_empty() && key.norm == heading.key.norm) || (!key.core.is_empty() && key.core == heading.key.core)
}
