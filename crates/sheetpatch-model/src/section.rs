//! Section locator.
//!
//! Monthly copies of the same workbook drift: header text gets reworded
//! (`"5040"`, `"Sub Labor Cost - 5040"`, `"% of Sub Labor Cost"`) and sections
//! move up or down by a few rows. A [`SectionMarker`] lists every accepted
//! spelling of a section header; [`locate`] scans a bounded window of the grid
//! in reading order and anchors each marker on the first cell that contains
//! any of its phrases.
//!
//! Resolution is first-match-wins in row-major order, not best-match: a short
//! code appearing above the real header will win. Changing that rule changes
//! which cells get updated, so it is kept as-is.

use serde::{Deserialize, Serialize};

use crate::{CellCoord, Grid};

/// A logical section plus the header text variants that identify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionMarker {
    /// Section identifier used to key updates and results (e.g. `"5040"`).
    pub id: String,
    /// Primary short code, tried first.
    pub code: String,
    /// Descriptive fallbacks. Tried after the code, longest first.
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl SectionMarker {
    /// A marker whose id and short code are the same string.
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            id: code.clone(),
            code,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, phrase: impl Into<String>) -> Self {
        self.fallbacks.push(phrase.into());
        self
    }

    /// Sub labor cost section (account 5040).
    pub fn sub_labor() -> Self {
        Self::new("5040")
            .with_fallback("% of sub labor cost - 5040")
            .with_fallback("sub labor cost - 5040")
            .with_fallback("% of sub labor cost")
            .with_fallback("sub labor cost")
    }

    /// Material section (account 5030).
    pub fn material() -> Self {
        Self::new("5030")
            .with_fallback("% of material - 5030")
            .with_fallback("material - 5030")
            .with_fallback("% of material")
    }

    /// Normalized phrases in match order: the code, then fallbacks by descending length.
    ///
    /// The sort is stable, so equally long fallbacks keep their configured order.
    pub fn phrases(&self) -> Vec<String> {
        let mut fallbacks: Vec<String> = self
            .fallbacks
            .iter()
            .map(|p| normalize(p))
            .filter(|p| !p.is_empty())
            .collect();
        fallbacks.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()));

        let mut out = Vec::with_capacity(fallbacks.len() + 1);
        let code = normalize(&self.code);
        if !code.is_empty() {
            out.push(code);
        }
        for phrase in fallbacks {
            if !out.contains(&phrase) {
                out.push(phrase);
            }
        }
        out
    }
}

/// Scan window for [`locate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Rows `1..=max_rows` are scanned.
    pub max_rows: u32,
    /// Columns `1..=max_cols` are scanned in each row.
    pub max_cols: u32,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            max_rows: 100,
            max_cols: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionAnchor {
    pub coord: CellCoord,
    /// The normalized phrase that matched.
    pub phrase: String,
    /// The original cell text.
    pub cell_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionLookup {
    pub section: String,
    pub anchor: Option<SectionAnchor>,
}

/// Per-marker results, in the same order as the markers passed to [`locate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionAnchors {
    lookups: Vec<SectionLookup>,
}

impl SectionAnchors {
    pub fn get(&self, section: &str) -> Option<&SectionAnchor> {
        self.lookups
            .iter()
            .find(|l| l.section == section)
            .and_then(|l| l.anchor.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SectionLookup> {
        self.lookups.iter()
    }

    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.lookups
            .iter()
            .filter(|l| l.anchor.is_none())
            .map(|l| l.section.as_str())
    }

    pub fn all_found(&self) -> bool {
        self.lookups.iter().all(|l| l.anchor.is_some())
    }
}

/// Trimmed, lowercased cell text used for containment tests.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Find the first anchor for every marker.
///
/// Never fails: a marker with no match is reported with `anchor: None`.
pub fn locate(grid: &Grid, markers: &[SectionMarker], config: &LocatorConfig) -> SectionAnchors {
    let phrase_lists: Vec<Vec<String>> = markers.iter().map(SectionMarker::phrases).collect();
    let mut found: Vec<Option<SectionAnchor>> = vec![None; markers.len()];
    let mut remaining = markers.len();

    for (coord, cell) in grid.iter_rows_through(config.max_rows) {
        if remaining == 0 {
            break;
        }
        if coord.col > config.max_cols {
            continue;
        }
        let Some(raw) = cell.text.as_deref() else {
            continue;
        };
        let text = normalize(raw);
        if text.is_empty() {
            continue;
        }

        for (idx, phrases) in phrase_lists.iter().enumerate() {
            if found[idx].is_some() {
                continue;
            }
            if let Some(phrase) = phrases.iter().find(|p| text.contains(p.as_str())) {
                log::debug!(
                    "section {} anchored at {coord} by {phrase:?} ({raw:?})",
                    markers[idx].id
                );
                found[idx] = Some(SectionAnchor {
                    coord,
                    phrase: phrase.clone(),
                    cell_text: raw.to_string(),
                });
                remaining -= 1;
            }
        }
    }

    SectionAnchors {
        lookups: markers
            .iter()
            .zip(found)
            .map(|(marker, anchor)| SectionLookup {
                section: marker.id.clone(),
                anchor,
            })
            .collect(),
    }
}
