use std::collections::{BTreeMap, HashMap};

use crate::{CellCoord, CellRange};

/// Ranges spanning more rows than this are checked by containment instead of being
/// indexed row by row.
const MAX_INDEXED_ROWS: u32 = 1024;

/// Lookup from any cell coordinate to the anchor (top-left) of its merged range.
///
/// Each range is recorded once per row it spans, keyed by its first column. Merges do
/// not overlap, so the only candidate for a cell is the range with the greatest first
/// column at or left of it, and [`MergeIndex::owner_of`] is a hash lookup plus one
/// `BTreeMap` probe. Very tall merges (whole-column banners and the like) are kept in a
/// side list; worksheets rarely carry more than a handful of those.
#[derive(Debug, Clone, Default)]
pub struct MergeIndex {
    rows: HashMap<u32, BTreeMap<u32, CellRange>>,
    tall: Vec<CellRange>,
    ranges: Vec<CellRange>,
}

impl MergeIndex {
    pub fn new(ranges: impl IntoIterator<Item = CellRange>) -> Self {
        let mut index = Self::default();
        for range in ranges {
            if range.is_single_cell() {
                continue;
            }
            if range.end.row - range.start.row >= MAX_INDEXED_ROWS {
                index.tall.push(range);
            } else {
                for row in range.start.row..=range.end.row {
                    index
                        .rows
                        .entry(row)
                        .or_default()
                        .entry(range.start.col)
                        .or_insert(range);
                }
            }
            index.ranges.push(range);
        }
        index
    }

    /// The anchor of the merged range `coord` belongs to, when `coord` is a
    /// non-anchor member. Anchors themselves and unmerged cells return `None`.
    pub fn owner_of(&self, coord: CellCoord) -> Option<CellCoord> {
        let range = self
            .rows
            .get(&coord.row)
            .and_then(|cols| cols.range(..=coord.col).next_back())
            .map(|(_, range)| *range)
            .filter(|range| range.contains(coord))
            .or_else(|| self.tall.iter().copied().find(|range| range.contains(coord)))?;
        (range.start != coord).then_some(range.start)
    }

    /// Where a write aimed at `coord` must land.
    pub fn resolve(&self, coord: CellCoord) -> CellCoord {
        self.owner_of(coord).unwrap_or(coord)
    }

    pub fn ranges(&self) -> &[CellRange] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
