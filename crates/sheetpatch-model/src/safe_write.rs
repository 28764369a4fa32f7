//! Write-legality rules, evaluated against an in-memory worksheet model.
//!
//! [`SafeCellWriter`] never touches a package. It redirects merged-cell
//! members to their anchor, refuses to overwrite formulas and collects the
//! accepted writes for the XML patcher. Clearing old section data is stricter:
//! merged members are left alone rather than redirected.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::{CellCoord, CellUpdate, Grid, MergeIndex, UpdateValue};

/// Anything that can answer "does this cell hold a formula?".
pub trait FormulaCells {
    fn is_formula(&self, coord: CellCoord) -> bool;
}

impl FormulaCells for Grid {
    fn is_formula(&self, coord: CellCoord) -> bool {
        Grid::is_formula(self, coord)
    }
}

impl FormulaCells for HashSet<CellCoord> {
    fn is_formula(&self, coord: CellCoord) -> bool {
        self.contains(&coord)
    }
}

impl FormulaCells for BTreeSet<CellCoord> {
    fn is_formula(&self, coord: CellCoord) -> bool {
        self.contains(&coord)
    }
}

/// Outcome of one requested cell write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PatchResult {
    Applied,
    /// The target was a non-anchor merged member; the write went to `anchor`.
    RedirectedToAnchor { anchor: CellCoord },
    /// The (possibly redirected) target holds a formula.
    SkippedFormula,
    /// The section the write belonged to has no anchor in this worksheet.
    SkippedNotFound,
    /// The value cannot be stored in SpreadsheetML (NaN, infinity).
    SkippedInvalidValue,
}

impl PatchResult {
    pub fn is_write(self) -> bool {
        matches!(
            self,
            PatchResult::Applied | PatchResult::RedirectedToAnchor { .. }
        )
    }
}

/// Counts of [`PatchResult`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatchTally {
    pub applied: usize,
    pub redirected: usize,
    pub skipped_formula: usize,
    pub skipped_not_found: usize,
    pub skipped_invalid: usize,
}

impl PatchTally {
    pub fn record(&mut self, result: PatchResult) {
        match result {
            PatchResult::Applied => self.applied += 1,
            PatchResult::RedirectedToAnchor { .. } => self.redirected += 1,
            PatchResult::SkippedFormula => self.skipped_formula += 1,
            PatchResult::SkippedNotFound => self.skipped_not_found += 1,
            PatchResult::SkippedInvalidValue => self.skipped_invalid += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.applied
            + self.redirected
            + self.skipped_formula
            + self.skipped_not_found
            + self.skipped_invalid
    }

    /// Undo one earlier outcome (used when the patcher refuses a staged write).
    pub fn reclassify_as_formula(&mut self, earlier: PatchResult) {
        match earlier {
            PatchResult::Applied => self.applied = self.applied.saturating_sub(1),
            PatchResult::RedirectedToAnchor { .. } => {
                self.redirected = self.redirected.saturating_sub(1)
            }
            _ => return,
        }
        self.skipped_formula += 1;
    }
}

/// Stages legal writes for one worksheet.
///
/// A later write to the same effective target replaces an earlier one.
pub struct SafeCellWriter<'a, F: FormulaCells + ?Sized> {
    formulas: &'a F,
    merges: &'a MergeIndex,
    staged: BTreeMap<CellCoord, UpdateValue>,
}

impl<'a, F: FormulaCells + ?Sized> SafeCellWriter<'a, F> {
    pub fn new(formulas: &'a F, merges: &'a MergeIndex) -> Self {
        Self {
            formulas,
            merges,
            staged: BTreeMap::new(),
        }
    }

    /// Decide where (and whether) `update` may be written, and stage it if legal.
    pub fn stage(&mut self, update: &CellUpdate) -> PatchResult {
        if !update.value.is_representable() {
            log::warn!("refusing unrepresentable value for {}", update.coord);
            return PatchResult::SkippedInvalidValue;
        }

        let target = self.merges.resolve(update.coord);
        if target != update.coord {
            log::debug!("merged cell {} redirected to anchor {target}", update.coord);
        }

        if self.formulas.is_formula(target) {
            log::warn!("skipping formula cell {target}");
            return PatchResult::SkippedFormula;
        }

        self.staged.insert(target, update.value.clone());
        if target == update.coord {
            PatchResult::Applied
        } else {
            PatchResult::RedirectedToAnchor { anchor: target }
        }
    }

    /// Stage an empty value for a stale data cell.
    ///
    /// Returns `false` and stages nothing when `coord` is a non-anchor merged member or
    /// holds a formula. A value already staged for `coord` is kept.
    pub fn clear(&mut self, coord: CellCoord) -> bool {
        if self.merges.owner_of(coord).is_some() || self.formulas.is_formula(coord) {
            return false;
        }
        self.staged.entry(coord).or_insert(UpdateValue::Empty);
        true
    }

    pub fn staged(&self) -> impl Iterator<Item = (CellCoord, &UpdateValue)> {
        self.staged.iter().map(|(coord, value)| (*coord, value))
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Accepted writes keyed by their effective target, row-major.
    pub fn into_writes(self) -> BTreeMap<CellCoord, UpdateValue> {
        self.staged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CellRange, GridCell};

    #[test]
    fn merged_member_is_redirected() {
        let merges = MergeIndex::new([CellRange::from_a1("A5:C5").unwrap()]);
        let grid = Grid::new();
        let mut writer = SafeCellWriter::new(&grid, &merges);

        let result = writer.stage(&CellUpdate::new(CellCoord::new(5, 2), 12345.67));
        assert_eq!(
            result,
            PatchResult::RedirectedToAnchor {
                anchor: CellCoord::new(5, 1)
            }
        );
        let writes = writer.into_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes.get(&CellCoord::new(5, 1)),
            Some(&UpdateValue::Number(12345.67))
        );
    }

    #[test]
    fn formula_cells_are_refused() {
        let mut grid = Grid::new();
        grid.insert(CellCoord::new(3, 5), GridCell::formula("C3*2", None));
        let merges = MergeIndex::default();
        let mut writer = SafeCellWriter::new(&grid, &merges);

        assert_eq!(
            writer.stage(&CellUpdate::new(CellCoord::new(3, 5), 999.0)),
            PatchResult::SkippedFormula
        );
        assert!(writer.is_empty());
    }

    #[test]
    fn redirect_onto_formula_anchor_is_refused() {
        let formulas: HashSet<CellCoord> = [CellCoord::new(2, 1)].into_iter().collect();
        let merges = MergeIndex::new([CellRange::from_a1("A2:B2").unwrap()]);
        let mut writer = SafeCellWriter::new(&formulas, &merges);
        assert_eq!(
            writer.stage(&CellUpdate::new(CellCoord::new(2, 2), "x")),
            PatchResult::SkippedFormula
        );
    }

    #[test]
    fn later_write_to_same_target_wins() {
        let grid = Grid::new();
        let merges = MergeIndex::new([CellRange::from_a1("A1:B1").unwrap()]);
        let mut writer = SafeCellWriter::new(&grid, &merges);
        writer.stage(&CellUpdate::clear(CellCoord::new(1, 1)));
        writer.stage(&CellUpdate::new(CellCoord::new(1, 2), "final"));
        let writes = writer.into_writes();
        assert_eq!(
            writes.get(&CellCoord::new(1, 1)),
            Some(&UpdateValue::text("final"))
        );
    }

    #[test]
    fn clears_skip_merged_members_and_formulas() {
        let mut grid = Grid::new();
        grid.insert(CellCoord::new(2, 5), GridCell::formula("1+1", None));
        grid.insert(CellCoord::new(2, 6), GridCell::text("keep me"));
        let merges = MergeIndex::new([CellRange::from_a1("F2:H2").unwrap()]);
        let mut writer = SafeCellWriter::new(&grid, &merges);

        assert!(writer.clear(CellCoord::new(2, 1)));
        assert!(!writer.clear(CellCoord::new(2, 5)));
        assert!(!writer.clear(CellCoord::new(2, 8)));
        assert!(writer.clear(CellCoord::new(2, 6)));

        let writes = writer.into_writes();
        assert_eq!(
            writes.keys().copied().collect::<Vec<_>>(),
            vec![CellCoord::new(2, 1), CellCoord::new(2, 6)]
        );
    }

    #[test]
    fn clear_does_not_undo_a_staged_write() {
        let grid = Grid::new();
        let merges = MergeIndex::default();
        let mut writer = SafeCellWriter::new(&grid, &merges);
        writer.stage(&CellUpdate::new(CellCoord::new(4, 1), "1001"));
        assert!(writer.clear(CellCoord::new(4, 1)));
        assert_eq!(
            writer.into_writes().get(&CellCoord::new(4, 1)),
            Some(&UpdateValue::text("1001"))
        );
    }

    #[test]
    fn tally_counts_and_reclassifies() {
        let mut tally = PatchTally::default();
        tally.record(PatchResult::Applied);
        tally.record(PatchResult::RedirectedToAnchor {
            anchor: CellCoord::new(1, 1),
        });
        tally.record(PatchResult::SkippedNotFound);
        tally.reclassify_as_formula(PatchResult::Applied);
        assert_eq!(tally.applied, 0);
        assert_eq!(tally.redirected, 1);
        assert_eq!(tally.skipped_formula, 1);
        assert_eq!(tally.skipped_not_found, 1);
        assert_eq!(tally.total(), 3);
    }

    #[test]
    fn nan_is_not_staged() {
        let grid = Grid::new();
        let merges = MergeIndex::default();
        let mut writer = SafeCellWriter::new(&grid, &merges);
        assert_eq!(
            writer.stage(&CellUpdate::new(CellCoord::new(1, 1), f64::NAN)),
            PatchResult::SkippedInvalidValue
        );
        assert!(writer.is_empty());
    }
}
