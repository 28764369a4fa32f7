use std::collections::BTreeMap;

use crate::CellCoord;

/// Snapshot of one materialized cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridCell {
    /// Displayed text: the shared/inline string, or the raw cached value for other types.
    pub text: Option<String>,
    /// Formula text when the cell has an `<f>` element. Shared-formula followers carry an
    /// empty string.
    pub formula: Option<String>,
}

impl GridCell {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            formula: None,
        }
    }

    pub fn formula(formula: impl Into<String>, cached: Option<String>) -> Self {
        Self {
            text: cached,
            formula: Some(formula.into()),
        }
    }

    pub fn is_formula(&self) -> bool {
        self.formula.is_some()
    }
}

/// Read-only worksheet snapshot keyed by coordinate, iterated in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    cells: BTreeMap<CellCoord, GridCell>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a grid of plain text values; `rows[0][0]` lands at `A1`. Empty strings are skipped.
    pub fn from_rows<R, S>(rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut grid = Self::new();
        for (r, row) in rows.into_iter().enumerate() {
            for (c, value) in row.into_iter().enumerate() {
                let value = value.as_ref();
                if value.is_empty() {
                    continue;
                }
                grid.insert(
                    CellCoord::new(r as u32 + 1, c as u32 + 1),
                    GridCell::text(value),
                );
            }
        }
        grid
    }

    pub fn insert(&mut self, coord: CellCoord, cell: GridCell) {
        self.cells.insert(coord, cell);
    }

    pub fn get(&self, coord: CellCoord) -> Option<&GridCell> {
        self.cells.get(&coord)
    }

    pub fn text(&self, coord: CellCoord) -> Option<&str> {
        self.cells.get(&coord).and_then(|c| c.text.as_deref())
    }

    pub fn is_formula(&self, coord: CellCoord) -> bool {
        self.cells.get(&coord).is_some_and(GridCell::is_formula)
    }

    pub fn formula_cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.is_formula())
            .map(|(coord, _)| *coord)
    }

    /// Cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, &GridCell)> {
        self.cells.iter().map(|(coord, cell)| (*coord, cell))
    }

    /// Cells whose row is `<= max_row`, in row-major order.
    pub fn iter_rows_through(&self, max_row: u32) -> impl Iterator<Item = (CellCoord, &GridCell)> {
        self.cells
            .range(..=CellCoord::new(max_row, u32::MAX))
            .map(|(coord, cell)| (*coord, cell))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_places_values_one_based() {
        let grid = Grid::from_rows([vec!["", "Header"], vec!["1001", ""]]);
        assert_eq!(grid.len(), 2);
        assert_eq!(grid.text(CellCoord::new(1, 2)), Some("Header"));
        assert_eq!(grid.text(CellCoord::new(2, 1)), Some("1001"));
        assert_eq!(grid.text(CellCoord::new(1, 1)), None);
    }

    #[test]
    fn iter_rows_through_is_bounded_and_ordered() {
        let mut grid = Grid::new();
        grid.insert(CellCoord::new(3, 1), GridCell::text("c"));
        grid.insert(CellCoord::new(1, 9), GridCell::text("b"));
        grid.insert(CellCoord::new(1, 2), GridCell::text("a"));
        let seen: Vec<_> = grid
            .iter_rows_through(2)
            .map(|(coord, _)| coord.to_a1())
            .collect();
        assert_eq!(seen, vec!["B1", "I1"]);
    }

    #[test]
    fn formula_cells_are_tracked() {
        let mut grid = Grid::new();
        grid.insert(CellCoord::new(4, 5), GridCell::formula("SUM(E1:E3)", Some("6".into())));
        grid.insert(CellCoord::new(4, 6), GridCell::text("x"));
        assert!(grid.is_formula(CellCoord::new(4, 5)));
        assert!(!grid.is_formula(CellCoord::new(4, 6)));
        assert_eq!(grid.formula_cells().collect::<Vec<_>>(), vec![CellCoord::new(4, 5)]);
    }
}
