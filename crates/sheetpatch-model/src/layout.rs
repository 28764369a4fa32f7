use serde::{Deserialize, Serialize};

use crate::{CellCoord, CellUpdate, Grid, UpdateValue, MAX_ROWS};

/// One aggregated `(job identifier, amount)` pair destined for a section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobValue {
    pub job: String,
    pub value: f64,
}

impl JobValue {
    pub fn new(job: impl Into<String>, value: f64) -> Self {
        Self {
            job: job.into(),
            value,
        }
    }
}

/// Where a section's data lives relative to its anchor row.
///
/// Columns are 1-based. Data rows start on the row after the anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionLayout {
    pub job_col: u32,
    pub amount_col: u32,
    /// Columns blanked on every stale data row, in addition to `job_col`.
    pub clear_cols: Vec<u32>,
    /// Upper bound on data rows inspected when clearing.
    pub max_rows: u32,
    /// Clearing stops after this many consecutive rows with a blank job cell.
    pub stop_after_empty_rows: u32,
}

impl Default for SectionLayout {
    fn default() -> Self {
        Self {
            job_col: 1,
            amount_col: 2,
            clear_cols: Vec::new(),
            max_rows: 200,
            stop_after_empty_rows: 3,
        }
    }
}

impl SectionLayout {
    /// Job in A, amount in E; C, D, E and H carry per-job data.
    pub fn sub_labor() -> Self {
        Self {
            job_col: 1,
            amount_col: 5,
            clear_cols: vec![3, 4, 5, 8],
            ..Self::default()
        }
    }

    /// Job in A, amount in C; B and C carry per-job data.
    pub fn material() -> Self {
        Self {
            job_col: 1,
            amount_col: 3,
            clear_cols: vec![2, 3],
            ..Self::default()
        }
    }

    /// Rows below `anchor_row` whose job cell currently holds text.
    pub fn stale_rows(&self, grid: &Grid, anchor_row: u32) -> Vec<u32> {
        let mut rows = Vec::new();
        let mut empty_run = 0u32;
        for offset in 1..=self.max_rows {
            let Some(row) = anchor_row.checked_add(offset).filter(|row| *row <= MAX_ROWS) else {
                break;
            };
            let occupied = grid
                .text(CellCoord::new(row, self.job_col))
                .is_some_and(|t| !t.trim().is_empty());
            if occupied {
                rows.push(row);
                empty_run = 0;
            } else {
                empty_run += 1;
                if empty_run >= self.stop_after_empty_rows {
                    break;
                }
            }
        }
        rows
    }

    /// Empty-value updates for every stale data row.
    pub fn clear_updates(&self, grid: &Grid, anchor_row: u32) -> Vec<CellUpdate> {
        let mut cols = vec![self.job_col];
        for col in &self.clear_cols {
            if !cols.contains(col) {
                cols.push(*col);
            }
        }
        self.stale_rows(grid, anchor_row)
            .into_iter()
            .flat_map(|row| {
                cols.iter()
                    .map(move |col| CellUpdate::clear(CellCoord::new(row, *col)))
            })
            .collect()
    }

    /// The job id (text) and amount (number) for the i-th job land on `anchor_row + 1 + i`.
    ///
    /// Jobs that would fall below the last worksheet row produce no updates; see
    /// [`SectionLayout::overflow_jobs`].
    pub fn write_updates(&self, anchor_row: u32, jobs: &[JobValue]) -> Vec<CellUpdate> {
        let mut out = Vec::with_capacity(jobs.len() * 2);
        let first = anchor_row.saturating_add(1);
        for (row, job) in (first..=MAX_ROWS).zip(jobs) {
            out.push(CellUpdate::new(
                CellCoord::new(row, self.job_col),
                UpdateValue::Text(job.job.trim().to_string()),
            ));
            out.push(CellUpdate::new(
                CellCoord::new(row, self.amount_col),
                UpdateValue::Number(job.value),
            ));
        }
        out
    }

    /// Number of trailing jobs with no worksheet row left below `anchor_row`.
    pub fn overflow_jobs(&self, anchor_row: u32, jobs: usize) -> usize {
        let available = MAX_ROWS.saturating_sub(anchor_row) as usize;
        jobs.saturating_sub(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn writes_start_below_anchor() {
        let layout = SectionLayout::sub_labor();
        let updates = layout.write_updates(
            4,
            &[JobValue::new(" 1001 ", 250.5), JobValue::new("1002", 10.0)],
        );
        assert_eq!(
            updates,
            vec![
                CellUpdate::new(CellCoord::new(5, 1), "1001"),
                CellUpdate::new(CellCoord::new(5, 5), 250.5),
                CellUpdate::new(CellCoord::new(6, 1), "1002"),
                CellUpdate::new(CellCoord::new(6, 5), 10.0),
            ]
        );
    }

    #[test]
    fn writes_stop_at_the_last_worksheet_row() {
        let layout = SectionLayout::material();
        let jobs = [
            JobValue::new("1", 1.0),
            JobValue::new("2", 2.0),
            JobValue::new("3", 3.0),
        ];
        let updates = layout.write_updates(MAX_ROWS - 2, &jobs);
        let rows: Vec<u32> = updates.iter().map(|u| u.coord.row).collect();
        assert_eq!(rows, vec![MAX_ROWS - 1, MAX_ROWS - 1, MAX_ROWS, MAX_ROWS]);
        assert_eq!(layout.overflow_jobs(MAX_ROWS - 2, jobs.len()), 1);
        assert_eq!(layout.overflow_jobs(4, jobs.len()), 0);
        assert!(layout.write_updates(MAX_ROWS, &jobs).is_empty());
    }

    #[test]
    fn stale_rows_stop_after_three_blank_job_cells() {
        let grid = Grid::from_rows([
            vec!["Material - 5030"],
            vec!["Job A"],
            vec![""],
            vec!["Job B"],
            vec![""],
            vec![""],
            vec![""],
            vec!["Unrelated footer"],
        ]);
        let layout = SectionLayout::material();
        assert_eq!(layout.stale_rows(&grid, 1), vec![2, 4]);
    }

    #[test]
    fn clear_updates_cover_job_and_data_columns() {
        let grid = Grid::from_rows([vec!["5030"], vec!["Job A"]]);
        let layout = SectionLayout::material();
        let coords: Vec<String> = layout
            .clear_updates(&grid, 1)
            .into_iter()
            .map(|u| {
                assert_eq!(u.value, UpdateValue::Empty);
                u.coord.to_a1()
            })
            .collect();
        assert_eq!(coords, vec!["A2", "B2", "C2"]);
    }
}
