use pretty_assertions::assert_eq;
use proptest::prelude::*;

use sheetpatch_model::{
    locate, normalize, CellCoord, CellRange, CellUpdate, Grid, GridCell, LocatorConfig, MergeIndex,
    SafeCellWriter, SectionMarker,
};

const WORDS: &[&str] = &[
    "",
    "Job",
    "5040",
    "Sub Labor Cost - 5040",
    "material - 5030",
    "% of Material",
    "Total",
    "1001",
    "notes",
];

fn cell_strategy() -> impl Strategy<Value = (u32, u32, usize)> {
    (1u32..=30, 1u32..=14, 0..WORDS.len())
}

fn markers() -> Vec<SectionMarker> {
    vec![SectionMarker::sub_labor(), SectionMarker::material()]
}

proptest! {
    #[test]
    fn locate_is_independent_of_insertion_order(cells in prop::collection::vec(cell_strategy(), 0..60)) {
        let mut forward = Grid::new();
        for (row, col, word) in &cells {
            forward.insert(CellCoord::new(*row, *col), GridCell::text(WORDS[*word]));
        }
        // Reverse insertion; keep the last write per coordinate identical to the forward grid.
        let mut dedup: std::collections::BTreeMap<CellCoord, usize> = Default::default();
        for (row, col, word) in &cells {
            dedup.insert(CellCoord::new(*row, *col), *word);
        }
        let mut backward = Grid::new();
        for (coord, word) in dedup.iter().rev() {
            backward.insert(*coord, GridCell::text(WORDS[*word]));
        }

        let config = LocatorConfig { max_rows: 20, max_cols: 10 };
        let a = locate(&forward, &markers(), &config);
        let b = locate(&backward, &markers(), &config);
        let c = locate(&forward, &markers(), &config);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(&a, &c);
    }

    #[test]
    fn anchor_is_first_matching_cell_in_reading_order(cells in prop::collection::vec(cell_strategy(), 0..60)) {
        let mut grid = Grid::new();
        for (row, col, word) in &cells {
            grid.insert(CellCoord::new(*row, *col), GridCell::text(WORDS[*word]));
        }
        let config = LocatorConfig::default();
        let marker = SectionMarker::sub_labor();
        let phrases = marker.phrases();
        let expected = grid
            .iter()
            .filter(|(coord, _)| coord.row <= config.max_rows && coord.col <= config.max_cols)
            .find(|(_, cell)| {
                let text = cell.text.as_deref().unwrap_or_default().trim().to_lowercase();
                !text.is_empty() && phrases.iter().any(|p| text.contains(p.as_str()))
            })
            .map(|(coord, _)| coord);

        let anchors = locate(&grid, std::slice::from_ref(&marker), &config);
        prop_assert_eq!(anchors.get("5040").map(|a| a.coord), expected);
    }

    #[test]
    fn writing_any_merged_member_equals_writing_the_anchor(
        top in 1u32..50,
        left in 1u32..20,
        height in 1u32..4,
        width in 1u32..4,
        pick_row in 0u32..4,
        pick_col in 0u32..4,
        value in -1.0e9f64..1.0e9,
    ) {
        let range = CellRange::new(
            CellCoord::new(top, left),
            CellCoord::new(top + height - 1, left + width - 1),
        );
        let member = CellCoord::new(top + pick_row % height, left + pick_col % width);
        let merges = MergeIndex::new([range]);
        let grid = Grid::new();

        let mut via_member = SafeCellWriter::new(&grid, &merges);
        via_member.stage(&CellUpdate::new(member, value));
        let mut via_anchor = SafeCellWriter::new(&grid, &merges);
        via_anchor.stage(&CellUpdate::new(range.start, value));

        prop_assert_eq!(via_member.into_writes(), via_anchor.into_writes());
    }
}

#[test]
fn default_markers_anchor_real_world_header_spellings() {
    let grid = Grid::from_rows([
        vec!["WIP Report - Apr 25"],
        vec![""],
        vec!["", "% of Sub Labor Cost - 5040"],
        vec!["1001", "", "", "", "250"],
        vec![""],
        vec!["Material - 5030"],
    ]);
    let anchors = locate(&grid, &markers(), &LocatorConfig::default());
    assert_eq!(anchors.get("5040").map(|a| a.coord), Some(CellCoord::new(3, 2)));
    assert_eq!(anchors.get("5030").map(|a| a.coord), Some(CellCoord::new(6, 1)));
    assert!(anchors.all_found());
}

#[test]
fn header_text_is_compared_trimmed_and_lowercased() {
    assert_eq!(normalize("  % of Material - 5030 "), "% of material - 5030");
    assert_eq!(normalize("\tSUB LABOR\n"), "sub labor");
}
