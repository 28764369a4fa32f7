//! Core, I/O-free model for surgical worksheet updates.
//!
//! - [`CellCoord`]/[`CellRange`]: 1-based coordinates and A1 conversion.
//! - [`Grid`]: a read-only snapshot of worksheet cell text and formulas.
//! - [`locate`]: the section locator over a [`Grid`].
//! - [`SectionLayout`]: expands `(job, amount)` pairs into cell updates below an anchor.
//! - [`MergeIndex`] and [`SafeCellWriter`]: merged-cell redirection and formula protection.

mod address;
mod grid;
mod layout;
mod merge;
mod safe_write;
mod section;
mod sheet_name;
mod value;

pub use address::{col_to_name, name_to_col, A1ParseError, CellCoord, CellRange, MAX_COLS, MAX_ROWS};
pub use grid::{Grid, GridCell};
pub use layout::{JobValue, SectionLayout};
pub use merge::MergeIndex;
pub use safe_write::{FormulaCells, PatchResult, PatchTally, SafeCellWriter};
pub use section::{
    locate, normalize, LocatorConfig, SectionAnchor, SectionAnchors, SectionLookup, SectionMarker,
};
pub use sheet_name::{resolve_month_sheet, standard_month_label};
pub use value::{CellUpdate, UpdateValue, ValueKind};
