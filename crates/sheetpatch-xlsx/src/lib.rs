//! Surgical updates to XLSX/XLSM workbooks.
//!
//! A workbook is treated as a ZIP of opaque parts. Only the worksheet parts that
//! receive writes are re-serialized, and only their touched `<c>` elements change;
//! styles, defined names, pivot caches, VBA projects and every other part are copied
//! through byte-for-byte.
//!
//! The entry point is [`Updater`]: it locates each requested section in its worksheet,
//! stages writes through the merge/formula rules in `sheetpatch-model`, backs up the
//! original, patches, re-opens the result to verify it, and either commits or rolls
//! back.

mod config;
mod error;
pub mod openxml;
mod package;
mod patch;
mod read;
mod shared_strings;
mod update;
mod workbook;
mod zip_util;

pub use config::{MissingSectionPolicy, UpdateConfig};
pub use error::XlsxError;
pub use package::{XlsxPackage, XlsxPackageLimits};
pub use patch::{
    apply_cell_patches, patch_worksheet_xml, PatchOutcome, SheetPatchFailure, SheetPatchReport,
    WorkbookCellPatches, WorksheetCellPatches, WorksheetPatchStats,
};
pub use read::{read_worksheet, WorksheetSnapshot};
pub use shared_strings::{load_shared_strings, parse_shared_strings};
pub use update::{
    verify_patched, SectionReport, SheetFailure, SheetRequest, UpdateOutcome, UpdateRequest,
    UpdateState, UpdateSummary, Updater,
};
pub use workbook::{
    parse_workbook_sheets, sheet_names, workbook_part_name, workbook_sheets, worksheet_part,
    WorkbookSheetInfo,
};

pub use sheetpatch_model as model;

/// Read a worksheet by name: its part name plus a snapshot of text, formulas and merges.
pub fn read_sheet(
    package: &XlsxPackage,
    sheet_name: &str,
) -> Result<(String, WorksheetSnapshot), XlsxError> {
    let part = worksheet_part(package, sheet_name)?;
    let xml = package
        .part(&part)
        .ok_or_else(|| XlsxError::MissingPart(part.clone()))?;
    let shared_strings = load_shared_strings(package)?;
    let snapshot = read_worksheet(xml, &shared_strings)?;
    Ok((part, snapshot))
}
