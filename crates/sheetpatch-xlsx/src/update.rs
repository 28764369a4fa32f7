//! Safe-update orchestrator.
//!
//! One run walks `Idle -> BackedUp -> Patched -> Verified -> Committed`. Anything that
//! goes wrong after the backup lands in `Failed -> RolledBack`, and the caller gets the
//! original bytes back together with the reason. Failures before the backup (corrupt
//! archive, unknown sheet, an aborting missing section) are returned as errors and
//! nothing is written anywhere.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sheetpatch_fs::{atomic_write_bytes, BackupStore};
use sheetpatch_model::{
    locate, resolve_month_sheet, CellCoord, CellUpdate, JobValue, PatchResult, PatchTally,
    SafeCellWriter, SectionAnchor,
};

use crate::config::{MissingSectionPolicy, UpdateConfig};
use crate::patch::{apply_cell_patches, WorkbookCellPatches, WorksheetCellPatches};
use crate::read::read_worksheet;
use crate::shared_strings::load_shared_strings;
use crate::workbook::worksheet_part;
use crate::zip_util::part_name_key;
use crate::{XlsxError, XlsxPackage};

/// Section data for one worksheet: section id -> ordered `(job, amount)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetRequest {
    pub sheet: String,
    pub sections: BTreeMap<String, Vec<JobValue>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    /// File name the backup is named after.
    pub source_name: String,
    pub sheets: Vec<SheetRequest>,
}

impl UpdateRequest {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            sheets: Vec::new(),
        }
    }

    pub fn with_section(
        mut self,
        sheet: &str,
        section: impl Into<String>,
        jobs: Vec<JobValue>,
    ) -> Self {
        let index = match self.sheets.iter().position(|s| s.sheet == sheet) {
            Some(index) => index,
            None => {
                self.sheets.push(SheetRequest {
                    sheet: sheet.to_string(),
                    sections: BTreeMap::new(),
                });
                self.sheets.len() - 1
            }
        };
        self.sheets[index].sections.insert(section.into(), jobs);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateState {
    Idle,
    BackedUp,
    Patched,
    Verified,
    Committed,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport {
    pub sheet: String,
    pub section: String,
    pub anchor: Option<SectionAnchor>,
    pub jobs: usize,
    /// Previous-period rows blanked under the anchor.
    pub cleared_rows: usize,
    /// Cells emptied on those rows; merged members and formulas are left alone.
    pub cleared_cells: usize,
}

/// A worksheet that was skipped because its XML could not be read or patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetFailure {
    pub sheet: String,
    pub part: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateSummary {
    pub sections: Vec<SectionReport>,
    pub cells: PatchTally,
    pub sheet_failures: Vec<SheetFailure>,
    /// Where the pre-mutation copy was stored.
    pub backup: Option<String>,
    pub input_bytes: usize,
    pub output_bytes: usize,
    pub byte_delta: i64,
    /// The output is smaller than the input by more than the configured ratio.
    pub suspicious_shrink: bool,
    pub transitions: Vec<UpdateState>,
}

impl UpdateSummary {
    fn new(input_bytes: usize) -> Self {
        Self {
            sections: Vec::new(),
            cells: PatchTally::default(),
            sheet_failures: Vec::new(),
            backup: None,
            input_bytes,
            output_bytes: input_bytes,
            byte_delta: 0,
            suspicious_shrink: false,
            transitions: vec![UpdateState::Idle],
        }
    }

    fn enter(&mut self, state: UpdateState) {
        log::debug!("update state -> {state:?}");
        self.transitions.push(state);
    }

    fn record_sizes(&mut self, output_bytes: usize, shrink_warn_ratio: f64) {
        self.output_bytes = output_bytes;
        self.byte_delta = output_bytes as i64 - self.input_bytes as i64;
        let shrink = self.input_bytes.saturating_sub(output_bytes) as f64;
        self.suspicious_shrink = shrink > self.input_bytes as f64 * shrink_warn_ratio;
        if self.suspicious_shrink {
            log::warn!(
                "patched workbook shrank from {} to {} bytes",
                self.input_bytes,
                output_bytes
            );
        }
    }
}

#[derive(Debug)]
pub struct UpdateOutcome {
    /// `Committed` or `RolledBack`.
    pub state: UpdateState,
    /// The patched document when committed, the original bytes when rolled back.
    pub bytes: Vec<u8>,
    pub summary: UpdateSummary,
    pub failure: Option<XlsxError>,
}

impl UpdateOutcome {
    pub fn is_committed(&self) -> bool {
        self.state == UpdateState::Committed
    }

    /// Committed, but at least one worksheet was left untouched.
    pub fn is_partial(&self) -> bool {
        self.is_committed() && !self.summary.sheet_failures.is_empty()
    }
}

/// Writes planned for one worksheet.
struct SheetPlan {
    sheet: String,
    part: String,
    /// Last staged outcome per effective target, used to reclassify patcher refusals.
    results: BTreeMap<CellCoord, PatchResult>,
}

pub struct Updater<B> {
    config: UpdateConfig,
    backups: B,
}

impl<B: BackupStore> Updater<B> {
    pub fn new(config: UpdateConfig, backups: B) -> Self {
        Self { config, backups }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    /// Run an update over in-memory workbook bytes.
    pub fn run(&self, original: &[u8], request: &UpdateRequest) -> Result<UpdateOutcome, XlsxError> {
        let mut summary = UpdateSummary::new(original.len());
        let mut pkg = XlsxPackage::from_bytes(original)?;
        let (patches, plans) = self.plan(&pkg, request, &mut summary)?;

        let backup = self
            .backups
            .store(&request.source_name, original)
            .map_err(XlsxError::Backup)?;
        log::info!("backed up {} to {}", request.source_name, backup.location);
        summary.backup = Some(backup.location);
        summary.enter(UpdateState::BackedUp);

        let baseline = pkg.clone();
        match self.patch_and_verify(&mut pkg, &baseline, &patches, &plans, &mut summary) {
            Ok(bytes) => {
                summary.record_sizes(bytes.len(), self.config.shrink_warn_ratio);
                summary.enter(UpdateState::Committed);
                log::info!(
                    "committed {}: {} applied, {} redirected, {} formula skipped, {} not found ({:+} bytes)",
                    request.source_name,
                    summary.cells.applied,
                    summary.cells.redirected,
                    summary.cells.skipped_formula,
                    summary.cells.skipped_not_found,
                    summary.byte_delta
                );
                Ok(UpdateOutcome {
                    state: UpdateState::Committed,
                    bytes,
                    summary,
                    failure: None,
                })
            }
            Err(err) => {
                log::error!("rolling back {}: {err}", request.source_name);
                summary.enter(UpdateState::Failed);
                summary.enter(UpdateState::RolledBack);
                Ok(UpdateOutcome {
                    state: UpdateState::RolledBack,
                    bytes: original.to_vec(),
                    summary,
                    failure: Some(err),
                })
            }
        }
    }

    /// Read `source`, update it, and atomically write the result to `destination` when
    /// the run commits. A rolled-back run writes nothing.
    pub fn run_file(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        request: &UpdateRequest,
    ) -> Result<UpdateOutcome, XlsxError> {
        let original = std::fs::read(source.as_ref())?;
        let outcome = self.run(&original, request)?;
        if outcome.is_committed() {
            atomic_write_bytes(destination.as_ref(), &outcome.bytes)?;
        }
        Ok(outcome)
    }

    fn resolve_sheet(&self, pkg: &XlsxPackage, requested: &str) -> Result<(String, String), XlsxError> {
        match worksheet_part(pkg, requested) {
            Ok(part) => Ok((requested.to_string(), part)),
            Err(XlsxError::SheetNotFound { sheet, available }) if self.config.resolve_month_tabs => {
                let name = resolve_month_sheet(available.iter().map(String::as_str), requested)
                    .map(str::to_string)
                    .ok_or(XlsxError::SheetNotFound { sheet, available })?;
                log::info!("resolved sheet {requested:?} to {name:?}");
                let part = worksheet_part(pkg, &name)?;
                Ok((name, part))
            }
            Err(err) => Err(err),
        }
    }

    /// Locate sections and stage every write. Nothing here mutates the package.
    fn plan(
        &self,
        pkg: &XlsxPackage,
        request: &UpdateRequest,
        summary: &mut UpdateSummary,
    ) -> Result<(WorkbookCellPatches, Vec<SheetPlan>), XlsxError> {
        // Resolve every sheet first so an unknown name fails before any work.
        let mut grouped: BTreeMap<(String, String), BTreeMap<&str, &[JobValue]>> = BTreeMap::new();
        for sheet_request in &request.sheets {
            let key = self.resolve_sheet(pkg, &sheet_request.sheet)?;
            let sections = grouped.entry(key).or_default();
            for (section, jobs) in &sheet_request.sections {
                sections.insert(section.as_str(), jobs.as_slice());
            }
        }

        let shared_strings = load_shared_strings(pkg)?;
        let mut patches = WorkbookCellPatches::new();
        let mut plans = Vec::new();
        for ((sheet, part), sections) in grouped {
            let xml = pkg
                .part(&part)
                .ok_or_else(|| XlsxError::MissingPart(part.clone()))?;
            let snapshot = match read_worksheet(xml, &shared_strings) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    let failure = XlsxError::PatchParseFailure {
                        part: part.clone(),
                        message: err.to_string(),
                    };
                    log::warn!("skipping worksheet {sheet:?}: {failure}");
                    for (section, jobs) in &sections {
                        summary.sections.push(SectionReport {
                            sheet: sheet.clone(),
                            section: section.to_string(),
                            anchor: None,
                            jobs: jobs.len(),
                            cleared_rows: 0,
                            cleared_cells: 0,
                        });
                    }
                    summary.sheet_failures.push(SheetFailure {
                        sheet,
                        part,
                        reason: failure.to_string(),
                    });
                    continue;
                }
            };

            let markers: Vec<_> = sections.keys().map(|id| self.config.marker(id)).collect();
            let anchors = locate(&snapshot.grid, &markers, &self.config.locator);
            let merges = snapshot.merge_index();
            let mut writer = SafeCellWriter::new(&snapshot.grid, &merges);
            let mut results = BTreeMap::new();

            for (section, jobs) in sections {
                let layout = self.config.layout(section)?;
                let Some(anchor) = anchors.get(section) else {
                    if self.config.missing_section == MissingSectionPolicy::Abort {
                        return Err(XlsxError::SectionNotFound {
                            sheet,
                            section: section.to_string(),
                        });
                    }
                    log::warn!(
                        "section {section} not found in {sheet:?}; skipping {} jobs",
                        jobs.len()
                    );
                    for _ in layout.write_updates(1, jobs) {
                        summary.cells.record(PatchResult::SkippedNotFound);
                    }
                    summary.sections.push(SectionReport {
                        sheet: sheet.clone(),
                        section: section.to_string(),
                        anchor: None,
                        jobs: jobs.len(),
                        cleared_rows: 0,
                        cleared_cells: 0,
                    });
                    continue;
                };

                log::debug!(
                    "section {section} anchored at {} in {sheet:?} (matched {:?})",
                    anchor.coord,
                    anchor.phrase
                );
                let anchor_row = anchor.coord.row;
                let (mut cleared_rows, mut cleared_cells) = (0, 0);
                if self.config.clear_stale_rows {
                    cleared_rows = layout.stale_rows(&snapshot.grid, anchor_row).len();
                    // Clears are not update records: they never redirect and are not tallied.
                    for update in layout.clear_updates(&snapshot.grid, anchor_row) {
                        if writer.clear(update.coord) {
                            cleared_cells += 1;
                        } else {
                            log::debug!("left {} in place while clearing section {section}", update.coord);
                        }
                    }
                }
                for update in layout.write_updates(anchor_row, jobs) {
                    stage(&mut writer, &update, &mut results, &mut summary.cells);
                }
                let overflow = layout.overflow_jobs(anchor_row, jobs.len());
                if overflow > 0 {
                    log::warn!(
                        "section {section} in {sheet:?}: {overflow} jobs fall below the last worksheet row"
                    );
                    for _ in 0..overflow * 2 {
                        summary.cells.record(PatchResult::SkippedNotFound);
                    }
                }

                summary.sections.push(SectionReport {
                    sheet: sheet.clone(),
                    section: section.to_string(),
                    anchor: Some(anchor.clone()),
                    jobs: jobs.len(),
                    cleared_rows,
                    cleared_cells,
                });
            }

            patches.set_sheet(sheet.clone(), WorksheetCellPatches::from_writes(writer.into_writes()));
            plans.push(SheetPlan {
                sheet,
                part,
                results,
            });
        }
        Ok((patches, plans))
    }

    fn patch_and_verify(
        &self,
        pkg: &mut XlsxPackage,
        baseline: &XlsxPackage,
        patches: &WorkbookCellPatches,
        plans: &[SheetPlan],
        summary: &mut UpdateSummary,
    ) -> Result<Vec<u8>, XlsxError> {
        let outcome = apply_cell_patches(pkg, patches)?;
        for failure in &outcome.failed {
            summary.sheet_failures.push(SheetFailure {
                sheet: failure.sheet.clone(),
                part: failure.part.clone(),
                reason: failure.error.to_string(),
            });
        }
        for report in &outcome.patched {
            let Some(plan) = plans.iter().find(|plan| plan.sheet == report.sheet) else {
                continue;
            };
            for coord in &report.stats.refused_formula {
                if let Some(result) = plan.results.get(coord) {
                    summary.cells.reclassify_as_formula(*result);
                }
            }
        }
        summary.enter(UpdateState::Patched);

        let bytes = pkg.write_to_bytes()?;
        let changed: BTreeSet<String> = outcome.changed_parts().map(part_name_key).collect();
        let sheets: Vec<(&str, &str)> = plans
            .iter()
            .map(|plan| (plan.sheet.as_str(), plan.part.as_str()))
            .collect();
        verify_patched(baseline, &bytes, &sheets, &changed)?;
        summary.enter(UpdateState::Verified);
        Ok(bytes)
    }
}

fn stage(
    writer: &mut SafeCellWriter<'_, sheetpatch_model::Grid>,
    update: &CellUpdate,
    results: &mut BTreeMap<CellCoord, PatchResult>,
    tally: &mut PatchTally,
) {
    let result = writer.stage(update);
    tally.record(result);
    match result {
        PatchResult::Applied => {
            results.insert(update.coord, result);
        }
        PatchResult::RedirectedToAnchor { anchor } => {
            results.insert(anchor, result);
        }
        _ => {}
    }
}

/// Re-open a patched archive and check it against the pre-patch package.
///
/// - the archive opens and has exactly the same parts;
/// - every part outside `changed` (keys from `part_name_key`) is byte-identical;
/// - each `(sheet, part)` still resolves to the same part and parses as XML.
pub fn verify_patched(
    baseline: &XlsxPackage,
    patched: &[u8],
    sheets: &[(&str, &str)],
    changed: &BTreeSet<String>,
) -> Result<(), XlsxError> {
    let fail = XlsxError::VerificationFailure;
    let reopened = XlsxPackage::from_bytes(patched)
        .map_err(|err| fail(format!("patched archive does not reopen: {err}")))?;

    if reopened.part_count() != baseline.part_count() {
        return Err(fail(format!(
            "part count changed from {} to {}",
            baseline.part_count(),
            reopened.part_count()
        )));
    }
    for (name, bytes) in baseline.parts() {
        let Some(now) = reopened.part(name) else {
            return Err(fail(format!("part {name} is missing")));
        };
        if !changed.contains(&part_name_key(name)) && now != bytes {
            return Err(fail(format!("untouched part {name} was modified")));
        }
    }

    for (sheet, part) in sheets {
        let resolved = worksheet_part(&reopened, sheet)
            .map_err(|err| fail(format!("worksheet {sheet:?} no longer resolves: {err}")))?;
        if part_name_key(&resolved) != part_name_key(part) {
            return Err(fail(format!(
                "worksheet {sheet:?} now resolves to {resolved} instead of {part}"
            )));
        }
        let xml = reopened
            .part(part)
            .ok_or_else(|| fail(format!("part {part} is missing")))?;
        let text = std::str::from_utf8(xml)
            .map_err(|err| fail(format!("{part} is not UTF-8: {err}")))?;
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        roxmltree::Document::parse_with_options(text.trim_start_matches('\u{feff}'), options)
            .map_err(|err| fail(format!("{part} is not well-formed XML: {err}")))?;
    }
    Ok(())
}
