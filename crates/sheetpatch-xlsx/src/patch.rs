//! Streaming worksheet patcher.
//!
//! The worksheet XML is re-emitted event by event. Only the `<c>` elements named by a
//! patch set are re-rendered; missing rows and cells are inserted in row/column order.
//! Everything else (unknown elements, extension lists, whitespace, namespace prefixes)
//! passes through as the original bytes.

use std::collections::BTreeMap;
use std::iter::Peekable;

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use sheetpatch_model::{CellCoord, UpdateValue};

use crate::openxml::{local_name, prefix_of};
use crate::workbook::worksheet_part;
use crate::{XlsxError, XlsxPackage};

/// Accepted writes for one worksheet, keyed by effective target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorksheetCellPatches {
    cells: BTreeMap<CellCoord, UpdateValue>,
}

impl WorksheetCellPatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_writes(cells: BTreeMap<CellCoord, UpdateValue>) -> Self {
        Self { cells }
    }

    pub fn set(&mut self, coord: CellCoord, value: impl Into<UpdateValue>) {
        self.cells.insert(coord, value.into());
    }

    pub fn get(&self, coord: CellCoord) -> Option<&UpdateValue> {
        self.cells.get(&coord)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, &UpdateValue)> {
        self.cells.iter().map(|(coord, value)| (*coord, value))
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    fn by_row(&self) -> BTreeMap<u32, Vec<(u32, &UpdateValue)>> {
        let mut rows: BTreeMap<u32, Vec<(u32, &UpdateValue)>> = BTreeMap::new();
        for (coord, value) in &self.cells {
            rows.entry(coord.row).or_default().push((coord.col, value));
        }
        rows
    }
}

/// Patch sets for several worksheets, keyed by sheet name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkbookCellPatches {
    sheets: BTreeMap<String, WorksheetCellPatches>,
}

impl WorkbookCellPatches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sheet(&mut self, sheet: impl Into<String>, patches: WorksheetCellPatches) {
        self.sheets.insert(sheet.into(), patches);
    }

    pub fn set_cell(&mut self, sheet: &str, coord: CellCoord, value: impl Into<UpdateValue>) {
        self.sheets
            .entry(sheet.to_string())
            .or_default()
            .set(coord, value);
    }

    pub fn sheets(&self) -> impl Iterator<Item = (&str, &WorksheetCellPatches)> {
        self.sheets.iter().map(|(name, patches)| (name.as_str(), patches))
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.values().all(WorksheetCellPatches::is_empty)
    }
}

/// What the patcher did to one worksheet part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorksheetPatchStats {
    /// Cells whose value was rewritten or created.
    pub written: Vec<CellCoord>,
    /// Targets left untouched because the cell in the XML carries a formula.
    pub refused_formula: Vec<CellCoord>,
    pub created_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetPatchReport {
    pub sheet: String,
    pub part: String,
    pub stats: WorksheetPatchStats,
    /// Whether the part bytes differ from the input.
    pub changed: bool,
}

/// A worksheet whose XML could not be patched; its part was left as it was.
#[derive(Debug)]
pub struct SheetPatchFailure {
    pub sheet: String,
    pub part: String,
    pub error: XlsxError,
}

#[derive(Debug, Default)]
pub struct PatchOutcome {
    pub patched: Vec<SheetPatchReport>,
    pub failed: Vec<SheetPatchFailure>,
}

impl PatchOutcome {
    pub fn changed_parts(&self) -> impl Iterator<Item = &str> {
        self.patched
            .iter()
            .filter(|report| report.changed)
            .map(|report| report.part.as_str())
    }
}

/// Apply patch sets to every named worksheet in `pkg`.
///
/// Unknown sheet names fail the whole call before anything is modified. A worksheet
/// whose XML cannot be parsed is reported in [`PatchOutcome::failed`] as
/// [`XlsxError::PatchParseFailure`] and keeps its original bytes; the other worksheets
/// are still patched.
pub fn apply_cell_patches(
    pkg: &mut XlsxPackage,
    patches: &WorkbookCellPatches,
) -> Result<PatchOutcome, XlsxError> {
    let mut targets = Vec::new();
    for (sheet, sheet_patches) in patches.sheets() {
        if sheet_patches.is_empty() {
            continue;
        }
        targets.push((sheet, worksheet_part(pkg, sheet)?, sheet_patches));
    }

    let mut outcome = PatchOutcome::default();
    for (sheet, part, sheet_patches) in targets {
        let result = {
            let xml = pkg
                .part(&part)
                .ok_or_else(|| XlsxError::MissingPart(part.clone()))?;
            patch_worksheet_xml(xml, sheet_patches).map(|(bytes, stats)| {
                let changed = bytes != xml;
                (bytes, stats, changed)
            })
        };

        match result {
            Ok((bytes, stats, changed)) => {
                log::debug!(
                    "patched {part}: {} written, {} formula cells refused",
                    stats.written.len(),
                    stats.refused_formula.len()
                );
                if changed {
                    pkg.set_part(part.clone(), bytes);
                }
                outcome.patched.push(SheetPatchReport {
                    sheet: sheet.to_string(),
                    part,
                    stats,
                    changed,
                });
            }
            Err(err) => {
                log::warn!("leaving {part} ({sheet}) unchanged: {err}");
                outcome.failed.push(SheetPatchFailure {
                    sheet: sheet.to_string(),
                    error: XlsxError::PatchParseFailure {
                        part: part.clone(),
                        message: err.to_string(),
                    },
                    part,
                });
            }
        }
    }
    Ok(outcome)
}

/// Rewrite one worksheet part. The cell element prefix follows `sheetData`, so
/// workbooks that bind SpreadsheetML to `x:` stay consistent.
pub fn patch_worksheet_xml(
    original: &[u8],
    patches: &WorksheetCellPatches,
) -> Result<(Vec<u8>, WorksheetPatchStats), XlsxError> {
    let mut stats = WorksheetPatchStats::default();
    let rows = patches.by_row();
    if rows.is_empty() {
        return Ok((original.to_vec(), stats));
    }

    let mut reader = Reader::from_reader(original);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Vec::with_capacity(original.len() + patches.len() * 64));
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut saw_sheet_data = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                let prefix = prefix_of(e.name().as_ref());
                writer.write_event(Event::Start(e.into_owned()))?;
                patch_sheet_data(&mut reader, &mut writer, &rows, &prefix, &mut stats)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"sheetData" => {
                saw_sheet_data = true;
                if rows.values().any(|cells| has_creatable(cells)) {
                    let prefix = prefix_of(e.name().as_ref());
                    let end = BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                    writer.write_event(Event::Start(e.into_owned()))?;
                    let mut pending = rows.iter().peekable();
                    flush_rows_before(&mut writer, &mut pending, u32::MAX, &prefix, &mut stats)?;
                    writer.write_event(Event::End(end))?;
                } else {
                    writer.write_event(Event::Empty(e.into_owned()))?;
                }
            }
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| XlsxError::Invalid("unbalanced worksheet XML".to_string()))?;
                if depth == 0 && !saw_sheet_data && rows.values().any(|cells| has_creatable(cells))
                {
                    // A worksheet with no sheetData at all; give it one.
                    let prefix = prefix_of(e.name().as_ref());
                    writer
                        .get_mut()
                        .extend_from_slice(format!("<{prefix}sheetData>").as_bytes());
                    let mut pending = rows.iter().peekable();
                    flush_rows_before(&mut writer, &mut pending, u32::MAX, &prefix, &mut stats)?;
                    writer
                        .get_mut()
                        .extend_from_slice(format!("</{prefix}sheetData>").as_bytes());
                    saw_sheet_data = true;
                }
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => {
                if depth != 0 {
                    return Err(XlsxError::Invalid(
                        "worksheet XML ends inside an open element".to_string(),
                    ));
                }
                break;
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }

    Ok((writer.into_inner(), stats))
}

type RowPatches<'a> = BTreeMap<u32, Vec<(u32, &'a UpdateValue)>>;
type PendingRows<'p, 'a> = Peekable<std::collections::btree_map::Iter<'p, u32, Vec<(u32, &'a UpdateValue)>>>;

fn patch_sheet_data(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    rows: &RowPatches<'_>,
    prefix: &str,
    stats: &mut WorksheetPatchStats,
) -> Result<(), XlsxError> {
    let mut pending = rows.iter().peekable();
    let mut buf = Vec::new();
    let mut last_row = 0u32;
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if depth == 0 && local_name(e.name().as_ref()) == b"row" => {
                let row_num = parse_row_r(&e)?.unwrap_or(last_row + 1);
                last_row = row_num;
                flush_rows_before(writer, &mut pending, row_num, prefix, stats)?;
                let cells = take_row(&mut pending, row_num);
                writer.write_event(Event::Start(e.into_owned()))?;
                match cells {
                    Some(cells) => patch_row(reader, writer, row_num, cells, prefix, stats)?,
                    None => depth += 1,
                }
            }
            Event::Empty(e) if depth == 0 && local_name(e.name().as_ref()) == b"row" => {
                let row_num = parse_row_r(&e)?.unwrap_or(last_row + 1);
                last_row = row_num;
                flush_rows_before(writer, &mut pending, row_num, prefix, stats)?;
                match take_row(&mut pending, row_num).filter(|cells| has_creatable(cells)) {
                    Some(cells) => {
                        let end =
                            BytesEnd::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                        writer.write_event(Event::Start(e.into_owned()))?;
                        write_new_cells_before(writer, row_num, cells, 0, u32::MAX, prefix, stats)?;
                        writer.write_event(Event::End(end))?;
                    }
                    None => writer.write_event(Event::Empty(e.into_owned()))?,
                }
            }
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::End(e) if depth == 0 => {
                // </sheetData>
                flush_rows_before(writer, &mut pending, u32::MAX, prefix, stats)?;
                writer.write_event(Event::End(e.into_owned()))?;
                return Ok(());
            }
            Event::End(e) => {
                depth -= 1;
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "worksheet XML ends inside sheetData".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
}

fn patch_row(
    reader: &mut Reader<&[u8]>,
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, &UpdateValue)],
    prefix: &str,
    stats: &mut WorksheetPatchStats,
) -> Result<(), XlsxError> {
    let mut buf = Vec::new();
    let mut idx = 0usize;
    let mut next_col = 1u32;
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if depth == 0 && local_name(e.name().as_ref()) == b"c" => {
                let start = e.into_owned();
                let col = parse_cell_col(&start)?.unwrap_or(next_col);
                next_col = col.saturating_add(1);
                idx = write_new_cells_before(writer, row_num, cells, idx, col, prefix, stats)?;

                match cells.get(idx).filter(|(c, _)| *c == col) {
                    Some((_, value)) => {
                        idx += 1;
                        let (children, end) = read_cell_children(reader)?;
                        let coord = CellCoord::new(row_num, col);
                        if has_formula(&children) {
                            log::warn!("refusing to overwrite formula cell {coord}");
                            stats.refused_formula.push(coord);
                            writer.write_event(Event::Start(start))?;
                            for child in children {
                                writer.write_event(child)?;
                            }
                            writer.write_event(Event::End(end))?;
                        } else {
                            write_cell(writer, coord, Some(&start), &children, value, prefix)?;
                            stats.written.push(coord);
                        }
                    }
                    None => {
                        depth += 1;
                        writer.write_event(Event::Start(start))?;
                    }
                }
            }
            Event::Empty(e) if depth == 0 && local_name(e.name().as_ref()) == b"c" => {
                let start = e.into_owned();
                let col = parse_cell_col(&start)?.unwrap_or(next_col);
                next_col = col.saturating_add(1);
                idx = write_new_cells_before(writer, row_num, cells, idx, col, prefix, stats)?;

                match cells.get(idx).filter(|(c, _)| *c == col) {
                    Some((_, value)) => {
                        idx += 1;
                        let coord = CellCoord::new(row_num, col);
                        write_cell(writer, coord, Some(&start), &[], value, prefix)?;
                        stats.written.push(coord);
                    }
                    None => writer.write_event(Event::Empty(start))?,
                }
            }
            Event::Start(e) => {
                depth += 1;
                writer.write_event(Event::Start(e.into_owned()))?;
            }
            Event::End(e) if depth == 0 => {
                // </row>
                write_new_cells_before(writer, row_num, cells, idx, u32::MAX, prefix, stats)?;
                writer.write_event(Event::End(e.into_owned()))?;
                return Ok(());
            }
            Event::End(e) => {
                depth -= 1;
                writer.write_event(Event::End(e.into_owned()))?;
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "worksheet XML ends inside a row".to_string(),
                ))
            }
            ev => writer.write_event(ev.into_owned())?,
        }
        buf.clear();
    }
}

/// Everything inside the current `<c>` up to (and returning) its end tag.
fn read_cell_children(
    reader: &mut Reader<&[u8]>,
) -> Result<(Vec<Event<'static>>, BytesEnd<'static>), XlsxError> {
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut children = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::End(e) if depth == 0 => return Ok((children, e.into_owned())),
            Event::Start(e) => {
                depth += 1;
                children.push(Event::Start(e.into_owned()));
            }
            Event::End(e) => {
                depth -= 1;
                children.push(Event::End(e.into_owned()));
            }
            Event::Eof => {
                return Err(XlsxError::Invalid(
                    "worksheet XML ends inside a cell".to_string(),
                ))
            }
            ev => children.push(ev.into_owned()),
        }
        buf.clear();
    }
}

fn has_formula(children: &[Event<'_>]) -> bool {
    let mut depth = 0usize;
    for child in children {
        match child {
            Event::Start(e) => {
                if depth == 0 && local_name(e.name().as_ref()) == b"f" {
                    return true;
                }
                depth += 1;
            }
            Event::Empty(e) if depth == 0 && local_name(e.name().as_ref()) == b"f" => return true,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    false
}

fn has_creatable(cells: &[(u32, &UpdateValue)]) -> bool {
    cells
        .iter()
        .any(|(_, value)| !matches!(value, UpdateValue::Empty))
}

fn take_row<'p, 'a>(pending: &mut PendingRows<'p, 'a>, row_num: u32) -> Option<&'p [(u32, &'a UpdateValue)]> {
    if pending.peek().is_some_and(|(row, _)| **row == row_num) {
        pending.next().map(|(_, cells)| cells.as_slice())
    } else {
        None
    }
}

/// Emit brand-new rows for every pending row number below `before`.
fn flush_rows_before(
    writer: &mut Writer<Vec<u8>>,
    pending: &mut PendingRows<'_, '_>,
    before: u32,
    prefix: &str,
    stats: &mut WorksheetPatchStats,
) -> Result<(), XlsxError> {
    while let Some((row_num, cells)) = pending.next_if(|(row, _)| **row < before) {
        if !has_creatable(cells) {
            continue;
        }
        writer
            .get_mut()
            .extend_from_slice(format!(r#"<{prefix}row r="{row_num}">"#).as_bytes());
        write_new_cells_before(writer, *row_num, cells, 0, u32::MAX, prefix, stats)?;
        writer
            .get_mut()
            .extend_from_slice(format!("</{prefix}row>").as_bytes());
        stats.created_rows += 1;
    }
    Ok(())
}

/// Emit new cells for patches with a column below `before`, starting at `idx`.
/// Clearing a cell that does not exist is a no-op.
fn write_new_cells_before(
    writer: &mut Writer<Vec<u8>>,
    row_num: u32,
    cells: &[(u32, &UpdateValue)],
    mut idx: usize,
    before: u32,
    prefix: &str,
    stats: &mut WorksheetPatchStats,
) -> Result<usize, XlsxError> {
    while let Some((col, value)) = cells.get(idx).filter(|(col, _)| *col < before) {
        idx += 1;
        if matches!(value, UpdateValue::Empty) {
            continue;
        }
        let coord = CellCoord::new(row_num, *col);
        write_cell(writer, coord, None, &[], value, prefix)?;
        stats.written.push(coord);
    }
    Ok(idx)
}

/// Render a patched `<c>`.
///
/// Existing attributes are kept in order except `t` (replaced) and `vm` (value
/// metadata that no longer applies). Child elements other than the value (`<v>`,
/// `<is>`) are kept after the new value.
fn write_cell(
    writer: &mut Writer<Vec<u8>>,
    coord: CellCoord,
    existing: Option<&BytesStart<'_>>,
    children: &[Event<'static>],
    value: &UpdateValue,
    prefix: &str,
) -> Result<(), XlsxError> {
    let name = match existing {
        Some(start) => String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        None => format!("{prefix}c"),
    };

    let mut cell = String::new();
    cell.push('<');
    cell.push_str(&name);
    match existing {
        Some(start) => {
            for attr in start.attributes() {
                let attr = attr?;
                let key = attr.key.as_ref();
                if key == b"t" || key == b"vm" {
                    continue;
                }
                let value = attr.unescape_value()?;
                cell.push(' ');
                cell.push_str(std::str::from_utf8(key)?);
                cell.push_str(r#"=""#);
                cell.push_str(&quick_xml::escape::escape(value.as_ref()));
                cell.push('"');
            }
        }
        None => {
            cell.push_str(&format!(r#" r="{}""#, coord.to_a1()));
        }
    }

    let mut value_xml = String::new();
    match value {
        UpdateValue::Number(n) => {
            value_xml.push_str(&format!("<{prefix}v>{n}</{prefix}v>"));
        }
        UpdateValue::Text(s) => {
            cell.push_str(r#" t="inlineStr""#);
            value_xml.push_str(&format!("<{prefix}is><{prefix}t"));
            if needs_space_preserve(s) {
                value_xml.push_str(r#" xml:space="preserve""#);
            }
            value_xml.push('>');
            value_xml.push_str(&escape_text(s));
            value_xml.push_str(&format!("</{prefix}t></{prefix}is>"));
        }
        UpdateValue::Empty => {}
    }

    let kept = kept_children(children)?;
    if value_xml.is_empty() && kept.is_empty() {
        cell.push_str("/>");
        writer.get_mut().extend_from_slice(cell.as_bytes());
    } else {
        cell.push('>');
        cell.push_str(&value_xml);
        writer.get_mut().extend_from_slice(cell.as_bytes());
        writer.get_mut().extend_from_slice(&kept);
        writer
            .get_mut()
            .extend_from_slice(format!("</{name}>").as_bytes());
    }
    Ok(())
}

/// Serialize the child subtrees that survive a value rewrite.
fn kept_children(children: &[Event<'static>]) -> Result<Vec<u8>, XlsxError> {
    let mut out = Writer::new(Vec::new());
    let mut depth = 0usize;
    let mut skipping = false;
    for child in children {
        match child {
            Event::Start(e) => {
                if depth == 0 {
                    skipping = matches!(local_name(e.name().as_ref()), b"v" | b"is");
                }
                depth += 1;
                if !skipping {
                    out.write_event(child.clone())?;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if !skipping {
                    out.write_event(child.clone())?;
                }
                if depth == 0 {
                    skipping = false;
                }
            }
            Event::Empty(e) if depth == 0 => {
                if !matches!(local_name(e.name().as_ref()), b"v" | b"is") {
                    out.write_event(child.clone())?;
                }
            }
            // Whitespace between value children is insignificant.
            Event::Text(_) if depth == 0 => {}
            _ if skipping => {}
            _ => out.write_event(child.clone())?,
        }
    }
    Ok(out.into_inner())
}

fn parse_row_r(row: &BytesStart<'_>) -> Result<Option<u32>, XlsxError> {
    for attr in row.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"r" {
            let value = attr.unescape_value()?;
            return Ok(value.trim().parse::<u32>().ok());
        }
    }
    Ok(None)
}

fn parse_cell_col(cell: &BytesStart<'_>) -> Result<Option<u32>, XlsxError> {
    for attr in cell.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == b"r" {
            let value = attr.unescape_value()?;
            return Ok(CellCoord::from_a1(value.trim()).ok().map(|c| c.col));
        }
    }
    Ok(None)
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}

/// XML-escape cell text. Control characters XML 1.0 cannot carry are written in the
/// `_xHHHH_` form Excel uses.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\t' | '\n' | '\r' => out.push(ch),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {
                out.push_str(&format!("_x{:04X}_", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
