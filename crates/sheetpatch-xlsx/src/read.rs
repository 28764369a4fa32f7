//! Read-only worksheet snapshot: cell text, formulas and merged ranges.
//!
//! The snapshot feeds the section locator and the safe writer; it never flows back into
//! the package. Parsing is strict about truncation so a damaged worksheet is reported
//! instead of yielding a partial grid.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use sheetpatch_model::{CellCoord, CellRange, Grid, GridCell, MergeIndex};

use crate::openxml::local_name;
use crate::XlsxError;

#[derive(Debug, Clone, Default)]
pub struct WorksheetSnapshot {
    pub grid: Grid,
    pub merges: Vec<CellRange>,
}

impl WorksheetSnapshot {
    pub fn merge_index(&self) -> MergeIndex {
        MergeIndex::new(self.merges.iter().copied())
    }
}

#[derive(Debug)]
struct PendingCell {
    coord: CellCoord,
    cell_type: Option<String>,
    value: Option<String>,
    formula: Option<String>,
    inline: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Value,
    Formula,
    Inline,
}

impl PendingCell {
    fn finish(self, shared_strings: &[String]) -> Option<GridCell> {
        let text = match self.cell_type.as_deref() {
            Some("s") => self
                .value
                .as_deref()
                .and_then(|v| v.trim().parse::<usize>().ok())
                .and_then(|idx| shared_strings.get(idx))
                .cloned(),
            Some("inlineStr") => self.inline,
            _ => self.value,
        };
        match self.formula {
            Some(formula) => Some(GridCell::formula(formula, text)),
            None => text.filter(|t| !t.is_empty()).map(GridCell::text),
        }
    }
}

pub fn read_worksheet(xml: &[u8], shared_strings: &[String]) -> Result<WorksheetSnapshot, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut snapshot = WorksheetSnapshot::default();
    let mut depth = 0usize;
    let mut row = 0u32;
    let mut next_col = 1u32;
    let mut cell: Option<PendingCell> = None;
    let mut capture = Capture::None;
    let mut phonetic_depth = 0usize;

    loop {
        buf.clear();
        let (start, is_empty) = match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                (e.into_owned(), false)
            }
            Event::Empty(e) => (e.into_owned(), true),
            Event::End(e) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| XlsxError::Invalid("unbalanced worksheet XML".to_string()))?;
                match local_name(e.name().as_ref()) {
                    b"v" | b"f" | b"t" => capture = Capture::None,
                    b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                    b"c" => {
                        if let Some(pending) = cell.take() {
                            let coord = pending.coord;
                            if let Some(done) = pending.finish(shared_strings) {
                                snapshot.grid.insert(coord, done);
                            }
                        }
                    }
                    _ => {}
                }
                continue;
            }
            Event::Text(t) => {
                if let Some(pending) = cell.as_mut() {
                    append_captured(pending, capture, &t.unescape()?);
                }
                continue;
            }
            Event::CData(t) => {
                if let Some(pending) = cell.as_mut() {
                    append_captured(pending, capture, std::str::from_utf8(&t)?);
                }
                continue;
            }
            Event::Eof => {
                if depth != 0 || cell.is_some() {
                    return Err(XlsxError::Invalid(
                        "worksheet XML ends inside an open element".to_string(),
                    ));
                }
                break;
            }
            _ => continue,
        };

        match local_name(start.name().as_ref()) {
            b"row" => {
                row = attr_value(&start, b"r")?
                    .and_then(|r| r.trim().parse::<u32>().ok())
                    .unwrap_or(row + 1);
                next_col = 1;
            }
            b"c" => {
                let coord = attr_value(&start, b"r")?
                    .and_then(|r| CellCoord::from_a1(&r).ok())
                    .unwrap_or(CellCoord::new(row.max(1), next_col));
                next_col = coord.col + 1;
                let pending = PendingCell {
                    coord,
                    cell_type: attr_value(&start, b"t")?,
                    value: None,
                    formula: None,
                    inline: None,
                };
                if is_empty {
                    if let Some(done) = pending.finish(shared_strings) {
                        snapshot.grid.insert(coord, done);
                    }
                } else {
                    cell = Some(pending);
                }
            }
            b"v" if !is_empty => capture = Capture::Value,
            b"f" => {
                if let Some(pending) = cell.as_mut() {
                    pending.formula.get_or_insert_with(String::new);
                }
                if !is_empty {
                    capture = Capture::Formula;
                }
            }
            b"is" => {
                if let Some(pending) = cell.as_mut() {
                    pending.inline.get_or_insert_with(String::new);
                }
            }
            b"rPh" if !is_empty => phonetic_depth += 1,
            b"t" if !is_empty && phonetic_depth == 0 => capture = Capture::Inline,
            b"mergeCell" => {
                if let Some(reference) = attr_value(&start, b"ref")? {
                    match CellRange::from_a1(&reference) {
                        Ok(range) => snapshot.merges.push(range),
                        Err(err) => log::warn!("ignoring merged range {reference:?}: {err}"),
                    }
                }
            }
            _ => {}
        }
    }

    Ok(snapshot)
}

fn append_captured(cell: &mut PendingCell, capture: Capture, text: &str) {
    let target = match capture {
        Capture::None => return,
        Capture::Value => cell.value.get_or_insert_with(String::new),
        Capture::Formula => cell.formula.get_or_insert_with(String::new),
        Capture::Inline => cell.inline.get_or_insert_with(String::new),
    };
    target.push_str(text);
}

fn attr_value(start: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxError> {
    for attr in start.attributes() {
        let attr = attr?;
        if local_name(attr.key.as_ref()) == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
  <sheetData>
    <row r="2"><c r="B2" t="s"><v>1</v></c></row>
    <row r="3"><c r="A3"><v>1001</v></c><c r="E3"><f>C3*2</f><v>500</v></c></row>
    <row><c t="inlineStr"><is><t>implicit</t></is></c><c t="str"><f/><v>x</v></c></row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="A5:C5"/></mergeCells>
</worksheet>"#;

    #[test]
    fn snapshot_carries_text_formulas_and_merges() {
        let shared = vec!["Job".to_string(), "Sub Labor Cost - 5040".to_string()];
        let snap = read_worksheet(SHEET.as_bytes(), &shared).unwrap();

        assert_eq!(snap.grid.text(CellCoord::new(2, 2)), Some("Sub Labor Cost - 5040"));
        assert_eq!(snap.grid.text(CellCoord::new(3, 1)), Some("1001"));
        assert!(snap.grid.is_formula(CellCoord::new(3, 5)));
        assert_eq!(snap.grid.text(CellCoord::new(4, 1)), Some("implicit"));
        assert!(snap.grid.is_formula(CellCoord::new(4, 2)));
        assert_eq!(snap.merges, vec![CellRange::from_a1("A5:C5").unwrap()]);
        assert_eq!(
            snap.merge_index().resolve(CellCoord::new(5, 3)),
            CellCoord::new(5, 1)
        );
    }

    #[test]
    fn truncated_worksheet_is_an_error() {
        let cut = &SHEET.as_bytes()[..SHEET.find("<mergeCells").unwrap()];
        assert!(read_worksheet(cut, &[]).is_err());
    }
}
