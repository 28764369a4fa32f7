//! Worksheet part locator: sheet name -> `xl/worksheets/sheetN.xml`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::openxml::{
    local_name, relationship_target_by_type, resolve_relationship_target, OFFICE_DOCUMENT_REL,
};
use crate::{XlsxError, XlsxPackage};

const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookSheetInfo {
    pub name: String,
    pub sheet_id: u32,
    pub rel_id: String,
}

/// The workbook part named by the package root relationships, falling back to
/// `xl/workbook.xml`.
pub fn workbook_part_name(package: &XlsxPackage) -> Result<String, XlsxError> {
    if let Some(target) = relationship_target_by_type(package, "", OFFICE_DOCUMENT_REL)? {
        if package.part(&target).is_some() {
            return Ok(target);
        }
    }
    if package.part(DEFAULT_WORKBOOK_PART).is_some() {
        return Ok(DEFAULT_WORKBOOK_PART.to_string());
    }
    Err(XlsxError::MissingPart(DEFAULT_WORKBOOK_PART.to_string()))
}

pub fn workbook_sheets(package: &XlsxPackage) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
    let workbook_part = workbook_part_name(package)?;
    let xml = package
        .part(&workbook_part)
        .ok_or_else(|| XlsxError::MissingPart(workbook_part.clone()))?;
    parse_workbook_sheets(std::str::from_utf8(xml)?)
}

pub fn sheet_names(package: &XlsxPackage) -> Result<Vec<String>, XlsxError> {
    Ok(workbook_sheets(package)?
        .into_iter()
        .map(|sheet| sheet.name)
        .collect())
}

/// Resolve a worksheet name to its part name.
///
/// Names compare exactly first, then ASCII case-insensitively (Excel does not allow two
/// sheets that differ only by case).
pub fn worksheet_part(package: &XlsxPackage, sheet_name: &str) -> Result<String, XlsxError> {
    let workbook_part = workbook_part_name(package)?;
    let sheets = workbook_sheets(package)?;
    let sheet = sheets
        .iter()
        .find(|s| s.name == sheet_name)
        .or_else(|| sheets.iter().find(|s| s.name.eq_ignore_ascii_case(sheet_name)))
        .ok_or_else(|| XlsxError::SheetNotFound {
            sheet: sheet_name.to_string(),
            available: sheets.iter().map(|s| s.name.clone()).collect(),
        })?;

    let target = resolve_relationship_target(package, &workbook_part, &sheet.rel_id)?
        .ok_or_else(|| {
            XlsxError::Invalid(format!(
                "worksheet {:?} has no relationship {}",
                sheet.name, sheet.rel_id
            ))
        })?;
    if package.part(&target).is_none() {
        return Err(XlsxError::MissingPart(target));
    }
    Ok(target)
}

pub fn parse_workbook_sheets(workbook_xml: &str) -> Result<Vec<WorkbookSheetInfo>, XlsxError> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut sheets = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Empty(e) | Event::Start(e) => {
                if e.local_name().as_ref() == b"sheet" {
                    sheets.push(parse_sheet_element(&e)?);
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(sheets)
}

fn parse_sheet_element(e: &BytesStart<'_>) -> Result<WorkbookSheetInfo, XlsxError> {
    let mut name = None;
    let mut sheet_id = None;
    let mut rel_id = None;

    for attr in e.attributes() {
        let attr = attr?;
        let key = attr.key.as_ref();
        match key {
            b"name" => name = Some(attr.unescape_value()?.into_owned()),
            b"sheetId" => {
                let v = attr.unescape_value()?;
                sheet_id = Some(
                    v.trim()
                        .parse::<u32>()
                        .map_err(|_| XlsxError::Invalid(format!("invalid sheetId {v:?}")))?,
                );
            }
            _ if local_name(key) == b"id" => rel_id = Some(attr.unescape_value()?.into_owned()),
            _ => {}
        }
    }

    Ok(WorkbookSheetInfo {
        name: name.ok_or(XlsxError::MissingAttr("name"))?,
        sheet_id: sheet_id.ok_or(XlsxError::MissingAttr("sheetId"))?,
        rel_id: rel_id.ok_or(XlsxError::MissingAttr("r:id"))?,
    })
}
