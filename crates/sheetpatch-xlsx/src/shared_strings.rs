use quick_xml::events::Event;
use quick_xml::Reader;

use crate::openxml::{local_name, relationship_target_by_type, SHARED_STRINGS_REL};
use crate::workbook::workbook_part_name;
use crate::{XlsxError, XlsxPackage};

/// Plain text of every `<si>` in the shared strings table, in index order. Rich-text
/// runs are concatenated; phonetic runs (`<rPh>`) are dropped.
pub fn parse_shared_strings(xml: &[u8]) -> Result<Vec<String>, XlsxError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    let mut strings = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"si" => current = Some(String::new()),
                b"rPh" => phonetic_depth += 1,
                b"t" if phonetic_depth == 0 && current.is_some() => in_text = true,
                _ => {}
            },
            Event::Empty(e) if local_name(e.name().as_ref()) == b"si" => {
                strings.push(String::new());
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"si" => strings.extend(current.take()),
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&t.unescape()?);
                }
            }
            Event::CData(t) if in_text => {
                if let Some(s) = current.as_mut() {
                    s.push_str(std::str::from_utf8(&t)?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Load the workbook's shared strings; a workbook without the table has none.
pub fn load_shared_strings(package: &XlsxPackage) -> Result<Vec<String>, XlsxError> {
    let workbook_part = workbook_part_name(package)?;
    let part = relationship_target_by_type(package, &workbook_part, SHARED_STRINGS_REL)?
        .unwrap_or_else(|| "xl/sharedStrings.xml".to_string());
    match package.part(&part) {
        Some(bytes) => parse_shared_strings(bytes),
        None => Ok(Vec::new()),
    }
}
