//! OPC relationship plumbing: `_rels` part names, relationship parsing and target
//! resolution relative to the source part.

use std::io::Cursor;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::{XlsxError, XlsxPackage};

pub(crate) const OFFICE_DOCUMENT_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub(crate) const SHARED_STRINGS_REL: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub type_uri: String,
    pub target: String,
    pub target_mode: Option<String>,
}

impl Relationship {
    fn is_external(&self) -> bool {
        self.target_mode
            .as_deref()
            .is_some_and(|mode| mode.trim().eq_ignore_ascii_case("External"))
    }
}

pub fn rels_part_name(part_name: &str) -> String {
    let (dir, file) = part_name.rsplit_once('/').unwrap_or(("", part_name));
    if dir.is_empty() {
        format!("_rels/{file}.rels")
    } else {
        format!("{dir}/_rels/{file}.rels")
    }
}

/// Relationships declared by `part_name`; an absent `.rels` part means none.
pub fn part_relationships(
    package: &XlsxPackage,
    part_name: &str,
) -> Result<Vec<Relationship>, XlsxError> {
    match package.part(&rels_part_name(part_name)) {
        Some(bytes) => parse_relationships(bytes),
        None => Ok(Vec::new()),
    }
}

pub fn resolve_relationship_target(
    package: &XlsxPackage,
    part_name: &str,
    relationship_id: &str,
) -> Result<Option<String>, XlsxError> {
    Ok(part_relationships(package, part_name)?
        .into_iter()
        .find(|rel| rel.id == relationship_id)
        .filter(|rel| !rel.is_external())
        .map(|rel| resolve_target(part_name, &rel.target)))
}

/// First internal target of the given relationship type.
pub(crate) fn relationship_target_by_type(
    package: &XlsxPackage,
    part_name: &str,
    type_uri: &str,
) -> Result<Option<String>, XlsxError> {
    Ok(part_relationships(package, part_name)?
        .into_iter()
        .find(|rel| rel.type_uri == type_uri && !rel.is_external())
        .map(|rel| resolve_target(part_name, &rel.target)))
}

/// Resolve a relationship target against the folder of `base_part`.
///
/// Absolute targets (`/xl/...`) are rooted at the package; `.` and `..` segments are
/// folded; URI fragments are dropped.
pub fn resolve_target(base_part: &str, target: &str) -> String {
    let target = target.split_once('#').map(|(t, _)| t).unwrap_or(target);
    let (target, base_dir) = match target.strip_prefix('/') {
        Some(target) => (target, ""),
        None => (
            target,
            base_part.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(""),
        ),
    };

    let mut components: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            _ => components.push(segment),
        }
    }
    components.join("/")
}

pub fn parse_relationships(xml: &[u8]) -> Result<Vec<Relationship>, XlsxError> {
    let mut reader = Reader::from_reader(Cursor::new(xml));
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut relationships = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(start) | Event::Empty(start)
                if local_name(start.name().as_ref()).eq_ignore_ascii_case(b"Relationship") =>
            {
                let mut id = None;
                let mut target = None;
                let mut type_uri = None;
                let mut target_mode = None;
                for attr in start.attributes() {
                    let attr = attr?;
                    let key = local_name(attr.key.as_ref());
                    let value = attr.unescape_value()?.into_owned();
                    if key.eq_ignore_ascii_case(b"Id") {
                        id = Some(value);
                    } else if key.eq_ignore_ascii_case(b"Target") {
                        target = Some(value);
                    } else if key.eq_ignore_ascii_case(b"Type") {
                        type_uri = Some(value);
                    } else if key.eq_ignore_ascii_case(b"TargetMode") {
                        target_mode = Some(value);
                    }
                }
                if let (Some(id), Some(target), Some(type_uri)) = (id, target, type_uri) {
                    relationships.push(Relationship {
                        id,
                        type_uri,
                        target,
                        target_mode,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(relationships)
}

pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

/// `x:` for `x:sheetData`, empty for unprefixed names.
pub(crate) fn prefix_of(name: &[u8]) -> String {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => format!("{}:", String::from_utf8_lossy(&name[..idx])),
        None => String::new(),
    }
}
