#![allow(dead_code)]

use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const SHEET1: &str = "xl/worksheets/sheet1.xml";
pub const SHEET2: &str = "xl/worksheets/sheet2.xml";

pub const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="bin" ContentType="application/vnd.ms-office.vbaProject"/><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.ms-excel.sheet.macroEnabled.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#;

pub const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

pub const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets><sheet name="Summary" sheetId="1" r:id="rId1"/><sheet name="Apr 25" sheetId="2" r:id="rId2"/></sheets><definedNames><definedName name="Jobs">'Apr 25'!$A$4:$A$20</definedName></definedNames></workbook>"#;

pub const WORKBOOK_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/><Relationship Id="rId5" Type="http://schemas.microsoft.com/office/2006/relationships/vbaProject" Target="vbaProject.bin"/></Relationships>"#;

pub const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="&quot;$&quot;#,##0.00"/></numFmts><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="1"><border/></borders><cellXfs count="3"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" applyNumberFormat="1"/><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellXfs></styleSheet>"#;

pub const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="8" uniqueCount="8"><si><t>WIP Report - Apr 25</t></si><si><t>% of Sub Labor Cost - 5040</t></si><si><t>old job</t></si><si><t>old job 2</t></si><si><t>Material - 5030</t></si><si><t>M-1</t></si><si><t>Summary</t></si><si><t>Equipment - 6010</t></si></sst>"#;

pub const SUMMARY_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheetData><row r="1"><c r="A1" t="s"><v>6</v></c></row><row r="4"><c r="A4" t="s"><v>7</v></c></row><row r="5"><c r="A5" s="1"/><c r="B5" s="1"/><c r="C5" s="1"/></row></sheetData><mergeCells count="1"><mergeCell ref="A5:C5"/></mergeCells></worksheet>"#;

pub const MONTH_SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006" xmlns:x14ac="http://schemas.microsoft.com/office/spreadsheetml/2009/9/ac" mc:Ignorable="x14ac">
  <dimension ref="A1:H11"/>
  <sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews>
  <sheetFormatPr defaultRowHeight="15" x14ac:dyDescent="0.25"/>
  <sheetData>
    <row r="1" spans="1:8" x14ac:dyDescent="0.25"><c r="A1" s="2" t="s"><v>0</v></c></row>
    <row r="3" spans="1:8"><c r="B3" s="2" t="s"><v>1</v></c></row>
    <row r="4" spans="1:8"><c r="A4" t="s"><v>2</v></c><c r="C4" s="1"><v>10</v></c><c r="E4" s="1"><f>C4*2</f><v>20</v></c><c r="H4"><v>1</v></c></row>
    <row r="5" spans="1:8"><c r="A5" t="s"><v>3</v></c><c r="E5" s="1"><v>7</v></c></row>
    <row r="10" spans="1:8"><c r="A10" t="s"><v>4</v></c></row>
    <row r="11" spans="1:8"><c r="A11" t="s"><v>5</v></c><c r="B11"><v>3</v></c><c r="C11" s="1"><v>4</v></c></row>
  </sheetData>
  <mergeCells count="1"><mergeCell ref="D12:F12"/></mergeCells>
  <pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>
  <extLst><ext uri="{CCE6A557-97BC-4b89-ADB6-D9C93CAAB3DF}" xmlns:x14="http://schemas.microsoft.com/office/spreadsheetml/2009/9/main"><x14:dataValidations count="0"/></ext></extLst>
</worksheet>"#;

/// Opaque binary payload standing in for a VBA project.
pub fn vba_project() -> Vec<u8> {
    (0u8..=255).cycle().take(2048).collect()
}

pub fn fixture_parts() -> Vec<(&'static str, Vec<u8>, CompressionMethod)> {
    vec![
        ("[Content_Types].xml", CONTENT_TYPES.as_bytes().to_vec(), CompressionMethod::Deflated),
        ("_rels/.rels", ROOT_RELS.as_bytes().to_vec(), CompressionMethod::Deflated),
        ("docProps/app.xml", b"<Properties><Application>Microsoft Excel</Application></Properties>".to_vec(), CompressionMethod::Deflated),
        ("xl/workbook.xml", WORKBOOK.as_bytes().to_vec(), CompressionMethod::Deflated),
        ("xl/_rels/workbook.xml.rels", WORKBOOK_RELS.as_bytes().to_vec(), CompressionMethod::Deflated),
        ("xl/styles.xml", STYLES.as_bytes().to_vec(), CompressionMethod::Deflated),
        ("xl/sharedStrings.xml", SHARED_STRINGS.as_bytes().to_vec(), CompressionMethod::Deflated),
        (SHEET1, SUMMARY_SHEET.as_bytes().to_vec(), CompressionMethod::Deflated),
        (SHEET2, MONTH_SHEET.as_bytes().to_vec(), CompressionMethod::Deflated),
        ("xl/vbaProject.bin", vba_project(), CompressionMethod::Stored),
        ("customXml/item1.xml", b"<root><keep/></root>".to_vec(), CompressionMethod::Deflated),
    ]
}

pub fn build_zip(parts: &[(&str, Vec<u8>, CompressionMethod)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes, method) in parts {
        let options = FileOptions::<()>::default().compression_method(*method);
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// The standard fixture workbook, with some parts replaced.
pub fn fixture_with(overrides: &[(&str, &[u8])]) -> Vec<u8> {
    let mut parts = fixture_parts();
    for (name, bytes) in overrides {
        let entry = parts
            .iter_mut()
            .find(|(part, _, _)| part == name)
            .expect("override names an existing part");
        entry.1 = bytes.to_vec();
    }
    build_zip(&parts)
}

pub fn fixture() -> Vec<u8> {
    fixture_with(&[])
}
