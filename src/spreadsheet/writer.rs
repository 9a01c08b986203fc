//! Writes new single-sheet `.xlsx` workbooks and the SpreadsheetML cell markup shared with the appender.

use crate::error::DrillLedgerError;
use crate::helpers::xml::XmlWriterHelper;
use crate::helpers::zip::deflated;
use crate::spreadsheet::cell::date_to_serial;
use crate::spreadsheet::cell::datetime_to_serial;
use crate::spreadsheet::cell::time_to_serial;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use quick_xml::events::BytesDecl;
use quick_xml::events::Event;
use quick_xml::Writer;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Cursor;
use std::io::Write;
use std::path::Path;
use zip::ZipWriter;

pub(crate) const SPREADSHEET_NAMESPACE: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const RELATIONSHIP_NAMESPACE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const ROOT_RELATIONSHIPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const WORKBOOK_RELATIONSHIPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

/// Cell formats 1, 2 and 3 are date, date-time and time.
const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy-mm-dd hh:mm:ss"/></numFmts><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="4"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="14" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="164" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/><xf numFmtId="21" fontId="0" fillId="0" borderId="0" xfId="0" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

/// `cellXfs` indexes used for date-like values; None falls back to ISO `t="d"` cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct DateStyles {
    pub(crate) date: Option<usize>,
    pub(crate) datetime: Option<usize>,
    pub(crate) time: Option<usize>,
}

impl DateStyles {
    /// The styles of workbooks written by [`WorkbookWriter`]
    pub(crate) const BUILT_IN: DateStyles = DateStyles {
        date: Some(1),
        datetime: Some(2),
        time: Some(3),
    };
}

/// Builds a workbook with one worksheet.
#[derive(Debug, Clone)]
pub struct WorkbookWriter {
    sheet_name: String,
    cells: BTreeMap<usize, BTreeMap<usize, CellValue>>,
}

impl WorkbookWriter {
    pub fn new(sheet_name: &str) -> Self {
        WorkbookWriter {
            sheet_name: sheet_name.to_owned(),
            cells: BTreeMap::new(),
        }
    }

    /// Sets the cell at 0-based (row, col).
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) -> &mut Self {
        self.cells.entry(row).or_default().insert(col, value);
        self
    }

    /// Sets the cell at an A1 reference; invalid references are ignored.
    pub fn set_reference(&mut self, reference: &str, value: CellValue) -> &mut Self {
        if let Some((row, col)) = reference_to_index(reference) {
            self.set(row, col, value);
        }
        self
    }

    /// Writes `values` left to right starting at 0-based (row, col).
    pub fn set_row(&mut self, row: usize, col: usize, values: Vec<CellValue>) -> &mut Self {
        for (offset, value) in values.into_iter().enumerate() {
            self.set(row, col + offset, value);
        }
        self
    }

    /// Writes the workbook atomically to `path`.
    pub fn save(&self, path: &Path) -> Result<(), DrillLedgerError> {
        write_atomically(path, |file| self.write_to(file))
    }

    fn write_to(&self, file: &mut File) -> Result<(), DrillLedgerError> {
        let mut zip = ZipWriter::new(file);
        zip.start_file("[Content_Types].xml", deflated())?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;
        zip.start_file("_rels/.rels", deflated())?;
        zip.write_all(ROOT_RELATIONSHIPS.as_bytes())?;
        zip.start_file("xl/workbook.xml", deflated())?;
        zip.write_all(&self.workbook_xml()?)?;
        zip.start_file("xl/_rels/workbook.xml.rels", deflated())?;
        zip.write_all(WORKBOOK_RELATIONSHIPS.as_bytes())?;
        zip.start_file("xl/styles.xml", deflated())?;
        zip.write_all(STYLES.as_bytes())?;
        zip.start_file("xl/worksheets/sheet1.xml", deflated())?;
        zip.write_all(&self.sheet_xml()?)?;
        zip.finish()?;
        Ok(())
    }

    fn workbook_xml(&self) -> Result<Vec<u8>, DrillLedgerError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        writer.open("workbook", &[("xmlns", SPREADSHEET_NAMESPACE), ("xmlns:r", RELATIONSHIP_NAMESPACE)])?;
        writer.open("sheets", &[])?;
        writer.empty("sheet", &[("name", self.sheet_name.as_str()), ("sheetId", "1"), ("r:id", "rId1")])?;
        writer.close("sheets")?;
        writer.close("workbook")?;
        Ok(writer.into_inner().into_inner())
    }

    fn sheet_xml(&self) -> Result<Vec<u8>, DrillLedgerError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        writer.open("worksheet", &[("xmlns", SPREADSHEET_NAMESPACE)])?;
        writer.empty("dimension", &[("ref", self.dimension().as_str())])?;
        writer.open("sheetData", &[])?;
        for (row, cells) in &self.cells {
            let cells: Vec<(usize, CellValue)> = cells.iter().map(|(col, value)| (*col, value.clone())).collect();
            write_row(&mut writer, *row, &cells, &DateStyles::BUILT_IN)?;
        }
        writer.close("sheetData")?;
        writer.close("worksheet")?;
        Ok(writer.into_inner().into_inner())
    }

    fn dimension(&self) -> String {
        let cols = self.cells.values().flat_map(|cells| cells.keys());
        let (first_col, last_col) = cols.fold((usize::MAX, 0), |(lower, upper), col| (lower.min(*col), upper.max(*col)));
        match (self.cells.keys().next(), self.cells.keys().next_back()) {
            (Some(first_row), Some(last_row)) => dimension_reference(*first_row, first_col, *last_row, last_col),
            _ => "A1".to_owned(),
        }
    }
}

/// `A1` for a single cell, `B2:V9` otherwise.
pub(crate) fn dimension_reference(first_row: usize, first_col: usize, last_row: usize, last_col: usize) -> String {
    let first = index_to_reference(first_row, first_col);
    let last = index_to_reference(last_row, last_col);
    if first == last {
        first
    } else {
        format!("{first}:{last}")
    }
}

/// Writes one `<row>` element; empty values produce no `<c>` element.
pub(crate) fn write_row<W: Write>(
    writer: &mut Writer<W>,
    row: usize,
    cells: &[(usize, CellValue)],
    styles: &DateStyles,
) -> Result<(), DrillLedgerError> {
    let row_number = (row + 1).to_string();
    writer.open("row", &[("r", row_number.as_str())])?;
    for (col, value) in cells {
        write_cell(writer, row, *col, value, styles)?;
    }
    writer.close("row")
}

/// Writes one `<c>` element for a typed value.
pub(crate) fn write_cell<W: Write>(
    writer: &mut Writer<W>,
    row: usize,
    col: usize,
    value: &CellValue,
    styles: &DateStyles,
) -> Result<(), DrillLedgerError> {
    let reference = index_to_reference(row, col);
    let r = ("r", reference.as_str());
    match value {
        CellValue::Empty => Ok(()),
        CellValue::Bool(value) => {
            let value = if *value { "1" } else { "0" };
            write_value(writer, &[r, ("t", "b")], value)
        }
        CellValue::Number(number) if number.is_finite() => write_value(writer, &[r], &number.to_string()),
        CellValue::Number(number) => write_inline_string(writer, &[r], &number.to_string()),
        CellValue::Text(text) => write_inline_string(writer, &[r], text),
        CellValue::Error(code) => write_value(writer, &[r, ("t", "e")], code),
        CellValue::Date(date) => match styles.date {
            Some(style) => write_value(writer, &[r, ("s", style.to_string().as_str())], &date_to_serial(*date).to_string()),
            None => write_value(writer, &[r, ("t", "d")], &date.format("%Y-%m-%d").to_string()),
        },
        CellValue::DateTime(datetime) => match styles.datetime {
            Some(style) => write_value(writer, &[r, ("s", style.to_string().as_str())], &datetime_to_serial(*datetime).to_string()),
            None => write_value(writer, &[r, ("t", "d")], &datetime.format("%Y-%m-%dT%H:%M:%S").to_string()),
        },
        CellValue::Time(time) => match styles.time {
            Some(style) => write_value(writer, &[r, ("s", style.to_string().as_str())], &time_to_serial(*time).to_string()),
            None => write_inline_string(writer, &[r], &value.to_text()),
        },
    }
}

fn write_value<W: Write>(writer: &mut Writer<W>, attributes: &[(&str, &str)], value: &str) -> Result<(), DrillLedgerError> {
    writer.open("c", attributes)?;
    writer.text_element("v", &[], value)?;
    writer.close("c")
}

fn write_inline_string<W: Write>(writer: &mut Writer<W>, attributes: &[(&str, &str)], text: &str) -> Result<(), DrillLedgerError> {
    let mut attributes = attributes.to_vec();
    attributes.push(("t", "inlineStr"));
    writer.open("c", &attributes)?;
    writer.open("is", &[])?;
    writer.text_element("t", &[("xml:space", "preserve")], text)?;
    writer.close("is")?;
    writer.close("c")
}

/// Writes a file through a temporary sibling, syncs it and renames it over `path`,
/// so an interrupted write never leaves a half-written file behind.
pub(crate) fn write_atomically<F>(path: &Path, write: F) -> Result<(), DrillLedgerError>
where
    F: FnOnce(&mut File) -> Result<(), DrillLedgerError>,
{
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temporary = tempfile::Builder::new()
        .prefix(".drill-ledger-")
        .suffix(".tmp")
        .tempfile_in(directory)?;
    write(temporary.as_file_mut())?;
    // temporary files are owner-only; a replaced file keeps its own mode
    if let Ok(metadata) = std::fs::metadata(path) {
        temporary.as_file().set_permissions(metadata.permissions())?;
    }
    temporary.as_file().sync_all()?;
    temporary.persist(path)?;
    Ok(())
}
