//! Appends canonical rows to the database workbook.
//!
//! Only the target worksheet part is rewritten: existing rows are streamed through untouched and
//! the new rows are inserted before `</sheetData>`. `styles.xml` gains date cell formats when it
//! lacks them. Every other part of the package is copied raw. The new package is built in memory,
//! written to a temporary sibling and renamed over the database.

use crate::config::DatabaseConfig;
use crate::database::layout::header_cells;
use crate::database::layout::row_cells;
use crate::database::layout::OutputColumn;
use crate::error::DrillLedgerError;
use crate::error::ResultMessage;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::zip::deflated;
use crate::helpers::zip::ZipHelper;
use crate::ingest::field::CanonicalRow;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel::open_archive;
use crate::spreadsheet::excel::ExcelArchive;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::reference::row_to_index;
use crate::spreadsheet::writer::dimension_reference;
use crate::spreadsheet::writer::write_atomically;
use crate::spreadsheet::writer::write_row;
use crate::spreadsheet::writer::DateStyles;
use crate::spreadsheet::writer::WorkbookWriter;
use crate::spreadsheet::xlsx::load_workbook;
use crate::spreadsheet::xlsx::STYLES_PATH;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;
use quick_xml::Writer;
use std::io::Cursor;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use zip::ZipWriter;

const TAG_SHEET_DATA: &[u8] = b"sheetData";
const TAG_DIMENSION: &[u8] = b"dimension";
const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs";
const TAG_FORMAT_INDEX: &[u8] = b"xf";

/// Built-in number formats used for dates, date-times and times
const DATE_FORMAT_ID: &str = "14";
const DATETIME_FORMAT_ID: &str = "22";
const TIME_FORMAT_ID: &str = "21";

#[derive(Error, Debug)]
pub enum AppendError {
    #[error("Database '{0}' does not exist")]
    MissingDatabaseError(String),

    #[error("Database '{0}' already exists")]
    DatabaseExistsError(String),

    #[error("Worksheet part '{0}' is missing from '{1}'")]
    MissingWorksheetError(String, String),
}

/// What one append did; row numbers are 1-based.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub header_written: bool,
    pub first_row: usize,
    pub last_row: usize,
    pub rows: usize,
}

/// Writes canonical rows to the configured worksheet of the database workbook.
#[derive(Clone, Debug)]
pub struct DatabaseAppender {
    path: PathBuf,
    sheet: Option<String>,
    new_sheet_name: String,
    columns: Vec<OutputColumn>,
}

impl DatabaseAppender {
    pub fn new(path: &Path, config: &DatabaseConfig) -> Self {
        Self {
            path: path.to_path_buf(),
            sheet: config.sheet.to_owned(),
            new_sheet_name: config.new_sheet_name.to_owned(),
            columns: config.columns.to_owned(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates an empty database workbook; an existing file is never replaced.
    pub fn create_empty(&self) -> Result<(), DrillLedgerError> {
        if self.path.exists() {
            Err(AppendError::DatabaseExistsError(self.path.to_string_lossy().into_owned()))?;
        }
        WorkbookWriter::new(&self.new_sheet_name).save(&self.path)?;
        info!(database = %self.path.display(), "Created empty database");
        Ok(())
    }

    /// Last used row of the database worksheet, 1-based; 0 when the sheet has no rows.
    pub fn last_row(&self) -> Result<usize, DrillLedgerError> {
        let mut zip = self.open()?;
        let (_, entry, _) = self.locate_worksheet(&mut zip)?;
        let xml = self.read_worksheet(&mut zip, &entry)?;
        Ok(SheetExtent::scan(&xml)?.last_row)
    }

    /// Appends the batch and persists it, or leaves the database untouched on failure.
    /// An empty batch does not touch the file.
    pub fn append(&self, rows: &[CanonicalRow]) -> Result<AppendReport, DrillLedgerError> {
        if rows.is_empty() {
            return Ok(AppendReport::default());
        }
        let database = self.path.to_string_lossy().into_owned();
        self.append_rows(rows).with_prefix(&database)
    }

    fn append_rows(&self, rows: &[CanonicalRow]) -> Result<AppendReport, DrillLedgerError> {
        let mut zip = self.open()?;
        let (sheet_name, sheet_entry, is_1904) = self.locate_worksheet(&mut zip)?;
        let sheet_xml = self.read_worksheet(&mut zip, &sheet_entry)?;

        let extent = SheetExtent::scan(&sheet_xml)?;
        let header = match extent.has_content {
            true => None,
            false => Some(header_cells(&self.columns)),
        };
        // the header takes row 1 even when content-free rows exist below it
        let first_row = match header {
            Some(_) => extent.last_row.max(1),
            None => extent.last_row,
        };
        let new_rows: Vec<(usize, Vec<(usize, CellValue)>)> = rows
            .iter()
            .enumerate()
            .map(|(offset, row)| (first_row + offset, row_cells(&self.columns, row)))
            .collect();

        let styles_entry = zip.entry_name(STYLES_PATH);
        let (styles_xml, date_styles) = match (&styles_entry, is_1904) {
            (Some(entry), false) => match zip.read_bytes(entry)? {
                Some(xml) => ensure_date_styles(&xml)?,
                None => (None, DateStyles::default()),
            },
            _ => (None, DateStyles::default()),
        };
        debug!(sheet = %sheet_name, ?date_styles, first_row = first_row + 1, "Appending");

        let dimension = extent.dimension_with(header.as_deref(), &new_rows);
        let sheet_xml = rewrite_sheet(&sheet_xml, header.as_deref(), &new_rows, &dimension, &date_styles)?;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for index in 0..zip.len() {
            let entry = zip.by_index_raw(index)?;
            let name = entry.name().to_owned();
            let replacement = if name == sheet_entry {
                Some(sheet_xml.as_slice())
            } else if styles_entry.as_deref() == Some(name.as_str()) {
                styles_xml.as_deref()
            } else {
                None
            };
            match replacement {
                Some(bytes) => {
                    writer.start_file(name, deflated())?;
                    writer.write_all(bytes)?;
                }
                None => writer.raw_copy_file(entry)?,
            }
        }
        let package = writer.finish()?.into_inner();
        // the source handle must be closed before the rename
        drop(zip);
        write_atomically(&self.path, |file| Ok(file.write_all(&package)?))?;

        let report = AppendReport {
            header_written: header.is_some(),
            first_row: first_row + 1,
            last_row: first_row + rows.len(),
            rows: rows.len(),
        };
        info!(
            database = %self.path.display(),
            first_row = report.first_row,
            last_row = report.last_row,
            header_written = report.header_written,
            "Appended {} rows",
            report.rows
        );
        Ok(report)
    }

    fn open(&self) -> Result<ExcelArchive, DrillLedgerError> {
        if !self.path.exists() {
            Err(AppendError::MissingDatabaseError(self.path.to_string_lossy().into_owned()))?;
        }
        open_archive(&self.path)
    }

    /// The configured worksheet as (sheet name, archive entry name, uses the 1904 date system).
    fn locate_worksheet(&self, zip: &mut ExcelArchive) -> Result<(String, String, bool), DrillLedgerError> {
        let (sheets, is_1904) = load_workbook(zip)?;
        let criteria = Criteria::new(self.sheet.as_deref(), None, true)?;
        let index = criteria
            .select(sheets.iter().map(|(name, _)| name.as_str()))
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(self.path.to_string_lossy().into_owned(), criteria.sheet_label()))?;
        let (name, path) = &sheets[index];
        let entry = zip
            .entry_name(path)
            .ok_or_else(|| AppendError::MissingWorksheetError(path.to_owned(), self.path.to_string_lossy().into_owned()))?;
        Ok((name.to_owned(), entry, is_1904))
    }

    fn read_worksheet(&self, zip: &mut ExcelArchive, entry: &str) -> Result<Vec<u8>, DrillLedgerError> {
        let xml = zip
            .read_bytes(entry)?
            .ok_or_else(|| AppendError::MissingWorksheetError(entry.to_owned(), self.path.to_string_lossy().into_owned()))?;
        Ok(xml)
    }
}

/// Used area of a worksheet part. Rows are counted even when none of their cells hold a value,
/// so appended row numbers never collide with existing `<row>` elements.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct SheetExtent {
    /// 1-based number of the last row, 0 when there is none
    pub(crate) last_row: usize,
    /// Any cell holds a value or formula
    pub(crate) has_content: bool,
    first_row: Option<usize>,
    first_col: Option<usize>,
    last_col: Option<usize>,
}

impl SheetExtent {
    pub(crate) fn scan(xml: &[u8]) -> Result<SheetExtent, DrillLedgerError> {
        let mut extent = SheetExtent::default();
        let mut reader = XmlReader::new(xml);
        let mut row = 0usize;
        let mut next_col = 0usize;
        let mut in_cell = false;
        match_xml_events!(reader => {
            Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
                row = event.get_attribute_value("r")?
                    .and_then(|reference| row_to_index(&reference))
                    .unwrap_or(extent.last_row);
                next_col = 0;
                extent.include_row(row);
            }
            Event::End(event) if event.local_name().as_ref() == TAG_ROW => row += 1,
            Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
                let (cell_row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row, next_col));
                next_col = col + 1;
                in_cell = true;
                extent.include_row(cell_row);
                extent.first_col = Some(extent.first_col.map_or(col, |first| first.min(col)));
                extent.last_col = Some(extent.last_col.map_or(col, |last| last.max(col)));
            }
            Event::End(event) if event.local_name().as_ref() == TAG_CELL => in_cell = false,
            Event::Start(event) if in_cell && matches!(event.local_name().as_ref(), b"v" | b"is" | b"f") => {
                extent.has_content = true;
            }
        });
        Ok(extent)
    }

    fn include_row(&mut self, row: usize) {
        self.first_row = Some(self.first_row.map_or(row, |first| first.min(row)));
        self.last_row = self.last_row.max(row + 1);
    }

    /// The `<dimension>` reference once the header and the new rows are added.
    fn dimension_with(&self, header: Option<&[(usize, CellValue)]>, rows: &[(usize, Vec<(usize, CellValue)>)]) -> String {
        let mut first_row = self.first_row;
        let mut last_row = self.last_row.checked_sub(1);
        let mut first_col = self.first_col;
        let mut last_col = self.last_col;
        let header = header.map(|cells| (0usize, cells));
        let cells = header.into_iter().chain(rows.iter().map(|(row, cells)| (*row, cells.as_slice())));
        for (row, cells) in cells {
            first_row = Some(first_row.map_or(row, |first| first.min(row)));
            last_row = Some(last_row.map_or(row, |last| last.max(row)));
            for (col, _) in cells {
                first_col = Some(first_col.map_or(*col, |first| first.min(*col)));
                last_col = Some(last_col.map_or(*col, |last| last.max(*col)));
            }
        }
        match (first_row, last_row, first_col, last_col) {
            (Some(first_row), Some(last_row), Some(first_col), Some(last_col)) => {
                dimension_reference(first_row, first_col, last_row, last_col)
            }
            _ => "A1".to_owned(),
        }
    }
}

/// Streams a worksheet part, writing the header into row 1 and the new rows at the end of `<sheetData>`.
/// An existing row 1 is dropped when a header is written; it holds no values in that case.
pub(crate) fn rewrite_sheet(
    xml: &[u8],
    header: Option<&[(usize, CellValue)]>,
    rows: &[(usize, Vec<(usize, CellValue)>)],
    dimension: &str,
    styles: &DateStyles,
) -> Result<Vec<u8>, DrillLedgerError> {
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(xml.len() + rows.len() * 512)));
    let mut buffer = Vec::new();
    let mut skipped = Vec::new();
    let write_header = |writer: &mut Writer<Cursor<Vec<u8>>>| match header {
        Some(cells) => write_row(writer, 0, cells, styles),
        None => Ok(()),
    };
    let write_rows = |writer: &mut Writer<Cursor<Vec<u8>>>| -> Result<(), DrillLedgerError> {
        for (row, cells) in rows {
            write_row(writer, *row, cells, styles)?;
        }
        Ok(())
    };
    loop {
        buffer.clear();
        match reader.read_event_into(&mut buffer)? {
            Event::Eof => break,
            Event::Empty(event) if event.local_name().as_ref() == TAG_DIMENSION => {
                writer.write_event(Event::Empty(with_attribute(&event, "ref", dimension)?))?;
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_DIMENSION => {
                writer.write_event(Event::Start(with_attribute(&event, "ref", dimension)?))?;
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_SHEET_DATA => {
                writer.write_event(Event::Start(event))?;
                write_header(&mut writer)?;
            }
            Event::Empty(event) if event.local_name().as_ref() == TAG_SHEET_DATA => {
                let end = BytesEnd::new(String::from_utf8_lossy(event.name().as_ref()).into_owned());
                writer.write_event(Event::Start(event))?;
                write_header(&mut writer)?;
                write_rows(&mut writer)?;
                writer.write_event(Event::End(end))?;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_SHEET_DATA => {
                write_rows(&mut writer)?;
                writer.write_event(Event::End(event))?;
            }
            Event::Start(event) if header.is_some() && is_first_row(&event) => {
                let end = event.to_end().into_owned();
                skipped.clear();
                reader.read_to_end_into(end.name(), &mut skipped)?;
            }
            Event::Empty(event) if header.is_some() && is_first_row(&event) => {}
            event => writer.write_event(event)?,
        }
    }
    Ok(writer.into_inner().into_inner())
}

fn is_first_row(event: &BytesStart) -> bool {
    event.local_name().as_ref() == TAG_ROW && matches!(event.get_attribute_value("r"), Ok(Some(r)) if r == "1")
}

/// Copies an element start, replacing (or adding) one attribute.
fn with_attribute<'a>(event: &BytesStart<'a>, key: &str, value: &str) -> Result<BytesStart<'a>, DrillLedgerError> {
    let mut start = event.clone();
    start.clear_attributes();
    for attribute in event.attributes() {
        let attribute = attribute?;
        if attribute.key != QName(key.as_bytes()) {
            start.push_attribute(attribute);
        }
    }
    start.push_attribute((key, value));
    Ok(start)
}

/// Finds (or adds) `cellXfs` entries for the built-in date, date-time and time formats.
/// Returns the rewritten styles part when entries were added.
pub(crate) fn ensure_date_styles(xml: &[u8]) -> Result<(Option<Vec<u8>>, DateStyles), DrillLedgerError> {
    let mut reader = XmlReader::new(xml);
    let mut in_format_indexes = false;
    let mut found_format_indexes = false;
    let mut format_ids: Vec<String> = Vec::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => {
            in_format_indexes = true;
            found_format_indexes = true;
        }
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => in_format_indexes = false,
        Event::Start(event) if in_format_indexes && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            format_ids.push(event.get_attribute_value("numFmtId")?.unwrap_or_default().into_owned());
        }
    });
    if !found_format_indexes {
        return Ok((None, DateStyles::default()));
    }

    let mut added: Vec<&str> = Vec::new();
    let mut style_of = |format_id: &'static str| {
        format_ids.iter().position(|id| id == format_id).unwrap_or_else(|| {
            added.push(format_id);
            format_ids.len() + added.len() - 1
        })
    };
    let styles = DateStyles {
        date: Some(style_of(DATE_FORMAT_ID)),
        datetime: Some(style_of(DATETIME_FORMAT_ID)),
        time: Some(style_of(TIME_FORMAT_ID)),
    };
    if added.is_empty() {
        return Ok((None, styles));
    }

    let count = (format_ids.len() + added.len()).to_string();
    let write_added = |writer: &mut Writer<Cursor<Vec<u8>>>| -> Result<(), DrillLedgerError> {
        for format_id in &added {
            let xf = BytesStart::new("xf").with_attributes([
                ("numFmtId", *format_id),
                ("fontId", "0"),
                ("fillId", "0"),
                ("borderId", "0"),
                ("xfId", "0"),
                ("applyNumberFormat", "1"),
            ]);
            writer.write_event(Event::Empty(xf))?;
        }
        Ok(())
    };
    let mut reader = Reader::from_reader(xml);
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(xml.len() + 512)));
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_event_into(&mut buffer)? {
            Event::Eof => break,
            Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => {
                writer.write_event(Event::Start(with_attribute(&event, "count", &count)?))?;
            }
            Event::Empty(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => {
                let end = BytesEnd::new(String::from_utf8_lossy(event.name().as_ref()).into_owned());
                writer.write_event(Event::Start(with_attribute(&event, "count", &count)?))?;
                write_added(&mut writer)?;
                writer.write_event(Event::End(end))?;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => {
                write_added(&mut writer)?;
                writer.write_event(Event::End(event))?;
            }
            event => writer.write_event(event)?,
        }
    }
    Ok((Some(writer.into_inner().into_inner()), styles))
}
