use crate::error::DrillLedgerError;
use crate::error::ResultMessage;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::ExcelArchive;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::reference::row_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");  // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");         // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");   // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");       // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                  // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr"); // Workbook properties
const TAG_SHEET: QName = QName(b"sheet");             // Worksheet definition
const TAG_ROW: QName = QName(b"row");                 // Row in worksheet
const TAG_CELL: QName = QName(b"c");                  // Cell in worksheet
const TAG_INLINE_STRING: QName = QName(b"is");        // Inline string value
const TAG_VALUE: QName = QName(b"v");                 // Cell value content

pub(crate) const WORKBOOK_PATH: &str = "xl/workbook.xml";
pub(crate) const WORKBOOK_RELATIONSHIPS_PATH: &str = "xl/_rels/workbook.xml.rels";
pub(crate) const SHARED_STRINGS_PATH: &str = "xl/sharedStrings.xml";
pub(crate) const STYLES_PATH: &str = "xl/styles.xml";

/// An Excel 2007+ workbook
pub(crate) struct XlsxSpreadsheet {
    /// File name of the spreadsheet
    name: String,
    /// ZIP archive containing the XLSX file contents
    zip: ExcelArchive,
    /// Cell type of each `cellXfs` entry
    number_formats: Vec<CellType>,
    /// Worksheets as (name, zip_path) pairs
    sheets: Vec<(String, String)>,
    shared_strings: Vec<String>,
}

impl XlsxSpreadsheet {
    /// Opens an XLSX workbook and loads its sheet list, styles and shared strings.
    pub(crate) fn open(path: &Path) -> Result<XlsxSpreadsheet, DrillLedgerError> {
        let name = path.to_string_lossy().into_owned();
        let mut zip = excel::open_archive(path).with_prefix(&name)?;
        let (sheets, is_1904) = load_workbook(&mut zip).with_prefix(&name)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(name.to_owned()))?
        }
        let number_formats = load_number_formats(&mut zip, is_1904).with_prefix(&name)?;
        let shared_strings = load_shared_strings(&mut zip).with_prefix(&name)?;
        Ok(XlsxSpreadsheet {
            name,
            zip,
            number_formats,
            sheets,
            shared_strings,
        })
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Streams the worksheet XML, keeping cells inside the criteria's range.
    fn read_sheet(&mut self, criteria: &Criteria) -> Result<Sheet, DrillLedgerError> {
        let index = criteria
            .select(self.sheets.iter().map(|(name, _)| name.as_str()))
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(self.name.to_owned(), criteria.sheet_label()))?;
        let (sheet_name, zip_path) = self.sheets[index].to_owned();
        let mut sheet = Sheet::new(&self.name, &sheet_name, criteria.range);
        let mut reader = self.zip.xml_reader(&zip_path)?
            .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;

        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut is_shared = false;
        let mut value = String::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_ROW => {
                row_count = event.get_attribute_value("r")?
                    .and_then(|reference| row_to_index(&reference))
                    .unwrap_or(row_count);
                col_count = 0;
            }
            Event::End(event) if event.name() == TAG_ROW => row_count += 1,
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                value.clear();
                is_shared = false;
                if sheet.after_row_upper_bound(row) {
                    break;
                } else if sheet.contains(row, col) {
                    kind = match event.get_attribute_value("t")?.as_deref() {
                        Some("inlineStr") | Some("str") => CellType::Text,
                        Some("s") => {
                            is_shared = true;
                            CellType::Text
                        }
                        Some("d") => CellType::IsoDateTime,
                        Some("b") => CellType::Boolean,
                        Some("e") if criteria.error_as_null => CellType::Empty,
                        Some("e") => CellType::Error,
                        _ => CellType::Number,
                    };
                    if let Some(format_id) = event.get_attribute_value("s")? {
                        if kind == CellType::Number && !format_id.is_empty() {
                            let index = format_id.parse::<usize>()?;
                            kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                        }
                    }
                } else {
                    kind = CellType::default();
                }
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if kind != CellType::Empty && event.name() == TAG_CELL => {
                if is_shared {
                    value = value.trim().parse::<usize>().ok()
                        .and_then(|index| self.shared_strings.get(index))
                        .cloned()
                        .ok_or_else(|| SpreadsheetError::CellValueError(
                            self.name.to_owned(),
                            sheet_name.to_owned(),
                            index_to_reference(row, col),
                            value.to_owned(),
                        ))?;
                }
                if !value.is_empty() {
                    sheet.push(Cell {
                        row,
                        col,
                        kind,
                        value: std::mem::take(&mut value),
                    });
                }
                kind = CellType::default();
            },
        });
        Ok(sheet)
    }
}

/// Reads workbook.xml: worksheets as (name, zip_path) pairs and whether the 1904 date system is used.
pub(crate) fn load_workbook<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<(Vec<(String, String)>, bool), DrillLedgerError> {
    let relationships = load_relationships(zip, WORKBOOK_RELATIONSHIPS_PATH)?;
    let mut reader = zip.xml_reader(WORKBOOK_PATH)?
        .ok_or_else(|| SpreadsheetError::FileError(WORKBOOK_PATH.to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<String>;
            let mut id = None::<String>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.unescape_value()?.into_owned());
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.unescape_value()?.into_owned());
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&id) {
                    sheets.push((name, path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads the cell type of each `cellXfs` entry from styles.xml.
fn load_number_formats<RS: Read + Seek>(zip: &mut ZipArchive<RS>, is_1904: bool) -> Result<Vec<CellType>, DrillLedgerError> {
    let mut reader = match zip.xml_reader(STYLES_PATH)? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = true,
        Event::End(event) if event.name() == TAG_CUSTOM_FORMATS => custom_formats_context = false,
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }
        Event::Start(event) if event.name() == TAG_FORMAT_INDEXES => format_indexes_context = true,
        Event::End(event) if event.name() == TAG_FORMAT_INDEXES => break,
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.unwrap_or_default();
            format_indexes.push(id.to_string());
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Loads the whole shared string table.
fn load_shared_strings<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Vec<String>, DrillLedgerError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader(SHARED_STRINGS_PATH)? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            shared_strings.push(read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?);
        }
    });
    Ok(shared_strings)
}

/// Reads string content up to `end_tag`, skipping phonetic runs.
/// With `is_text_content` every text node counts; otherwise only text inside `<t>`.
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, DrillLedgerError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_str(&event.xml_content()?),
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}
