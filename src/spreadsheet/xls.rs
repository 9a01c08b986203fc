use crate::error::DrillLedgerError;
use crate::error::ResultMessage;
use crate::error::ResultOptionChain;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

// BIFF8 record type identifiers
const FORMULA: u16 = 6;        // Formula record with its cached result
const EOF: u16 = 10;           // End of a substream
const DATE1904: u16 = 34;      // Date system flag (1904 vs 1900 base)
const FILE_PASS: u16 = 47;     // File password protection record
const BOUND_SHEET8: u16 = 133; // Sheet name, type and substream position
const MUL_RK: u16 = 189;       // Several RK numbers in one row
const XF: u16 = 224;           // Extended format record for cell styling
const SST: u16 = 252;          // Shared string table
const LABEL_SST: u16 = 253;    // Label referencing shared string table
const NUMBER: u16 = 515;       // Numeric cell value
const LABEL: u16 = 516;        // Text label cell value
const BOOL_ERR: u16 = 517;     // Boolean or error cell value
const STRING: u16 = 519;       // String result of the preceding formula
const RK: u16 = 638;           // RK number format for compressed numeric storage
const FORMAT: u16 = 1054;      // Custom number format definition
const BOF: u16 = 2057;         // Beginning of a substream
const SHARED_FORMULA: u16 = 1212;
const ARRAY: u16 = 545;
const TABLE: u16 = 566;

/// BoundSheet8 sheet type of an ordinary worksheet
const WORKSHEET: u8 = 0;

/// Error types specific to XLS file parsing
#[derive(Error, Debug)]
pub enum XlsError {
    /// Invalid formula value or structure encountered
    #[error("Invalid Formula value '{0}'")]
    FormulaValueError(u64),

    /// Sheet pointer does not lead to a BOF record
    #[error("No substream begins at offset '{0}'")]
    SubstreamError(usize),
}

/// An Excel 97-2003 workbook
pub(crate) struct XlsSpreadsheet {
    /// Original file name for error reporting and identification
    name: String,
    /// BIFF8 reader over the Workbook stream
    reader: Biff8Reader,
    /// Shared string table containing repeated text values
    shared_strings: Vec<String>,
    /// Cell type of each XF record
    number_formats: Vec<CellType>,
    /// Worksheets with their names and stream positions
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Opens an XLS file and reads the workbook globals substream.
    pub(crate) fn open(path: &Path) -> Result<XlsSpreadsheet, DrillLedgerError> {
        let name = path.to_string_lossy().into_owned();
        let mut buf_reader = BufReader::new(File::open(path)?);
        let cfb = Cfb::new(&mut buf_reader).with_prefix(&name)?;
        let stream = cfb.read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .ok_or_else(|| SpreadsheetError::SpreadsheetEmptyError(name.to_owned()))?;
        Self::from_stream(&name, stream).with_prefix(&name)
    }

    /// Parses the globals substream of an in-memory Workbook stream.
    pub(crate) fn from_stream(name: &str, stream: Vec<u8>) -> Result<XlsSpreadsheet, DrillLedgerError> {
        let mut reader = Biff8Reader::new(stream);
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::SpreadsheetPasswordProtectedError(name.to_owned()))?,
            DATE1904 => is_1904 = reader.read_u16()? == 1,
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_xl_unicode_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                let _visibility = reader.read_u8()?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_xl_unicode_string()?;
                if sheet_type == WORKSHEET {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::SpreadsheetEmptyError(name.to_owned()))?
        }

        // Formats may precede DATE1904, so the custom formats are re-derived at the end
        if is_1904 {
            for kind in custom_formats.values_mut() {
                *kind = to_1904(*kind);
            }
        }
        let number_formats = load_number_formats(format_indexes, custom_formats, is_1904);

        Ok(XlsSpreadsheet {
            name: name.to_owned(),
            reader,
            shared_strings,
            number_formats,
            sheets,
        })
    }

    fn format(&self, index: usize) -> CellType {
        self.number_formats.get(index).copied().unwrap_or(CellType::Number)
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Walks the cell records of the selected worksheet substream.
    fn read_sheet(&mut self, criteria: &Criteria) -> Result<Sheet, DrillLedgerError> {
        let index = criteria
            .select(self.sheets.iter().map(|(name, _)| name.as_str()))
            .ok_or_else(|| SpreadsheetError::SheetNotFoundError(self.name.to_owned(), criteria.sheet_label()))?;
        let (sheet_name, pointer) = self.sheets[index].to_owned();
        let mut sheet = Sheet::new(&self.name, &sheet_name, criteria.range);

        self.reader.goto(pointer)?;
        if self.reader.next()? != Some(BOF) {
            Err(XlsError::SubstreamError(pointer))?
        }
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let count = self.reader.record_size().saturating_sub(6) / 6;
                    for col in col_lower_bound..col_lower_bound + count {
                        let index = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk_number()?;
                        if sheet.contains(row, col) {
                            sheet.push(Cell {
                                row,
                                col,
                                kind: self.format(index),
                                value: value.to_string(),
                            });
                        }
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    if !sheet.contains(row, col) {
                        continue;
                    }
                    let (either, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let (kind, value) = match either {
                        Either::Left(kind) => (kind, value),
                        Either::Right(index) => (self.format(index), value),
                    };
                    let value = if tag == LABEL_SST {
                        value.parse::<usize>().ok()
                            .and_then(|index| self.shared_strings.get(index))
                            .cloned()
                            .ok_or_else(|| SpreadsheetError::CellValueError(
                                self.name.to_owned(),
                                sheet_name.to_owned(),
                                index_to_reference(row, col),
                                value.to_owned(),
                            ))?
                    } else {
                        value
                    };
                    if kind == CellType::Error && criteria.error_as_null {
                        continue;
                    }
                    if !value.is_empty() {
                        sheet.push(Cell { row, col, kind, value });
                    }
                }
                _ => (),
            }
        }
        Ok(sheet)
    }
}

fn to_1904(kind: CellType) -> CellType {
    match kind {
        CellType::NumberDateTime1900 => CellType::NumberDateTime1904,
        CellType::NumberDate1900 => CellType::NumberDate1904,
        CellType::NumberTime1900 => CellType::NumberTime1904,
        kind => kind,
    }
}

/// Loads the shared string table from the SST record and its CONTINUE records.
fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>, DrillLedgerError> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(65_536));
    for _ in 0..count {
        shared_strings.push(reader.read_xl_unicode_rich_extended_string()?);
    }
    Ok(shared_strings)
}

/// BOOL_ERR: a boolean or an error code, distinguished by a flag byte.
fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), DrillLedgerError> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

/// NUMBER: XF index and an IEEE double.
fn read_number_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), DrillLedgerError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

/// RK: XF index and an RK-compressed number.
fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), DrillLedgerError> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk_number()?;
    Ok((Either::Right(index), value.to_string()))
}

/// LABEL_SST: index into the shared string table.
fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), DrillLedgerError> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::Text), value.to_string()))
}

/// LABEL: inline string.
fn read_label_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), DrillLedgerError> {
    reader.skip(2)?;
    let value = reader.read_xl_unicode_string()?;
    Ok((Either::Left(CellType::Text), value))
}

/// FORMULA: the cached result is a double unless the top two bytes are 0xFFFF,
/// in which case the low byte says string, boolean, error or empty string.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(Either<CellType, usize>, String), DrillLedgerError> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000;
    let flag = formula & 0xFF;
    if is_number {
        Ok((Either::Right(index), f64::from_bits(formula).to_string()))
    } else if flag == 0 {
        // The string result follows in a STRING record, possibly after shared formula records
        loop {
            match reader.next()? {
                Some(STRING) => {
                    let value = reader.read_xl_unicode_string()?;
                    return Ok((Either::Left(CellType::Text), value));
                }
                Some(SHARED_FORMULA | ARRAY | TABLE) => continue,
                _ => Err(XlsError::FormulaValueError(formula))?,
            }
        }
    } else if flag == 1 {
        let value = if (formula & 0xFF_0000) > 0 { "1" } else { "0" };
        Ok((Either::Left(CellType::Boolean), value.to_owned()))
    } else if flag == 2 {
        let code = ((formula >> 16) & 0xFF) as u8;
        Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
    } else if flag == 3 {
        Ok((Either::Left(CellType::Text), "".to_owned()))
    } else {
        Err(XlsError::FormulaValueError(formula))?
    }
}
