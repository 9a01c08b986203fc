//! # Spreadsheet Module
//!
//! Reads Excel workbooks into [`Sheet`]s of typed cells. Two formats are supported:
//! Office Open XML (`.xlsx`) and the legacy BIFF8 binary format (`.xls`).
//! A small writer for new single-sheet `.xlsx` workbooks lives in [`writer`].

pub mod cell;
pub mod criteria;
pub(crate) mod excel;
pub mod range;
pub mod reference;
pub mod sheet;
pub mod writer;
pub(crate) mod xls;
pub(crate) mod xlsx;

use crate::error::DrillLedgerError;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xls::XlsSpreadsheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::path::Path;
use thiserror::Error;

/// Accepted file name suffixes; matching is case-sensitive.
pub const SUPPORTED_EXTENSIONS: [&str; 2] = [".xls", ".xlsx"];

/// Errors raised while opening or reading a workbook
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Missing part '{0}'")]
    FileError(String),

    #[error("Spreadsheet '{0}' has no worksheets")]
    SpreadsheetEmptyError(String),

    #[error("Spreadsheet '{0}' is password protected")]
    SpreadsheetPasswordProtectedError(String),

    #[error("Invalid cell value in '{0}' sheet '{1}' at {2}: '{3}'")]
    CellValueError(String, String, String, String),

    #[error("Unsupported file format '{0}'")]
    UnsupportedFormatError(String),

    #[error("No sheet matching '{1}' in '{0}'")]
    SheetNotFoundError(String, String),
}

/// Common interface of the workbook readers.
pub trait Spreadsheet {
    /// Returns the file name of this spreadsheet
    fn name(&self) -> String;

    /// Names of the worksheets in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Reads the worksheet selected by `criteria`, keeping only the cells inside its range
    fn read_sheet(&mut self, criteria: &Criteria) -> Result<Sheet, DrillLedgerError>;
}

/// True when the path ends in `.xls` or `.xlsx` exactly.
pub fn is_supported(path: &Path) -> bool {
    let name = path.to_string_lossy();
    SUPPORTED_EXTENSIONS.iter().any(|extension| name.ends_with(extension))
}

/// Opens a workbook, choosing the reader from the file extension.
pub fn open_spreadsheet(path: &Path) -> Result<Box<dyn Spreadsheet>, DrillLedgerError> {
    let file_name = path.to_string_lossy();
    if file_name.ends_with(".xlsx") {
        Ok(Box::new(XlsxSpreadsheet::open(path)?))
    } else if file_name.ends_with(".xls") {
        Ok(Box::new(XlsSpreadsheet::open(path)?))
    } else {
        Err(SpreadsheetError::UnsupportedFormatError(file_name.into_owned()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_case_sensitive() {
        assert!(is_supported(Path::new("/data/C06-090.xlsx")));
        assert!(is_supported(Path::new("log.xls")));
        assert!(!is_supported(Path::new("log.XLSX")));
        assert!(!is_supported(Path::new("log.xlsm")));
        assert!(!is_supported(Path::new("log.csv")));
    }

    #[test]
    fn unsupported_files_are_refused() {
        let result = open_spreadsheet(Path::new("notes.txt"));
        assert!(matches!(
            result,
            Err(DrillLedgerError::SpreadsheetError(SpreadsheetError::UnsupportedFormatError(_)))
        ));
    }
}
