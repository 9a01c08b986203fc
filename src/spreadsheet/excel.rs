//! Microsoft Office Excel Helpers
use crate::error::DrillLedgerError;
use crate::helpers::cfb::Cfb;
use crate::helpers::cfb::SIGNATURE;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use zip::ZipArchive;

/// XML tag name for relationship elements in Excel files
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Workbook parts shared by the reader and the appender
pub(crate) type ExcelArchive = ZipArchive<BufReader<File>>;

/// Opens an `.xlsx` package, refusing encrypted workbooks (which are CFB containers, not ZIP files).
pub(crate) fn open_archive(path: &Path) -> Result<ExcelArchive, DrillLedgerError> {
    let mut reader = BufReader::new(File::open(path)?);
    if is_password_protected(&mut reader)? {
        Err(SpreadsheetError::SpreadsheetPasswordProtectedError(path.to_string_lossy().into_owned()))?;
    }
    Ok(ZipArchive::new(reader)?)
}

/// Loads worksheet relationships: relationship id → zip path
pub(crate) fn load_relationships<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    path: &str,
) -> Result<HashMap<String, String>, DrillLedgerError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_string()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only worksheet relationships are of interest
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Maps `cellXfs` entries (their numFmtId) to cell types using custom and built-in formats.
pub(crate) fn load_number_formats(
    format_indexes: Vec<String>,
    custom_formats: HashMap<String, CellType>,
    is_1904: bool,
) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Normalizes a relationship target to a path inside the package.
pub(crate) fn to_zip_path(path: &str) -> String {
    if let Some(path) = path.strip_prefix('/') {
        path.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// An encrypted package is stored as a compound file holding an `EncryptedPackage` stream.
fn is_password_protected<RS: Read + Seek>(reader: &mut RS) -> Result<bool, DrillLedgerError> {
    let mut signature = [0u8; 8];
    let is_compound_file = reader.read_exact(&mut signature).is_ok() && u64::from_le_bytes(signature) == SIGNATURE;
    reader.seek(SeekFrom::Start(0))?;
    let protected = is_compound_file && match Cfb::new(reader) {
        Ok(cfb) => cfb.exists("EncryptedPackage"),
        Err(_) => false,
    };
    reader.seek(SeekFrom::Start(0))?;
    Ok(protected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_paths() {
        assert_eq!(to_zip_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path("/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path("xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
    }

    #[test]
    fn number_formats_fall_back_to_builtins() {
        let mut custom = HashMap::new();
        custom.insert("164".to_owned(), CellType::NumberDateTime1900);
        let formats = load_number_formats(vec!["0".to_owned(), "14".to_owned(), "164".to_owned()], custom, false);
        assert_eq!(formats, vec![CellType::Number, CellType::NumberDate1900, CellType::NumberDateTime1900]);
    }
}
