//! ZIP archive helper utilities for Excel (.xlsx) workbooks
//! Provides entry lookup for reading and a shared option set for writing

use crate::error::DrillLedgerError;
use crate::helpers::xml::XmlReader;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipArchive;

/// Helper trait for ZIP archive operations with specialized reader creation
pub(crate) trait ZipHelper<RS: Read + Seek> {
    /// Gets a file from the ZIP archive by name (case-insensitive, path separator agnostic)
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, DrillLedgerError>;

    /// Returns the archive's own spelling of an entry name
    fn entry_name(&self, name: &str) -> Option<String>;

    /// Creates an XML reader for a file within the ZIP archive
    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, DrillLedgerError>;

    /// Reads a whole entry into memory
    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, DrillLedgerError>;
}

impl<RS: Read + Seek> ZipHelper<RS> for ZipArchive<RS> {
    fn file(&'_ mut self, name: &str) -> Result<Option<ZipFile<'_, RS>>, DrillLedgerError> {
        let path = self.entry_name(name);
        match path.map(|file_name| self.by_name(&file_name)).transpose() {
            Ok(Some(file)) => Ok(Some(file)),
            Ok(None) | Err(ZipError::FileNotFound) => Ok(None),
            Err(error) => Err(error)?,
        }
    }

    fn entry_name(&self, name: &str) -> Option<String> {
        let pattern = name.replace('\\', "/");
        self.file_names()
            .find(|file_name| pattern.eq_ignore_ascii_case(file_name))
            .map(|file_name| file_name.to_owned())
    }

    fn xml_reader(&'_ mut self, name: &str) -> Result<Option<XmlReader<BufReader<ZipFile<'_, RS>>>>, DrillLedgerError> {
        let reader = self
            .file(name)?
            .map(|file| XmlReader::new(BufReader::new(file)));
        Ok(reader)
    }

    fn read_bytes(&mut self, name: &str) -> Result<Option<Vec<u8>>, DrillLedgerError> {
        match self.file(name)? {
            Some(mut file) => {
                let mut bytes = Vec::with_capacity(reservation(file.size()));
                file.read_to_end(&mut bytes)?;
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }
}

/// Upfront buffer size for an entry; the declared size comes from the archive and is not trusted.
fn reservation(declared: u64) -> usize {
    const LIMIT: u64 = 1 << 20;
    declared.min(LIMIT) as usize
}

/// Options for entries this crate writes itself
pub(crate) fn deflated() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::io::Write;
    use zip::ZipWriter;

    fn archive() -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("xl/workbook.xml", deflated()).unwrap();
        writer.write_all(b"<workbook/>").unwrap();
        let cursor = writer.finish().unwrap();
        ZipArchive::new(cursor).unwrap()
    }

    #[test]
    fn lookup_ignores_case_and_separators() {
        let mut zip = archive();
        assert_eq!(zip.entry_name("XL\\Workbook.xml").as_deref(), Some("xl/workbook.xml"));
        assert_eq!(zip.read_bytes("xl/WORKBOOK.xml").unwrap(), Some(b"<workbook/>".to_vec()));
    }

    #[test]
    fn missing_entries_are_none() {
        let mut zip = archive();
        assert!(zip.file("xl/styles.xml").unwrap().is_none());
        assert!(zip.xml_reader("xl/styles.xml").unwrap().is_none());
    }

    #[test]
    fn declared_size_only_bounds_the_reservation() {
        assert_eq!(reservation(11), 11);
        assert_eq!(reservation(u64::from(u32::MAX)), 1 << 20);

        let content = vec![b'x'; 3 << 20];
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("xl/worksheets/sheet1.xml", deflated()).unwrap();
        writer.write_all(&content).unwrap();
        let mut zip = ZipArchive::new(writer.finish().unwrap()).unwrap();
        assert_eq!(zip.read_bytes("xl/worksheets/sheet1.xml").unwrap(), Some(content));
    }
}
