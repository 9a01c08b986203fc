use crate::config::SourceConfig;
use crate::error::DrillLedgerError;
use crate::error::ResultMessage;
use crate::ingest::field::CanonicalRow;
use crate::ingest::metadata::FileMetadata;
use crate::ingest::normalizer::RawCell;
use crate::ingest::normalizer::RawRow;
use crate::ingest::normalizer::RowNormalizer;
use crate::ingest::normalizer::RowOutcome;
use crate::ingest::resolver::resolve_columns;
use crate::ingest::resolver::ColumnMapping;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::range::Range;
use crate::spreadsheet::sheet::Sheet;
use std::path::Path;
use tracing::debug;
use tracing::info;
use tracing::warn;

/// Rows read from one daily log, all sharing its metadata.
#[derive(Debug)]
pub struct IngestedFile {
    pub metadata: FileMetadata,
    pub mapping: ColumnMapping,
    pub rows: Vec<CanonicalRow>,
    /// Rows in the tabular region whose FROM cell was blank
    pub skipped: usize,
}

/// Reads daily logs into canonical rows. Source files are only ever read.
#[derive(Clone, Debug)]
pub struct FileIngestor {
    config: SourceConfig,
    hole_id_position: (usize, usize),
    logging_date_position: (usize, usize),
    column_span: (usize, usize),
}

impl FileIngestor {
    pub fn new(config: &SourceConfig) -> Result<Self, DrillLedgerError> {
        config.check_rows()?;
        Ok(Self {
            config: config.clone(),
            hole_id_position: config.hole_id_position()?,
            logging_date_position: config.logging_date_position()?,
            column_span: config.column_span()?,
        })
    }

    /// Reads one file. Either every row is returned or the file is rejected as a whole.
    pub fn ingest(&self, path: &Path) -> Result<IngestedFile, DrillLedgerError> {
        let file_name = path.to_string_lossy();
        let sheet = self.read_sheet(path).with_prefix(&file_name)?;

        let metadata = self.read_metadata(&file_name, &sheet).inspect_err(|e| warn!("Rejected {}", e))?;
        let (lower, upper) = self.column_span;
        let header = sheet.row_values(self.config.header_row - 1, (lower, upper))?;
        let mapping = resolve_columns(&header, &self.config.required_headers, &self.config.positional_offsets);
        let first_row = match mapping.is_named() {
            true => self.config.data_row - 1,
            false => self.config.positional_data_row - 1,
        };

        let normalizer = RowNormalizer::new(&file_name, &metadata, self.config.error_as_null);
        let mut rows = Vec::new();
        let mut skipped = 0;
        if let Some(last_row) = sheet.last_row() {
            for row in first_row..=last_row {
                let raw = self.raw_row(&sheet, &mapping, row)?;
                match normalizer.normalize(&raw).inspect_err(|e| warn!("Rejected {}", e))? {
                    RowOutcome::Row(canonical) => rows.push(*canonical),
                    RowOutcome::Skip => {
                        debug!(row = row + 1, "Skipped row with blank FROM");
                        skipped += 1;
                    }
                }
            }
        }

        info!(
            file = %file_name,
            hole_id = %metadata.hole_id,
            logging_date = %metadata.logging_date,
            mapping = mapping.kind(),
            rows = rows.len(),
            skipped,
            "Ingested"
        );
        Ok(IngestedFile {
            metadata,
            mapping,
            rows,
            skipped,
        })
    }

    /// Reads the selected worksheet, keeping only the columns that matter.
    fn read_sheet(&self, path: &Path) -> Result<Sheet, DrillLedgerError> {
        let columns = [self.hole_id_position.1, self.logging_date_position.1, self.column_span.0, self.column_span.1];
        let window = Range {
            col_lower_bound: columns.iter().min().copied(),
            col_upper_bound: columns.iter().max().copied(),
            ..Range::default()
        };
        let criteria = Criteria::new(self.config.sheet.as_deref(), Some(window), self.config.error_as_null)?;
        let mut spreadsheet = open_spreadsheet(path)?;
        spreadsheet.read_sheet(&criteria)
    }

    fn read_metadata(&self, file_name: &str, sheet: &Sheet) -> Result<FileMetadata, DrillLedgerError> {
        let (row, col) = self.hole_id_position;
        let hole_id = sheet.value(row, col)?;
        let hole_id_reference = sheet.reference(row, col);
        let (row, col) = self.logging_date_position;
        let logging_date = sheet.value(row, col)?;
        let logging_date_reference = sheet.reference(row, col);
        Ok(FileMetadata::parse(
            file_name,
            (&hole_id, &hole_id_reference),
            (&logging_date, &logging_date_reference),
            &self.config.logging_date_format,
        )?)
    }

    fn raw_row(&self, sheet: &Sheet, mapping: &ColumnMapping, row: usize) -> Result<RawRow, DrillLedgerError> {
        let mut raw = RawRow::new();
        for (field, offset) in mapping.offsets() {
            let col = self.column_span.0 + offset;
            let cell = RawCell {
                reference: sheet.reference(row, col),
                value: sheet.value(row, col)?,
            };
            raw.insert(*field, cell);
        }
        Ok(raw)
    }
}
