use crate::config::DatabaseConfig;
use crate::database::layout::OutputField;
use crate::error::DrillLedgerError;
use crate::error::ResultMessage;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::criteria::Criteria;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::sheet::Sheet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// The database fields the statistics look at, read back from one row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatabaseRecord {
    pub hole_id: Option<String>,
    pub from: Option<f64>,
    pub to: Option<f64>,
    pub length: Option<f64>,
    pub recovery: Option<f64>,
    pub material_code: Option<String>,
}

/// Reads every data row (row 2 onwards) of the database worksheet.
pub fn load_records(path: &Path, config: &DatabaseConfig) -> Result<Vec<DatabaseRecord>, DrillLedgerError> {
    let file_name = path.to_string_lossy();
    let criteria = Criteria::new(config.sheet.as_deref(), None, true)?;
    let sheet = open_spreadsheet(path)
        .and_then(|mut spreadsheet| spreadsheet.read_sheet(&criteria))
        .with_prefix(&file_name)?;
    let column = |field: OutputField| {
        config
            .columns
            .iter()
            .find(|column| column.field == field)
            .map(|column| column.index())
    };
    let columns = RecordColumns {
        hole_id: column(OutputField::HoleId),
        from: column(OutputField::From),
        to: column(OutputField::To),
        length: column(OutputField::Length),
        recovery: column(OutputField::Recovery),
        material_code: column(OutputField::Material),
    };

    let mut records = Vec::new();
    if let Some(last_row) = sheet.last_row() {
        for row in 1..=last_row {
            let record = columns.read(&sheet, row)?;
            if record != DatabaseRecord::default() {
                records.push(record);
            }
        }
    }
    debug!(database = %file_name, records = records.len(), "Loaded database records");
    Ok(records)
}

struct RecordColumns {
    hole_id: Option<usize>,
    from: Option<usize>,
    to: Option<usize>,
    length: Option<usize>,
    recovery: Option<usize>,
    material_code: Option<usize>,
}

impl RecordColumns {
    fn read(&self, sheet: &Sheet, row: usize) -> Result<DatabaseRecord, DrillLedgerError> {
        let value = |col: Option<usize>| -> Result<CellValue, DrillLedgerError> {
            match col {
                Some(col) => sheet.value(row, col),
                None => Ok(CellValue::Empty),
            }
        };
        Ok(DatabaseRecord {
            hole_id: text(value(self.hole_id)?),
            from: number(value(self.from)?),
            to: number(value(self.to)?),
            length: number(value(self.length)?),
            recovery: number(value(self.recovery)?),
            material_code: text(value(self.material_code)?),
        })
    }
}

fn text(value: CellValue) -> Option<String> {
    Some(value.to_text().trim().to_owned()).filter(|text| !text.is_empty())
}

fn number(value: CellValue) -> Option<f64> {
    match value {
        CellValue::Number(number) => Some(number),
        CellValue::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Headline figures of the database. Every figure is zero for an empty database.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Summary {
    pub rows: usize,
    /// Distinct hole identifiers in order of first appearance
    pub hole_ids: Vec<String>,
    /// Mean interval length
    pub average_length: f64,
    /// Largest `To`
    pub deepest: f64,
    /// Smallest `From`
    pub shallowest: f64,
}

impl Summary {
    pub fn from_records(records: &[DatabaseRecord]) -> Self {
        let mut seen = HashSet::new();
        let hole_ids = records
            .iter()
            .filter_map(|record| record.hole_id.as_deref())
            .filter(|hole_id| seen.insert(*hole_id))
            .map(str::to_owned)
            .collect();
        let lengths: Vec<f64> = records.iter().filter_map(|record| record.length).collect();
        let average_length = match lengths.is_empty() {
            true => 0.0,
            false => lengths.iter().sum::<f64>() / lengths.len() as f64,
        };
        Summary {
            rows: records.len(),
            hole_ids,
            average_length,
            deepest: records.iter().filter_map(|record| record.to).reduce(f64::max).unwrap_or_default(),
            shallowest: records.iter().filter_map(|record| record.from).reduce(f64::min).unwrap_or_default(),
        }
    }

    pub fn total_holes(&self) -> usize {
        self.hole_ids.len()
    }
}

/// Mean recovery fraction for each distinct `From` depth, shallowest first.
pub fn recovery_by_depth(records: &[DatabaseRecord]) -> Vec<(f64, f64)> {
    let mut samples: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|record| record.from.zip(record.recovery))
        .collect();
    samples.sort_by(|left, right| left.0.total_cmp(&right.0));
    let mut series: Vec<(f64, f64, usize)> = Vec::new();
    for (depth, recovery) in samples {
        match series.last_mut() {
            Some((last_depth, total, count)) if *last_depth == depth => {
                *total += recovery;
                *count += 1;
            }
            _ => series.push((depth, recovery, 1)),
        }
    }
    series
        .into_iter()
        .map(|(depth, total, count)| (depth, total / count as f64))
        .collect()
}

/// Rows per material code, most frequent first; ties ordered by code.
pub fn material_counts(records: &[DatabaseRecord]) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for code in records.iter().filter_map(|record| record.material_code.as_deref()) {
        *counts.entry(code).or_default() += 1;
    }
    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(code, count)| (code.to_owned(), count))
        .collect();
    counts.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
    counts
}
