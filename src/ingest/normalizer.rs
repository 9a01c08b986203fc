use crate::ingest::field::CanonicalRow;
use crate::ingest::field::SourceField;
use crate::ingest::metadata::FileMetadata;
use crate::spreadsheet::cell::CellValue;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RowError {
    #[error("'{0}': {1} at {2} is not a number: '{3}'")]
    NumberError(String, SourceField, String, String),
}

/// One source cell as located by the column mapping.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawCell {
    /// Reference used in error messages, e.g. `Log!B7`
    pub reference: String,
    pub value: CellValue,
}

pub type RawRow = BTreeMap<SourceField, RawCell>;

#[derive(Debug, PartialEq)]
pub enum RowOutcome {
    /// The FROM cell is blank
    Skip,
    Row(Box<CanonicalRow>),
}

/// Builds canonical rows for one file; metadata is validated before this exists.
pub struct RowNormalizer<'a> {
    file_name: &'a str,
    metadata: &'a FileMetadata,
    error_as_null: bool,
}

impl<'a> RowNormalizer<'a> {
    pub fn new(file_name: &'a str, metadata: &'a FileMetadata, error_as_null: bool) -> Self {
        Self {
            file_name,
            metadata,
            error_as_null,
        }
    }

    pub fn normalize(&self, row: &RawRow) -> Result<RowOutcome, RowError> {
        if self.is_blank(row, SourceField::From) {
            return Ok(RowOutcome::Skip);
        }
        let from = self.number(row, SourceField::From)?.unwrap_or_default();
        let recovery = match self.number(row, SourceField::Recovery)? {
            Some(percentage) => percentage / 100.0,
            None => 1.0,
        };
        Ok(RowOutcome::Row(Box::new(CanonicalRow {
            logging_date: self.metadata.logging_date,
            hole_id: self.metadata.hole_id.to_owned(),
            from,
            to: self.number(row, SourceField::To)?,
            length: self.number(row, SourceField::Interval)?,
            actual_core: self.number(row, SourceField::ActualCore)?,
            recovery,
            material_code: self.code(row, SourceField::Material),
            layer_code: self.code(row, SourceField::Layer),
            rock_code: self.code(row, SourceField::Rock),
            grain_code: self.code(row, SourceField::Grain),
            weathering: self.original(row, SourceField::Weathering),
            colour_code: self.code(row, SourceField::Colour),
            mineral_primary: self.code(row, SourceField::MineralPrimary),
            mineral_secondary: self.code(row, SourceField::MineralSecondary),
            mineral_tertiary: self.code(row, SourceField::MineralTertiary),
            boulder_length: None,
        })))
    }

    fn is_blank(&self, row: &RawRow, field: SourceField) -> bool {
        row.get(&field).map(|cell| cell.value.is_blank(self.error_as_null)).unwrap_or(true)
    }

    fn non_blank<'r>(&self, row: &'r RawRow, field: SourceField) -> Option<&'r RawCell> {
        row.get(&field).filter(|cell| !cell.value.is_blank(self.error_as_null))
    }

    /// Numbers pass through unchanged; numeric text is parsed, anything else is an error.
    fn number(&self, row: &RawRow, field: SourceField) -> Result<Option<f64>, RowError> {
        let Some(cell) = self.non_blank(row, field) else {
            return Ok(None);
        };
        match &cell.value {
            CellValue::Number(value) => Ok(Some(*value)),
            CellValue::Text(text) => text.trim().parse::<f64>().map(Some).map_err(|_| self.number_error(field, cell)),
            _ => Err(self.number_error(field, cell)),
        }
    }

    fn number_error(&self, field: SourceField, cell: &RawCell) -> RowError {
        RowError::NumberError(self.file_name.to_owned(), field, cell.reference.to_owned(), cell.value.to_text())
    }

    /// Lower-cased text, or an empty string when blank.
    fn code(&self, row: &RawRow, field: SourceField) -> String {
        self.non_blank(row, field)
            .map(|cell| cell.value.to_text().to_lowercase())
            .unwrap_or_default()
    }

    fn original(&self, row: &RawRow, field: SourceField) -> Option<CellValue> {
        self.non_blank(row, field).map(|cell| cell.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn metadata() -> FileMetadata {
        FileMetadata {
            hole_id: "C06-090".to_owned(),
            logging_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    fn raw(values: &[(SourceField, CellValue)]) -> RawRow {
        values
            .iter()
            .map(|(field, value)| {
                let cell = RawCell {
                    reference: format!("Log!{}7", field.default_offset()),
                    value: value.clone(),
                };
                (*field, cell)
            })
            .collect()
    }

    fn text(value: &str) -> CellValue {
        CellValue::Text(value.to_owned())
    }

    fn normalize(values: &[(SourceField, CellValue)]) -> RowOutcome {
        let metadata = metadata();
        RowNormalizer::new("C06-090.xlsx", &metadata, true).normalize(&raw(values)).unwrap()
    }

    fn row(values: &[(SourceField, CellValue)]) -> CanonicalRow {
        match normalize(values) {
            RowOutcome::Row(row) => *row,
            RowOutcome::Skip => panic!("row was skipped"),
        }
    }

    #[test]
    fn blank_from_skips() {
        assert_eq!(normalize(&[]), RowOutcome::Skip);
        assert_eq!(normalize(&[(SourceField::From, CellValue::Empty), (SourceField::To, CellValue::Number(3.0))]), RowOutcome::Skip);
        assert_eq!(normalize(&[(SourceField::From, text("  "))]), RowOutcome::Skip);
        assert_eq!(normalize(&[(SourceField::From, CellValue::Error("#N/A".to_owned()))]), RowOutcome::Skip);
    }

    #[test]
    fn recovery_fraction() {
        let base = (SourceField::From, CellValue::Number(0.0));
        assert_eq!(row(&[base.clone(), (SourceField::Recovery, CellValue::Number(85.0))]).recovery, 0.85);
        assert_eq!(row(&[base.clone(), (SourceField::Recovery, CellValue::Empty)]).recovery, 1.0);
        assert_eq!(row(&[base.clone()]).recovery, 1.0);
        assert_eq!(row(&[base, (SourceField::Recovery, text("50"))]).recovery, 0.5);
    }

    #[test]
    fn codes_are_lower_cased() {
        let row = row(&[
            (SourceField::From, CellValue::Number(1.5)),
            (SourceField::Material, text("GRANITE")),
            (SourceField::Rock, CellValue::Number(12.0)),
            (SourceField::MineralPrimary, text("Qz")),
        ]);
        assert_eq!(row.material_code, "granite");
        assert_eq!(row.rock_code, "12");
        assert_eq!(row.mineral_primary, "qz");
        assert_eq!(row.layer_code, "");
        assert_eq!(row.mineral_tertiary, "");
    }

    #[test]
    fn weathering_keeps_its_type() {
        let from = (SourceField::From, CellValue::Number(0.0));
        assert_eq!(row(&[from.clone(), (SourceField::Weathering, text("HW"))]).weathering, Some(text("HW")));
        assert_eq!(
            row(&[from.clone(), (SourceField::Weathering, CellValue::Number(2.0))]).weathering,
            Some(CellValue::Number(2.0))
        );
        assert_eq!(row(&[from]).weathering, None);
    }

    #[test]
    fn metadata_and_numbers_are_copied() {
        let row = row(&[
            (SourceField::From, CellValue::Number(10.0)),
            (SourceField::To, CellValue::Number(11.5)),
            (SourceField::Interval, CellValue::Number(1.5)),
            (SourceField::ActualCore, text(" 1.2 ")),
        ]);
        assert_eq!(row.hole_id, "C06-090");
        assert_eq!(row.logging_date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(row.from, 10.0);
        assert_eq!(row.to, Some(11.5));
        assert_eq!(row.length, Some(1.5));
        assert_eq!(row.actual_core, Some(1.2));
        assert_eq!(row.boulder_length, None);
    }

    #[test]
    fn non_numeric_depth_is_an_error() {
        let metadata = metadata();
        let normalizer = RowNormalizer::new("C06-090.xlsx", &metadata, true);
        let error = normalizer
            .normalize(&raw(&[(SourceField::From, CellValue::Number(1.0)), (SourceField::To, text("end"))]))
            .unwrap_err();
        assert_eq!(error.to_string(), "'C06-090.xlsx': TO at Log!17 is not a number: 'end'");
    }

    #[test]
    fn error_cells_fail_when_not_null() {
        let metadata = metadata();
        let normalizer = RowNormalizer::new("C06-090.xlsx", &metadata, false);
        let result = normalizer.normalize(&raw(&[(SourceField::From, CellValue::Error("#REF!".to_owned()))]));
        assert!(matches!(result, Err(RowError::NumberError(_, SourceField::From, _, _))));
    }
}
