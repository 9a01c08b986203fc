use crate::ingest::field::CanonicalRow;
use crate::spreadsheet::cell::CellValue;
use serde::Deserialize;
use serde::Serialize;

/// Fields that can be persisted to the database sheet.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputField {
    LoggingDate,
    HoleId,
    From,
    To,
    Length,
    ActualCore,
    Recovery,
    Material,
    Layer,
    Rock,
    Grain,
    Weathering,
    Colour,
    MineralPrimary,
    MineralSecondary,
    MineralTertiary,
    BoulderLength,
}

impl OutputField {
    /// The cell written for this field; empty codes and missing numbers produce `Empty`.
    pub fn value(self, row: &CanonicalRow) -> CellValue {
        let number = |value: Option<f64>| value.map(CellValue::Number).unwrap_or_default();
        let code = |value: &str| match value.is_empty() {
            true => CellValue::Empty,
            false => CellValue::Text(value.to_owned()),
        };
        match self {
            OutputField::LoggingDate => CellValue::Date(row.logging_date),
            OutputField::HoleId => CellValue::Text(row.hole_id.to_owned()),
            OutputField::From => CellValue::Number(row.from),
            OutputField::To => number(row.to),
            OutputField::Length => number(row.length),
            OutputField::ActualCore => number(row.actual_core),
            OutputField::Recovery => CellValue::Number(row.recovery),
            OutputField::Material => code(&row.material_code),
            OutputField::Layer => code(&row.layer_code),
            OutputField::Rock => code(&row.rock_code),
            OutputField::Grain => code(&row.grain_code),
            OutputField::Weathering => row.weathering.clone().unwrap_or_default(),
            OutputField::Colour => code(&row.colour_code),
            OutputField::MineralPrimary => code(&row.mineral_primary),
            OutputField::MineralSecondary => code(&row.mineral_secondary),
            OutputField::MineralTertiary => code(&row.mineral_tertiary),
            OutputField::BoulderLength => number(row.boulder_length),
        }
    }
}

/// Where one field lands in the database sheet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutputColumn {
    pub field: OutputField,
    /// 1-based column number
    pub column: usize,
    /// Label written to row 1 of an empty database
    pub header: String,
}

impl OutputColumn {
    pub fn new(field: OutputField, column: usize, header: &str) -> Self {
        Self {
            field,
            column,
            header: header.to_owned(),
        }
    }

    /// 0-based column index
    pub fn index(&self) -> usize {
        self.column.saturating_sub(1)
    }
}

/// The legacy database layout. Columns 1, 13, 16, 17 and 21 stay unwritten.
pub fn default_output_columns() -> Vec<OutputColumn> {
    vec![
        OutputColumn::new(OutputField::LoggingDate, 2, "Date Logging"),
        OutputColumn::new(OutputField::HoleId, 3, "Hole ID"),
        OutputColumn::new(OutputField::From, 4, "From"),
        OutputColumn::new(OutputField::To, 5, "To"),
        OutputColumn::new(OutputField::Length, 6, "Length"),
        OutputColumn::new(OutputField::ActualCore, 7, "Actual Core"),
        OutputColumn::new(OutputField::Recovery, 8, "Recovery percentage"),
        OutputColumn::new(OutputField::Material, 9, "Material Code"),
        OutputColumn::new(OutputField::Layer, 10, "Layer Code"),
        OutputColumn::new(OutputField::Rock, 11, "Rock Code"),
        OutputColumn::new(OutputField::Grain, 12, "Grain"),
        OutputColumn::new(OutputField::Weathering, 14, "Weath"),
        OutputColumn::new(OutputField::Colour, 15, "Colour"),
        OutputColumn::new(OutputField::MineralPrimary, 18, "Minerals Pri"),
        OutputColumn::new(OutputField::MineralSecondary, 19, "Minerals Sec"),
        OutputColumn::new(OutputField::MineralTertiary, 20, "Minerals Ter"),
        OutputColumn::new(OutputField::BoulderLength, 22, "Boulder length"),
    ]
}

/// Cells of one database row as (0-based column, value), sorted by column, blanks omitted.
pub fn row_cells(columns: &[OutputColumn], row: &CanonicalRow) -> Vec<(usize, CellValue)> {
    let mut cells: Vec<(usize, CellValue)> = columns
        .iter()
        .map(|column| (column.index(), column.field.value(row)))
        .filter(|(_, value)| *value != CellValue::Empty)
        .collect();
    cells.sort_by_key(|(col, _)| *col);
    cells
}

/// Header cells as (0-based column, label), sorted by column.
pub fn header_cells(columns: &[OutputColumn]) -> Vec<(usize, CellValue)> {
    let mut cells: Vec<(usize, CellValue)> = columns
        .iter()
        .map(|column| (column.index(), CellValue::Text(column.header.to_owned())))
        .collect();
    cells.sort_by_key(|(col, _)| *col);
    cells
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDate;

    pub(crate) fn sample_row() -> CanonicalRow {
        CanonicalRow {
            logging_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            hole_id: "C06-090".to_owned(),
            from: 0.0,
            to: Some(1.5),
            length: Some(1.5),
            actual_core: Some(1.2),
            recovery: 0.85,
            material_code: "granite".to_owned(),
            layer_code: "gr".to_owned(),
            rock_code: "igr".to_owned(),
            grain_code: "m".to_owned(),
            weathering: Some(CellValue::Text("W2".to_owned())),
            colour_code: "gy".to_owned(),
            mineral_primary: "qz".to_owned(),
            mineral_secondary: String::new(),
            mineral_tertiary: String::new(),
            boulder_length: None,
        }
    }

    #[test]
    fn default_columns_skip_reserved_positions() {
        let columns = default_output_columns();
        let used: Vec<usize> = columns.iter().map(|column| column.column).collect();
        for unwritten in [1, 13, 16, 17, 21] {
            assert!(!used.contains(&unwritten));
        }
        assert_eq!(columns.len(), 17);
    }

    #[test]
    fn blank_fields_are_not_written() {
        let cells = row_cells(&default_output_columns(), &sample_row());
        // mineral secondary, tertiary and boulder length are blank
        assert_eq!(cells.len(), 14);
        assert_eq!(cells[0], (1, CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())));
        assert_eq!(cells[1], (2, CellValue::Text("C06-090".to_owned())));
        assert!(cells.contains(&(7, CellValue::Number(0.85))));
        assert!(cells.contains(&(13, CellValue::Text("W2".to_owned()))));
    }

    #[test]
    fn header_labels() {
        let cells = header_cells(&default_output_columns());
        assert_eq!(cells.first(), Some(&(1, CellValue::Text("Date Logging".to_owned()))));
        assert_eq!(cells.last(), Some(&(21, CellValue::Text("Boulder length".to_owned()))));
    }
}
