use crate::spreadsheet::cell::CellValue;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;

/// The fourteen columns read from the tabular region of a daily log.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceField {
    From,
    To,
    Interval,
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
}

impl SourceField {
    /// All fields in column order; `From` comes first and decides whether a row is blank.
    pub const ALL: [SourceField; 14] = [
        SourceField::From,
        SourceField::To,
        SourceField::Interval,
        SourceField::ActualCore,
        SourceField::Recovery,
        SourceField::Material,
        SourceField::Layer,
        SourceField::Rock,
        SourceField::Grain,
        SourceField::Weathering,
        SourceField::Colour,
        SourceField::MineralPrimary,
        SourceField::MineralSecondary,
        SourceField::MineralTertiary,
    ];

    /// Header label of the field in the standard daily log.
    pub fn default_label(self) -> &'static str {
        match self {
            SourceField::From => "FROM",
            SourceField::To => "TO",
            SourceField::Interval => "INTERVAL (M)",
            SourceField::ActualCore => "ACT CORE (M)",
            SourceField::Recovery => "RECOVERY (%)",
            SourceField::Material => "GENERAL LITHOLOGY",
            SourceField::Layer => "SUB GEN LITHOLOGY",
            SourceField::Rock => "ROCK CODE",
            SourceField::Grain => "GRAIN SIZE",
            SourceField::Weathering => "WEATHERING",
            SourceField::Colour => "COLOUR PRIMARY",
            SourceField::MineralPrimary => "MINERALS PRIMARY",
            SourceField::MineralSecondary => "MINERALS SECONDARY",
            SourceField::MineralTertiary => "MINERALS TERTIARY",
        }
    }

    /// 0-based offset of the field within the `B:V` span of the legacy layout without headers.
    pub fn default_offset(self) -> usize {
        match self {
            SourceField::From => 0,
            SourceField::To => 1,
            SourceField::Interval => 2,
            SourceField::ActualCore => 3,
            SourceField::Recovery => 6,
            SourceField::Material => 7,
            SourceField::Layer => 8,
            SourceField::Rock => 9,
            SourceField::Grain => 10,
            SourceField::Weathering => 12,
            SourceField::Colour => 13,
            SourceField::MineralPrimary => 16,
            SourceField::MineralSecondary => 17,
            SourceField::MineralTertiary => 18,
        }
    }
}

impl Display for SourceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.default_label())
    }
}

/// One normalized drill-log interval.
#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalRow {
    pub logging_date: NaiveDate,
    pub hole_id: String,
    pub from: f64,
    pub to: Option<f64>,
    pub length: Option<f64>,
    pub actual_core: Option<f64>,
    /// Fraction between 0 and 1; exactly 1.0 when the log leaves recovery blank
    pub recovery: f64,
    pub material_code: String,
    pub layer_code: String,
    pub rock_code: String,
    pub grain_code: String,
    /// Kept with its original cell type
    pub weathering: Option<CellValue>,
    pub colour_code: String,
    pub mineral_primary: String,
    pub mineral_secondary: String,
    pub mineral_tertiary: String,
    /// Filled in by a later enrichment step, never at ingestion
    pub boulder_length: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn defaults_are_distinct() {
        let labels: HashSet<_> = SourceField::ALL.iter().map(|field| field.default_label()).collect();
        let offsets: HashSet<_> = SourceField::ALL.iter().map(|field| field.default_offset()).collect();
        assert_eq!(labels.len(), 14);
        assert_eq!(offsets.len(), 14);
        assert!(offsets.iter().all(|offset| *offset <= 20));
    }

    #[test]
    fn serde_names() {
        let json = toml::to_string(&std::collections::BTreeMap::from([(SourceField::ActualCore, 3)])).unwrap();
        assert_eq!(json.trim(), "actual_core = 3");
    }
}
