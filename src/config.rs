//! Deployment configuration.
//!
//! Every value has a default reproducing the standard daily-log and database layouts, so an
//! empty TOML file (or no file at all) is a valid configuration.

use crate::database::layout::default_output_columns;
use crate::database::layout::OutputColumn;
use crate::error::DrillLedgerError;
use crate::error::ResultMessage;
use crate::ingest::field::SourceField;
use crate::spreadsheet::range::Range;
use crate::spreadsheet::reference::reference_to_index;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file '{0}': {1}")]
    ParseError(String, String),

    #[error("[{0}] has no entry for '{1}'")]
    MissingFieldError(String, SourceField),

    #[error("[{0}] '{1}' is not a cell reference")]
    CellReferenceError(String, String),

    #[error("[source] positional offset {1} of '{0}' is outside the column span '{2}'")]
    OffsetOutOfSpanError(SourceField, usize, String),

    #[error("[source] header row {0} must be above data row {1}")]
    RowOrderError(usize, usize),

    #[error("[database] column {0} is assigned more than once")]
    DuplicateColumnError(usize),

    #[error("[database] column numbers start at 1")]
    ZeroColumnError,

    #[error("[watch] {0} must be greater than zero")]
    ZeroWatchSettingError(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder receiving the daily log files
    pub source_folder: PathBuf,
    /// The cumulative database workbook
    pub database_file: PathBuf,
    pub source: SourceConfig,
    pub database: DatabaseConfig,
    pub watch: WatchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_folder: PathBuf::from("Daily_Data"),
            database_file: PathBuf::from("drilling_database.xlsx"),
            source: SourceConfig::default(),
            database: DatabaseConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

/// Layout of a daily drill log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Worksheet name pattern; the first worksheet when absent
    pub sheet: Option<String>,
    pub hole_id_cell: String,
    pub logging_date_cell: String,
    /// Pattern for logging dates stored as text
    pub logging_date_format: String,
    /// Column span of the tabular region
    pub columns: String,
    // Row numbers are 1-based, as shown by Excel
    pub header_row: usize,
    pub data_row: usize,
    pub positional_data_row: usize,
    pub error_as_null: bool,
    pub required_headers: BTreeMap<SourceField, String>,
    /// 0-based offsets within `columns`
    pub positional_offsets: BTreeMap<SourceField, usize>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            sheet: None,
            hole_id_cell: "B3".to_owned(),
            logging_date_cell: "L4".to_owned(),
            logging_date_format: "%Y-%m-%d %H:%M:%S".to_owned(),
            columns: "B:V".to_owned(),
            header_row: 6,
            data_row: 7,
            positional_data_row: 7,
            error_as_null: true,
            required_headers: SourceField::ALL
                .iter()
                .map(|field| (*field, field.default_label().to_owned()))
                .collect(),
            positional_offsets: SourceField::ALL
                .iter()
                .map(|field| (*field, field.default_offset()))
                .collect(),
        }
    }
}

impl SourceConfig {
    /// 0-based position of the hole identifier cell
    pub fn hole_id_position(&self) -> Result<(usize, usize), ConfigError> {
        cell_position(&self.hole_id_cell)
    }

    /// 0-based position of the logging date cell
    pub fn logging_date_position(&self) -> Result<(usize, usize), ConfigError> {
        cell_position(&self.logging_date_cell)
    }

    /// The header row must be a real row above both data rows.
    pub fn check_rows(&self) -> Result<(), ConfigError> {
        for data_row in [self.data_row, self.positional_data_row] {
            if self.header_row == 0 || self.header_row >= data_row {
                Err(ConfigError::RowOrderError(self.header_row, data_row))?;
            }
        }
        Ok(())
    }

    /// 0-based inclusive column span of the tabular region
    pub fn column_span(&self) -> Result<(usize, usize), DrillLedgerError> {
        Range::try_from(self.columns.as_str())?
            .column_span()
            .with_prefix("[source] columns")
    }
}

fn cell_position(reference: &str) -> Result<(usize, usize), ConfigError> {
    reference_to_index(reference).ok_or_else(|| ConfigError::CellReferenceError("source".to_owned(), reference.to_owned()))
}

/// Layout of the cumulative database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Worksheet name pattern; the first worksheet when absent
    pub sheet: Option<String>,
    /// Name given to the worksheet by `init`
    pub new_sheet_name: String,
    pub columns: Vec<OutputColumn>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sheet: None,
            new_sheet_name: "Sheet".to_owned(),
            columns: default_output_columns(),
        }
    }
}

/// File-stability check applied to files reported by the watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub poll_interval_ms: u64,
    /// Consecutive polls with unchanged size and modification time
    pub stable_polls: u32,
    pub settle_timeout_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            stable_polls: 3,
            settle_timeout_secs: 30,
        }
    }
}

impl WatchConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs)
    }
}

impl Config {
    /// Load config from a TOML string, falling back to defaults for missing fields.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Reads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, DrillLedgerError> {
        let file_name = path.to_string_lossy();
        let content = std::fs::read_to_string(path)
            .map_err(DrillLedgerError::from)
            .with_prefix(&file_name)?;
        let config = Config::from_toml(&content)
            .map_err(|e| ConfigError::ParseError(file_name.to_string(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the layout tables for gaps and collisions.
    pub fn validate(&self) -> Result<(), DrillLedgerError> {
        let source = &self.source;
        source.hole_id_position()?;
        source.logging_date_position()?;
        let (lower, upper) = source.column_span()?;
        for field in SourceField::ALL {
            if !source.required_headers.contains_key(&field) {
                Err(ConfigError::MissingFieldError("source.required_headers".to_owned(), field))?;
            }
            match source.positional_offsets.get(&field) {
                None => Err(ConfigError::MissingFieldError("source.positional_offsets".to_owned(), field))?,
                Some(offset) if lower + offset > upper => {
                    Err(ConfigError::OffsetOutOfSpanError(field, *offset, source.columns.to_owned()))?
                }
                Some(_) => {}
            }
        }
        source.check_rows()?;

        let mut columns = BTreeSet::new();
        for column in &self.database.columns {
            if column.column == 0 {
                Err(ConfigError::ZeroColumnError)?;
            }
            if !columns.insert(column.column) {
                Err(ConfigError::DuplicateColumnError(column.column))?;
            }
        }

        if self.watch.poll_interval_ms == 0 {
            Err(ConfigError::ZeroWatchSettingError("poll_interval_ms"))?;
        }
        if self.watch.stable_polls == 0 {
            Err(ConfigError::ZeroWatchSettingError("stable_polls"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::layout::OutputField;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.source_folder, PathBuf::from("Daily_Data"));
        assert_eq!(config.database_file, PathBuf::from("drilling_database.xlsx"));
        assert_eq!(config.source.hole_id_position().unwrap(), (2, 1));
        assert_eq!(config.source.logging_date_position().unwrap(), (3, 11));
        assert_eq!(config.source.column_span().unwrap(), (1, 21));
        assert_eq!(config.source.required_headers[&SourceField::Recovery], "RECOVERY (%)");
        assert_eq!(config.source.positional_offsets[&SourceField::MineralTertiary], 18);
        assert_eq!(config.database.columns.len(), 17);
        assert_eq!(config.watch.poll_interval(), Duration::from_millis(500));
        config.validate().unwrap();
    }

    #[test]
    fn partial_override() {
        let config = Config::from_toml(
            r#"
            source_folder = "/srv/logs"

            [source]
            sheet = "Log*"
            hole_id_cell = "C3"

            [source.positional_offsets]
            from = 0
            to = 1
            interval = 2
            actual_core = 3
            recovery = 5
            material = 7
            layer = 8
            rock = 9
            grain = 10
            weathering = 12
            colour = 13
            mineral_primary = 16
            mineral_secondary = 17
            mineral_tertiary = 18

            [watch]
            stable_polls = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.source_folder, PathBuf::from("/srv/logs"));
        assert_eq!(config.source.sheet.as_deref(), Some("Log*"));
        assert_eq!(config.source.hole_id_position().unwrap(), (2, 2));
        assert_eq!(config.source.logging_date_cell, "L4");
        assert_eq!(config.source.positional_offsets[&SourceField::Recovery], 5);
        assert_eq!(config.watch.stable_polls, 5);
        assert_eq!(config.watch.poll_interval_ms, 500);
        config.validate().unwrap();
    }

    #[test]
    fn database_columns_from_toml() {
        let config = Config::from_toml(
            r#"
            [[database.columns]]
            field = "hole_id"
            column = 1
            header = "Hole"

            [[database.columns]]
            field = "from"
            column = 2
            header = "From"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.columns.len(), 2);
        assert_eq!(config.database.columns[0].field, OutputField::HoleId);
        assert_eq!(config.database.columns[1].index(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn missing_offset_is_rejected() {
        let mut config = Config::default();
        config.source.positional_offsets.remove(&SourceField::Grain);
        let error = config.validate().unwrap_err();
        assert!(matches!(
            error,
            DrillLedgerError::ConfigError(ConfigError::MissingFieldError(_, SourceField::Grain))
        ));
    }

    #[test]
    fn offset_outside_span_is_rejected() {
        let mut config = Config::default();
        config.source.positional_offsets.insert(SourceField::MineralTertiary, 21);
        assert!(matches!(
            config.validate(),
            Err(DrillLedgerError::ConfigError(ConfigError::OffsetOutOfSpanError(SourceField::MineralTertiary, 21, _)))
        ));
    }

    #[test]
    fn duplicate_output_column_is_rejected() {
        let mut config = Config::default();
        config.database.columns[1].column = 2;
        assert!(matches!(
            config.validate(),
            Err(DrillLedgerError::ConfigError(ConfigError::DuplicateColumnError(2)))
        ));
    }

    #[test]
    fn bad_cell_reference_is_rejected() {
        let mut config = Config::default();
        config.source.logging_date_cell = "date".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_field_fails_to_parse() {
        let result = Config::from_toml("[source.positional_offsets]\ndepth = 4\n");
        assert!(result.is_err());
    }
}
