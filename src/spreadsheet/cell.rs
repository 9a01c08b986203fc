use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use chrono::NaiveTime;
use chrono::Timelike;
use std::fmt::Display;

/// Days between the Excel 1900 epoch (1899-12-30) and the 1904 epoch.
const EPOCH_1904_OFFSET: i64 = 1_462;
const MILLISECONDS_PER_DAY: f64 = 86_400_000f64;

/// Storage types of cell data as read from a workbook.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub(crate) enum CellType {
    #[default]
    Empty,
    /// Boolean values stored as "1"/"0"
    Boolean,
    /// Numeric values
    Number,
    /// Date/time values stored as numbers from 1900 epoch
    NumberDateTime1900,
    /// Date values stored as numbers from 1900 epoch
    NumberDate1900,
    /// Time values stored as numbers from 1900 epoch
    NumberTime1900,
    /// Date/time values stored as numbers from 1904 epoch
    NumberDateTime1904,
    /// Date values stored as numbers from 1904 epoch
    NumberDate1904,
    /// Time values stored as numbers from 1904 epoch
    NumberTime1904,
    /// ISO 8601 date/time strings (`t="d"` cells)
    IsoDateTime,
    /// Text, with shared strings already resolved
    Text,
    /// Error values such as `#N/A`
    Error,
}

impl CellType {
    /// Parses built-in Excel number format IDs to determine cell type.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Parses custom number format strings to determine cell type.
    /// Literal text, escapes and bracketed sections (colours, locales) are ignored.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }

    fn is_1904(self) -> bool {
        matches!(self, Self::NumberDateTime1904 | Self::NumberDate1904 | Self::NumberTime1904)
    }
}

/// Converts Excel error codes to human-readable error strings.
pub(crate) fn to_error_value(value: u8) -> &'static str {
    match value {
        0x00 => "#NULL!",
        0x07 => "#DIV/0!",
        0x0F => "#VALUE!",
        0x17 => "#REF!",
        0x1D => "#NAME?",
        0x24 => "#NUM!",
        0x2A => "#N/A",
        0x2B => "#GETTING_DATA",
        _ => "#ERROR!",
    }
}

/// A typed cell value.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Error(String),
}

impl CellValue {
    /// True for empty cells and whitespace-only text; error cells count as blank when `error_as_null`.
    pub fn is_blank(&self, error_as_null: bool) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(text) => text.trim().is_empty(),
            CellValue::Error(_) => error_as_null,
            _ => false,
        }
    }

    /// Renders the value as text: integral numbers without a fraction, booleans as `true`/`false`,
    /// date-times as `YYYY-MM-DD HH:MM:SS`.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(value) => value.to_string(),
            CellValue::Number(value) => value.to_string(),
            CellValue::Text(value) | CellValue::Error(value) => value.to_owned(),
            CellValue::Date(value) => value.format("%Y-%m-%d").to_string(),
            CellValue::DateTime(value) => value.format("%Y-%m-%d %H:%M:%S").to_string(),
            CellValue::Time(value) => value.format("%H:%M:%S").to_string(),
        }
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Represents a single cell in a spreadsheet with position, type, and raw value.
#[derive(Clone, Debug)]
pub(crate) struct Cell {
    /// Row index (0-based)
    pub(crate) row: usize,
    /// Column index (0-based)
    pub(crate) col: usize,
    /// Cell data type
    pub(crate) kind: CellType,
    /// Cell value as stored
    pub(crate) value: String,
}

impl Cell {
    /// Returns the Excel-style cell reference (e.g., "A1", "B2").
    pub(crate) fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// Converts cell value to double-precision floating point.
    fn to_double(&self) -> Result<f64, String> {
        self.value.trim().parse::<f64>().map_err(|_| format!("parse '{}' to double failed", self.value))
    }

    /// Interprets the stored value according to its type.
    pub(crate) fn to_value(&self) -> Result<CellValue, String> {
        let value = match self.kind {
            CellType::Empty => CellValue::Empty,
            CellType::Boolean => CellValue::Bool(self.value == "1" || self.value.eq_ignore_ascii_case("true")),
            CellType::Number => CellValue::Number(self.to_double()?),
            CellType::NumberDate1900 | CellType::NumberDate1904 => {
                let datetime = serial_to_datetime(self.to_double()?, self.kind.is_1904())
                    .ok_or_else(|| format!("parse '{}' to date failed", self.value))?;
                CellValue::Date(datetime.date())
            }
            CellType::NumberDateTime1900 | CellType::NumberDateTime1904 => {
                let datetime = serial_to_datetime(self.to_double()?, self.kind.is_1904())
                    .ok_or_else(|| format!("parse '{}' to datetime failed", self.value))?;
                CellValue::DateTime(datetime)
            }
            CellType::NumberTime1900 | CellType::NumberTime1904 => {
                let datetime = serial_to_datetime(self.to_double()?.fract(), false)
                    .ok_or_else(|| format!("parse '{}' to time failed", self.value))?;
                CellValue::Time(datetime.time())
            }
            CellType::IsoDateTime => parse_iso_datetime(&self.value)
                .ok_or_else(|| format!("parse '{}' to iso datetime failed", self.value))?,
            CellType::Text => CellValue::Text(self.value.to_owned()),
            CellType::Error => CellValue::Error(self.value.to_owned()),
        };
        Ok(value)
    }
}

fn parse_iso_datetime(value: &str) -> Option<CellValue> {
    if value.contains('T') {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(CellValue::DateTime)
    } else {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").ok().map(CellValue::Date)
    }
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Converts an Excel serial number to a date-time.
/// Serials below 60 predate the fictitious 1900-02-29 and are shifted by one day.
pub(crate) fn serial_to_datetime(serial: f64, is_1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    let offset = if is_1904 {
        EPOCH_1904_OFFSET
    } else if days < 60 {
        1
    } else {
        0
    };
    let milliseconds = (serial.fract() * MILLISECONDS_PER_DAY).round() as i64;
    epoch()
        .checked_add_signed(Duration::try_days(days + offset)?)?
        .checked_add_signed(Duration::try_milliseconds(milliseconds)?)
}

/// Converts a date to its serial number in the 1900 date system.
pub(crate) fn date_to_serial(date: NaiveDate) -> f64 {
    let days = (date - epoch().date()).num_days();
    (if days <= 60 { days - 1 } else { days }) as f64
}

/// Converts a date-time to its serial number in the 1900 date system.
pub(crate) fn datetime_to_serial(datetime: NaiveDateTime) -> f64 {
    date_to_serial(datetime.date()) + time_to_serial(datetime.time())
}

/// Converts a time of day to a fraction of a day.
pub(crate) fn time_to_serial(time: NaiveTime) -> f64 {
    let milliseconds = time.num_seconds_from_midnight() as f64 * 1_000f64 + (time.nanosecond() / 1_000_000) as f64;
    milliseconds / MILLISECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell {
            row: 3,
            col: 11,
            kind,
            value: value.to_owned(),
        }
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn custom_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd hh:mm:ss", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("[h]:mm", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("hh:mm", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("0.00\"days\"", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.00", false), CellType::Number);
    }

    #[test]
    fn serial_dates() {
        assert_eq!(serial_to_datetime(45352.0, false).unwrap().date(), date(2024, 3, 1));
        assert_eq!(serial_to_datetime(1.0, false).unwrap().date(), date(1900, 1, 1));
        assert_eq!(serial_to_datetime(61.0, false).unwrap().date(), date(1900, 3, 1));
        assert_eq!(serial_to_datetime(0.0, true).unwrap().date(), date(1904, 1, 1));
        assert_eq!(serial_to_datetime(-1.0, false), None);

        assert_eq!(date_to_serial(date(2024, 3, 1)), 45352.0);
        assert_eq!(date_to_serial(date(1900, 1, 1)), 1.0);
        assert_eq!(date_to_serial(date(1900, 3, 1)), 61.0);
    }

    #[test]
    fn serial_datetimes() {
        let value = cell(CellType::NumberDateTime1900, "45352.5").to_value().unwrap();
        let expected = date(2024, 3, 1).and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(value, CellValue::DateTime(expected));
        assert_eq!(datetime_to_serial(expected), 45352.5);
        assert_eq!(value.to_text(), "2024-03-01 12:00:00");
    }

    #[test]
    fn typed_values() {
        assert_eq!(cell(CellType::Number, "85").to_value().unwrap(), CellValue::Number(85.0));
        assert_eq!(cell(CellType::Boolean, "1").to_value().unwrap(), CellValue::Bool(true));
        assert_eq!(cell(CellType::Text, "GRANITE").to_value().unwrap(), CellValue::Text("GRANITE".to_owned()));
        assert_eq!(cell(CellType::IsoDateTime, "2024-03-01").to_value().unwrap(), CellValue::Date(date(2024, 3, 1)));
        assert!(cell(CellType::Number, "abc").to_value().is_err());
        assert_eq!(cell(CellType::Number, "1").reference(), "L4");
    }

    #[test]
    fn text_rendering() {
        assert_eq!(CellValue::Number(12.0).to_text(), "12");
        assert_eq!(CellValue::Number(1.25).to_text(), "1.25");
        assert_eq!(CellValue::Bool(true).to_text(), "true");
        assert_eq!(CellValue::Empty.to_text(), "");
        assert!(CellValue::Text("  ".to_owned()).is_blank(true));
        assert!(CellValue::Error("#N/A".to_owned()).is_blank(true));
        assert!(!CellValue::Error("#N/A".to_owned()).is_blank(false));
        assert!(!CellValue::Number(0.0).is_blank(true));
    }
}
