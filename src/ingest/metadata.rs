use crate::spreadsheet::cell::CellValue;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Reasons a whole file is rejected before any of its rows are read.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("'{0}': hole identifier at {1} is missing")]
    MissingHoleIdError(String, String),

    #[error("'{0}': logging date at {1} is missing")]
    MissingLoggingDateError(String, String),

    #[error("'{0}': logging date at {1} is not a date: '{2}'")]
    LoggingDateError(String, String, String),
}

/// Values shared by every row of one daily log.
#[derive(Clone, Debug, PartialEq)]
pub struct FileMetadata {
    pub hole_id: String,
    pub logging_date: NaiveDate,
}

/// The trimmed hole identifier, if the cell holds any text.
pub fn parse_hole_id(value: &CellValue) -> Option<String> {
    match value {
        CellValue::Empty | CellValue::Error(_) => None,
        value => Some(value.to_text().trim().to_owned()).filter(|hole_id| !hole_id.is_empty()),
    }
}

/// Outcome of reading the logging date cell
#[derive(Debug, PartialEq)]
pub enum LoggingDate {
    Missing,
    Invalid,
    Date(NaiveDate),
}

/// Accepts native dates and date-times, or text in the given `chrono` format.
pub fn parse_logging_date(value: &CellValue, format: &str) -> LoggingDate {
    match value {
        CellValue::Date(date) => LoggingDate::Date(*date),
        CellValue::DateTime(datetime) => LoggingDate::Date(datetime.date()),
        CellValue::Text(text) if !text.trim().is_empty() => {
            let text = text.trim();
            NaiveDateTime::parse_from_str(text, format)
                .map(|datetime| datetime.date())
                .or_else(|_| NaiveDate::parse_from_str(text, format))
                .map(LoggingDate::Date)
                .unwrap_or(LoggingDate::Invalid)
        }
        CellValue::Empty | CellValue::Text(_) | CellValue::Error(_) => LoggingDate::Missing,
        CellValue::Bool(_) | CellValue::Number(_) | CellValue::Time(_) => LoggingDate::Invalid,
    }
}

impl FileMetadata {
    /// Validates both metadata cells; `*_reference` name the cells in error messages.
    pub fn parse(
        file_name: &str,
        (hole_id, hole_id_reference): (&CellValue, &str),
        (logging_date, logging_date_reference): (&CellValue, &str),
        format: &str,
    ) -> Result<Self, MetadataError> {
        let hole_id = parse_hole_id(hole_id)
            .ok_or_else(|| MetadataError::MissingHoleIdError(file_name.to_owned(), hole_id_reference.to_owned()))?;
        let logging_date = match parse_logging_date(logging_date, format) {
            LoggingDate::Date(date) => date,
            LoggingDate::Missing => Err(MetadataError::MissingLoggingDateError(
                file_name.to_owned(),
                logging_date_reference.to_owned(),
            ))?,
            LoggingDate::Invalid => Err(MetadataError::LoggingDateError(
                file_name.to_owned(),
                logging_date_reference.to_owned(),
                logging_date.to_text(),
            ))?,
        };
        Ok(FileMetadata { hole_id, logging_date })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn hole_ids() {
        assert_eq!(parse_hole_id(&CellValue::Text(" C06-090 ".to_owned())), Some("C06-090".to_owned()));
        assert_eq!(parse_hole_id(&CellValue::Number(90.0)), Some("90".to_owned()));
        assert_eq!(parse_hole_id(&CellValue::Text("   ".to_owned())), None);
        assert_eq!(parse_hole_id(&CellValue::Empty), None);
        assert_eq!(parse_hole_id(&CellValue::Error("#N/A".to_owned())), None);
    }

    #[test]
    fn logging_dates() {
        let expected = LoggingDate::Date(date(2024, 3, 1));
        assert_eq!(parse_logging_date(&CellValue::Date(date(2024, 3, 1)), FORMAT), expected);
        assert_eq!(
            parse_logging_date(&CellValue::DateTime(date(2024, 3, 1).and_hms_opt(7, 30, 0).unwrap()), FORMAT),
            expected
        );
        assert_eq!(parse_logging_date(&CellValue::Text("2024-03-01 00:00:00".to_owned()), FORMAT), expected);
        assert_eq!(parse_logging_date(&CellValue::Text("2024-03-01".to_owned()), "%Y-%m-%d"), expected);
        assert_eq!(parse_logging_date(&CellValue::Text("01/03/2024".to_owned()), FORMAT), LoggingDate::Invalid);
        assert_eq!(parse_logging_date(&CellValue::Number(45352.0), FORMAT), LoggingDate::Invalid);
        assert_eq!(parse_logging_date(&CellValue::Empty, FORMAT), LoggingDate::Missing);
    }

    #[test]
    fn valid_metadata() {
        let metadata = FileMetadata::parse(
            "C06-090.xlsx",
            (&CellValue::Text("C06-090".to_owned()), "B3"),
            (&CellValue::Text("2024-03-01 00:00:00".to_owned()), "L4"),
            FORMAT,
        )
        .unwrap();
        assert_eq!(metadata.hole_id, "C06-090");
        assert_eq!(metadata.logging_date, date(2024, 3, 1));
    }

    #[test]
    fn rejections_name_the_cell() {
        let error = FileMetadata::parse("a.xlsx", (&CellValue::Empty, "B3"), (&CellValue::Empty, "L4"), FORMAT)
            .unwrap_err();
        assert_eq!(error.to_string(), "'a.xlsx': hole identifier at B3 is missing");

        let error = FileMetadata::parse(
            "a.xlsx",
            (&CellValue::Text("C06".to_owned()), "B3"),
            (&CellValue::Text("yesterday".to_owned()), "L4"),
            FORMAT,
        )
        .unwrap_err();
        assert!(matches!(error, MetadataError::LoggingDateError(_, _, ref value) if value == "yesterday"));
    }
}
