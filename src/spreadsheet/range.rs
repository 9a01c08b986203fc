use crate::error::DrillLedgerError;
use crate::spreadsheet::reference::col_to_index;
use crate::spreadsheet::reference::index_to_col;
use crate::spreadsheet::reference::row_to_index;
use regex::Regex;
use std::fmt::Display;
use std::sync::LazyLock;
use thiserror::Error;

static RANGE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z]*)(\d*)(:([A-Z]*)(\d*))?$").expect("Hardcode regex pattern"));

/// Errors related to Excel-style range parsing.
#[derive(Error, Debug)]
pub enum RangeError {
    #[error("Invalid range format '{0}'")]
    FormatError(String),

    #[error("Range '{0}' must name both a first and a last column")]
    ColumnSpanError(String),
}

/// Represents an Excel-style cell range with optional boundaries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Range {
    /// Lower row bound (0-based index), None for unbounded
    pub row_lower_bound: Option<usize>,
    /// Upper row bound (0-based index), None for unbounded
    pub row_upper_bound: Option<usize>,
    /// Lower column bound (0-based index), None for unbounded
    pub col_lower_bound: Option<usize>,
    /// Upper column bound (0-based index), None for unbounded
    pub col_upper_bound: Option<usize>,
}

impl TryFrom<&str> for Range {
    type Error = DrillLedgerError;

    /// Parses an Excel-style range string (e.g., "A1", "B2:C5", "B:V", "1:10").
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim().to_ascii_uppercase();
        let captures = RANGE_PATTERN
            .captures(value.as_str())
            .ok_or_else(|| RangeError::FormatError(value.to_owned()))?;
        let part = |index: usize| captures.get(index).map(|matcher| matcher.as_str()).unwrap_or_default();
        Ok(Range {
            col_lower_bound: col_to_index(part(1)),
            row_lower_bound: row_to_index(part(2)),
            col_upper_bound: col_to_index(part(4)),
            row_upper_bound: row_to_index(part(5)),
        })
    }
}

impl Range {
    /// A fully bounded column span, e.g. `B:V` → (1, 21).
    pub fn column_span(&self) -> Result<(usize, usize), DrillLedgerError> {
        match (self.col_lower_bound, self.col_upper_bound) {
            (Some(lower), Some(upper)) if lower <= upper => Ok((lower, upper)),
            _ => Err(RangeError::ColumnSpanError(self.to_string()))?,
        }
    }

    /// Checks if a cell at (row, col) falls inside every bound that is set.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.row_lower_bound.map(|bound| bound <= row).unwrap_or(true)
            && self.row_upper_bound.map(|bound| row <= bound).unwrap_or(true)
            && self.col_lower_bound.map(|bound| bound <= col).unwrap_or(true)
            && self.col_upper_bound.map(|bound| col <= bound).unwrap_or(true)
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cell = |row: Option<usize>, col: Option<usize>| {
            format!(
                "{}{}",
                col.map(index_to_col).unwrap_or_default(),
                row.map(|row| (row + 1).to_string()).unwrap_or_default()
            )
        };
        write!(f, "{}", cell(self.row_lower_bound, self.col_lower_bound))?;
        if self.row_upper_bound.is_some() || self.col_upper_bound.is_some() {
            write!(f, ":{}", cell(self.row_upper_bound, self.col_upper_bound))?;
        }
        Ok(())
    }
}
