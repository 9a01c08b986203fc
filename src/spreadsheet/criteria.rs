use crate::error::DrillLedgerError;
use crate::spreadsheet::range::Range;
use glob::Pattern;

/// Criteria for selecting one worksheet and the cells to keep from it.
#[derive(Clone, Debug, Default)]
pub struct Criteria {
    /// Sheet name pattern; the first sheet is used when absent.
    pub(crate) sheet_name_pattern: Option<Pattern>,

    /// Cells outside this range are skipped while reading.
    pub(crate) range: Option<Range>,

    /// Read error cells (`#N/A`, `#DIV/0!`, ...) as empty instead of failing.
    pub(crate) error_as_null: bool,
}

impl Criteria {
    pub fn new(sheet_name: Option<&str>, range: Option<Range>, error_as_null: bool) -> Result<Self, DrillLedgerError> {
        Ok(Criteria {
            sheet_name_pattern: sheet_name.map(Pattern::new).transpose()?,
            range,
            error_as_null,
        })
    }

    /// Picks the index of the first sheet whose name matches, or the first sheet without a pattern.
    pub(crate) fn select<'a, I>(&self, sheet_names: I) -> Option<usize>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut names = sheet_names.into_iter();
        match &self.sheet_name_pattern {
            Some(pattern) => names.position(|name| pattern.matches(name)),
            None => names.next().map(|_| 0),
        }
    }

    /// Human-readable sheet selector for error messages
    pub(crate) fn sheet_label(&self) -> String {
        self.sheet_name_pattern
            .as_ref()
            .map(|pattern| pattern.as_str().to_owned())
            .unwrap_or_else(|| "<first sheet>".to_owned())
    }
}
