use crate::error::DrillLedgerError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::range::Range;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::SpreadsheetError;
use std::collections::HashMap;

/// Cells read from one worksheet, optionally restricted to a window.
pub struct Sheet {
    /// Source file name
    pub(crate) file_name: String,
    /// Sheet name
    pub(crate) name: String,
    /// Cells in the order they were read
    pub(crate) cells: Vec<Cell>,
    /// Position of each cell in `cells`, keyed by (row, col)
    index: HashMap<(usize, usize), usize>,
    /// Cells outside this window are not kept
    pub(crate) window: Range,
    /// Actual data range (determined from cell data)
    pub(crate) row_lower_bound: Option<usize>,
    pub(crate) row_upper_bound: Option<usize>,
    pub(crate) col_lower_bound: Option<usize>,
    pub(crate) col_upper_bound: Option<usize>,
}

impl Sheet {
    pub(crate) fn new(file_name: &str, name: &str, window: Option<Range>) -> Self {
        Self {
            file_name: file_name.to_owned(),
            name: name.to_owned(),
            cells: Vec::new(),
            index: HashMap::new(),
            window: window.unwrap_or_default(),
            row_lower_bound: None,
            row_upper_bound: None,
            col_lower_bound: None,
            col_upper_bound: None,
        }
    }

    /// Returns the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if the sheet contains no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checks if a row is after the upper bound of the window; readers stop there.
    pub(crate) fn after_row_upper_bound(&self, row: usize) -> bool {
        self.window.row_upper_bound
            .map(|row_upper_bound| row_upper_bound < row)
            .unwrap_or(false)
    }

    /// Checks if a cell at (row, col) is within the window.
    pub(crate) fn contains(&self, row: usize, col: usize) -> bool {
        self.window.contains(row, col)
    }

    /// Adds a cell; a later cell at the same position replaces the earlier one.
    pub(crate) fn push(&mut self, cell: Cell) {
        self.update_bound(cell.row, cell.col);
        match self.index.get(&(cell.row, cell.col)) {
            Some(position) => self.cells[*position] = cell,
            None => {
                self.index.insert((cell.row, cell.col), self.cells.len());
                self.cells.push(cell);
            }
        }
    }

    /// Updates the actual data range boundaries based on cell positions.
    fn update_bound(&mut self, row: usize, col: usize) {
        if self.row_lower_bound.map(|row_lower_bound| row < row_lower_bound).unwrap_or(true) {
            self.row_lower_bound = Some(row);
        }
        if self.row_upper_bound.map(|row_upper_bound| row_upper_bound < row).unwrap_or(true) {
            self.row_upper_bound = Some(row);
        }
        if self.col_lower_bound.map(|col_lower_bound| col < col_lower_bound).unwrap_or(true) {
            self.col_lower_bound = Some(col);
        }
        if self.col_upper_bound.map(|col_upper_bound| col_upper_bound < col).unwrap_or(true) {
            self.col_upper_bound = Some(col);
        }
    }

    /// Typed value of the cell at 0-based (row, col); absent cells are `Empty`.
    pub fn value(&self, row: usize, col: usize) -> Result<CellValue, DrillLedgerError> {
        let Some(position) = self.index.get(&(row, col)) else {
            return Ok(CellValue::Empty);
        };
        let cell = &self.cells[*position];
        cell.to_value().map_err(|_| {
            DrillLedgerError::from(SpreadsheetError::CellValueError(
                self.file_name.to_owned(),
                self.name.to_owned(),
                cell.reference(),
                cell.value.to_owned(),
            ))
        })
    }

    /// Typed values of row `row` across the inclusive column span.
    pub fn row_values(&self, row: usize, (lower, upper): (usize, usize)) -> Result<Vec<CellValue>, DrillLedgerError> {
        (lower..=upper).map(|col| self.value(row, col)).collect()
    }

    /// The last row holding any cell, 0-based.
    pub fn last_row(&self) -> Option<usize> {
        self.row_upper_bound
    }

    /// Reference of a 0-based position, for messages.
    pub(crate) fn reference(&self, row: usize, col: usize) -> String {
        format!("{}!{}", self.name, index_to_reference(row, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::cell::CellType;

    fn push(sheet: &mut Sheet, row: usize, col: usize, kind: CellType, value: &str) {
        sheet.push(Cell {
            row,
            col,
            kind,
            value: value.to_owned(),
        });
    }

    #[test]
    fn sheet_initial() {
        let sheet = Sheet::new("", "", None);

        assert!(sheet.is_empty());
        assert_eq!(sheet.row_lower_bound, None);
        assert_eq!(sheet.row_upper_bound, None);
        assert_eq!(sheet.last_row(), None);
    }

    #[test]
    fn sheet_update() {
        let mut sheet = Sheet::new("", "", None);
        push(&mut sheet, 3, 3, CellType::Number, "1");
        push(&mut sheet, 1, 1, CellType::Number, "2");
        push(&mut sheet, 1, 3, CellType::Number, "3");

        assert_eq!(sheet.cells.len(), 3);
        assert_eq!(sheet.row_lower_bound, Some(1));
        assert_eq!(sheet.row_upper_bound, Some(3));
        assert_eq!(sheet.col_lower_bound, Some(1));
        assert_eq!(sheet.col_upper_bound, Some(3));
        assert_eq!(sheet.value(1, 3).unwrap(), CellValue::Number(3.0));
        assert_eq!(sheet.value(2, 2).unwrap(), CellValue::Empty);
    }

    #[test]
    fn later_cells_replace_earlier_ones() {
        let mut sheet = Sheet::new("", "", None);
        push(&mut sheet, 0, 0, CellType::Text, "old");
        push(&mut sheet, 0, 0, CellType::Text, "new");
        assert_eq!(sheet.cells.len(), 1);
        assert_eq!(sheet.value(0, 0).unwrap(), CellValue::Text("new".to_owned()));
    }

    #[test]
    fn row_values_fill_gaps() {
        let mut sheet = Sheet::new("", "", None);
        push(&mut sheet, 0, 1, CellType::Text, "  ");
        push(&mut sheet, 1, 2, CellType::Number, "7");
        assert_eq!(
            sheet.row_values(1, (1, 3)).unwrap(),
            vec![CellValue::Empty, CellValue::Number(7.0), CellValue::Empty]
        );
    }

    #[test]
    fn bad_values_name_the_cell() {
        let mut sheet = Sheet::new("log.xlsx", "Sheet1", None);
        push(&mut sheet, 6, 1, CellType::Number, "n/a");
        let error = sheet.value(6, 1).unwrap_err();
        assert!(error.to_string().contains("B7"));
        assert!(error.to_string().contains("log.xlsx"));
    }

    #[test]
    fn window_bounds() {
        let sheet = Sheet::new("", "", Some(Range::try_from("B1:V10").unwrap()));
        assert!(sheet.contains(0, 1));
        assert!(!sheet.contains(0, 0));
        assert!(sheet.after_row_upper_bound(10));
        assert!(!sheet.after_row_upper_bound(9));
    }
}
