//! A1-style cell references. Rows and columns are 0-based internally.

/// Converts a 0-based column index to its letters (0 → "A", 26 → "AA").
pub fn index_to_col(col: usize) -> String {
    let mut letters = Vec::new();
    let mut index = col + 1;
    while index > 0 {
        let remainder = (index - 1) % 26;
        letters.push(b'A' + remainder as u8);
        index = (index - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Converts 0-based (row, col) to a reference such as "B3".
pub fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_col(col), row + 1)
}

/// Converts column letters to a 0-based index; empty or non-letter input yields None.
pub fn col_to_index(letters: &str) -> Option<usize> {
    if letters.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for byte in letters.bytes() {
        if !byte.is_ascii_alphabetic() {
            return None;
        }
        let digit = (byte.to_ascii_uppercase() - b'A') as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// Converts a 1-based row number to a 0-based index; "0" and empty input yield None.
pub fn row_to_index(digits: &str) -> Option<usize> {
    digits.parse::<usize>().ok()?.checked_sub(1)
}

/// Parses a reference such as "L4" (or "$L$4") into 0-based (row, col).
pub fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    Some((row_to_index(digits)?, col_to_index(letters)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(index_to_col(0), "A");
        assert_eq!(index_to_col(21), "V");
        assert_eq!(index_to_col(25), "Z");
        assert_eq!(index_to_col(26), "AA");
        assert_eq!(index_to_col(701), "ZZ");
        assert_eq!(index_to_col(702), "AAA");
        assert_eq!(col_to_index("aa"), Some(26));
        assert_eq!(col_to_index("ZZ"), Some(701));
        assert_eq!(col_to_index(""), None);
        assert_eq!(col_to_index("B2"), None);
    }

    #[test]
    fn references() {
        assert_eq!(index_to_reference(2, 1), "B3");
        assert_eq!(reference_to_index("B3"), Some((2, 1)));
        assert_eq!(reference_to_index("$L$4"), Some((3, 11)));
        assert_eq!(reference_to_index("L0"), None);
        assert_eq!(reference_to_index("12"), None);
        assert_eq!(reference_to_index("AB"), None);
    }
}
