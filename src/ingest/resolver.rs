use crate::ingest::field::SourceField;
use crate::spreadsheet::cell::CellValue;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::debug;
use tracing::warn;

/// How the source fields are located in the tabular region of one file.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnMapping {
    /// Every field was found under its header label.
    Named {
        labels: BTreeMap<SourceField, String>,
        offsets: BTreeMap<SourceField, usize>,
    },
    /// Fixed offsets of the legacy layout without headers.
    Positional { offsets: BTreeMap<SourceField, usize> },
}

impl ColumnMapping {
    pub fn is_named(&self) -> bool {
        matches!(self, ColumnMapping::Named { .. })
    }

    /// 0-based offsets within the column span
    pub fn offsets(&self) -> &BTreeMap<SourceField, usize> {
        match self {
            ColumnMapping::Named { offsets, .. } | ColumnMapping::Positional { offsets } => offsets,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ColumnMapping::Named { .. } => "named",
            ColumnMapping::Positional { .. } => "positional",
        }
    }
}

/// Chooses the mapping for a file from its candidate header row.
///
/// Labels are compared after trimming; when a label repeats, its first column wins.
/// Falling back to positions is logged, never an error.
pub fn resolve_columns(
    header: &[CellValue],
    required_headers: &BTreeMap<SourceField, String>,
    positional_offsets: &BTreeMap<SourceField, usize>,
) -> ColumnMapping {
    let mut present: HashMap<String, usize> = HashMap::new();
    for (offset, cell) in header.iter().enumerate() {
        let label = cell.to_text().trim().to_owned();
        if !label.is_empty() {
            present.entry(label).or_insert(offset);
        }
    }

    let missing: Vec<&str> = required_headers
        .values()
        .map(|label| label.trim())
        .filter(|label| !present.contains_key(*label))
        .collect();

    if missing.is_empty() {
        let offsets: BTreeMap<SourceField, usize> = required_headers
            .iter()
            .filter_map(|(field, label)| present.get(label.trim()).map(|offset| (*field, *offset)))
            .collect();
        debug!(?offsets, "Resolved named columns");
        ColumnMapping::Named {
            labels: required_headers.clone(),
            offsets,
        }
    } else {
        warn!(missing = %missing.join(", "), "Named headers incomplete, using positional layout");
        ColumnMapping::Positional {
            offsets: positional_offsets.clone(),
        }
    }
}
