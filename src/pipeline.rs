//! The single-writer unit "ingest, append, persist" shared by every trigger.

use crate::config::Config;
use crate::database::appender::AppendReport;
use crate::database::appender::DatabaseAppender;
use crate::error::DrillLedgerError;
use crate::ingest::ingestor::FileIngestor;
use crate::ingest::ingestor::IngestedFile;
use crate::spreadsheet::is_supported;
use glob::glob;
use glob::Pattern;
use std::fmt::Display;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Prefix of the owner files Excel keeps next to an open workbook
const EXCEL_OWNER_FILE_PREFIX: &str = "~$";

/// Result of handing one path to the pipeline.
#[derive(Debug, PartialEq)]
pub enum FileOutcome {
    /// Not a `.xls`/`.xlsx` file, or an Excel owner file
    Ignored,
    Appended(AppendReport),
    /// The file was rejected or the append failed; nothing was written
    Failed { reason: String, rejected: bool },
}

impl Display for FileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOutcome::Ignored => write!(f, "ignored"),
            FileOutcome::Appended(report) if report.rows == 0 => write!(f, "no rows"),
            FileOutcome::Appended(report) => write!(f, "rows {}-{}", report.first_row, report.last_row),
            FileOutcome::Failed { rejected: true, .. } => write!(f, "rejected"),
            FileOutcome::Failed { .. } => write!(f, "failed"),
        }
    }
}

/// Whether a trigger should hand this path to the pipeline at all.
pub fn is_candidate(path: &Path) -> bool {
    let is_owner_file = path
        .file_name()
        .map(|name| name.to_string_lossy().starts_with(EXCEL_OWNER_FILE_PREFIX))
        .unwrap_or(false);
    is_supported(path) && !is_owner_file
}

/// Ingests files and appends them to the database one at a time.
pub struct Pipeline {
    ingestor: FileIngestor,
    appender: DatabaseAppender,
    source_folder: PathBuf,
    lock: Mutex<()>,
}

impl Pipeline {
    pub fn new(config: &Config) -> Result<Self, DrillLedgerError> {
        Ok(Self {
            ingestor: FileIngestor::new(&config.source)?,
            appender: DatabaseAppender::new(&config.database_file, &config.database),
            source_folder: config.source_folder.to_owned(),
            lock: Mutex::new(()),
        })
    }

    pub fn ingestor(&self) -> &FileIngestor {
        &self.ingestor
    }

    pub fn appender(&self) -> &DatabaseAppender {
        &self.appender
    }

    pub fn source_folder(&self) -> &Path {
        &self.source_folder
    }

    /// Runs ingest and append for one file while holding the pipeline lock.
    pub fn ingest_and_append(&self, path: &Path) -> Result<(IngestedFile, AppendReport), DrillLedgerError> {
        // the guard protects no data, so a poisoned lock is still usable
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let ingested = self.ingestor.ingest(path)?;
        let report = self.appender.append(&ingested.rows)?;
        Ok((ingested, report))
    }

    /// Handles one trigger for `path`; failures are logged and reported, never raised.
    pub fn process(&self, path: &Path) -> FileOutcome {
        if !is_candidate(path) {
            debug!(file = %path.display(), "Ignored");
            return FileOutcome::Ignored;
        }
        match self.ingest_and_append(path) {
            Ok((ingested, report)) => {
                info!(
                    file = %path.display(),
                    rows = ingested.rows.len(),
                    first_row = report.first_row,
                    last_row = report.last_row,
                    "Processed"
                );
                FileOutcome::Appended(report)
            }
            Err(e) => {
                let rejected = e.is_rejection();
                match rejected {
                    true => warn!(file = %path.display(), "Rejected: {}", e),
                    false => error!(file = %path.display(), "Failed: {}", e),
                }
                FileOutcome::Failed {
                    reason: e.to_string(),
                    rejected,
                }
            }
        }
    }

    /// Processes every candidate file in the source folder in name order.
    /// Files already ingested are appended again.
    pub fn rescan(&self) -> Result<Vec<(PathBuf, FileOutcome)>, DrillLedgerError> {
        let files = list_candidates(&self.source_folder)?;
        info!(folder = %self.source_folder.display(), files = files.len(), "Rescanning");
        Ok(files
            .into_iter()
            .map(|path| {
                let outcome = self.process(&path);
                (path, outcome)
            })
            .collect())
    }
}

/// Candidate files directly inside `folder`, sorted by path.
pub fn list_candidates(folder: &Path) -> Result<Vec<PathBuf>, DrillLedgerError> {
    let pattern = format!("{}/*", Pattern::escape(&folder.to_string_lossy()));
    let mut files = Vec::new();
    for entry in glob(&pattern)? {
        let path = entry?;
        if path.is_file() && is_candidate(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates() {
        assert!(is_candidate(Path::new("Daily_Data/C06-090.xlsx")));
        assert!(is_candidate(Path::new("Daily_Data/C06-090.xls")));
        assert!(!is_candidate(Path::new("Daily_Data/~$C06-090.xlsx")));
        assert!(!is_candidate(Path::new("Daily_Data/C06-090.XLSX")));
        assert!(!is_candidate(Path::new("Daily_Data/notes.txt")));
    }

    #[test]
    fn listing_skips_other_files() {
        let directory = tempfile::tempdir().unwrap();
        for name in ["b.xlsx", "a.xls", "~$b.xlsx", "c.csv", "d.XLSX"] {
            std::fs::write(directory.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(directory.path().join("nested.xlsx")).unwrap();
        let files = list_candidates(directory.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.xls", "b.xlsx"]);
    }

    #[test]
    fn outcome_labels() {
        let report = AppendReport {
            header_written: true,
            first_row: 2,
            last_row: 3,
            rows: 2,
        };
        assert_eq!(FileOutcome::Appended(report).to_string(), "rows 2-3");
        assert_eq!(FileOutcome::Appended(AppendReport::default()).to_string(), "no rows");
        assert_eq!(FileOutcome::Ignored.to_string(), "ignored");
        let failed = FileOutcome::Failed {
            reason: "x".to_owned(),
            rejected: true,
        };
        assert_eq!(failed.to_string(), "rejected");
    }
}
