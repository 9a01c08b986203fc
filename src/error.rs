use thiserror::Error;

/// Main error type for the drill ledger.
/// Aggregates errors from the standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum DrillLedgerError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    GlobError(#[from] glob::GlobError),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    WatchError(#[from] notify::Error),

    #[error("{0}")]
    PersistError(#[from] tempfile::PersistError),

    // Helper module errors
    #[error("{0}")]
    CfbHelperError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    Biff8HelperError(#[from] crate::helpers::biff8::Biff8Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),

    #[error("{0}")]
    RangeError(#[from] crate::spreadsheet::range::RangeError),

    // Configuration errors
    #[error("{0}")]
    ConfigError(#[from] crate::config::ConfigError),

    // Ingestion errors
    #[error("{0}")]
    MetadataError(#[from] crate::ingest::metadata::MetadataError),

    #[error("{0}")]
    RowError(#[from] crate::ingest::normalizer::RowError),

    // Database errors
    #[error("{0}")]
    AppendError(#[from] crate::database::appender::AppendError),
}

impl DrillLedgerError {
    /// True when the error means the source file itself was unusable
    /// (bad metadata or an uncoercible cell), as opposed to an I/O or format failure.
    pub fn is_rejection(&self) -> bool {
        matches!(self, DrillLedgerError::MetadataError(_) | DrillLedgerError::RowError(_))
    }
}

pub(crate) trait ResultOptionChain {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self;
}

impl<T, E> ResultOptionChain for Result<Option<T>, E> {
    fn ok_none_else<F>(self, f: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Ok(None) => f(),
            _ => self,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, DrillLedgerError> {
    /// Prefixes the error message, keeping typed rejections intact so callers can still classify them.
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| match e {
            DrillLedgerError::MetadataError(_) | DrillLedgerError::RowError(_) => e,
            e => DrillLedgerError::WithContextError(format!("{}: {}", message, e)),
        })
    }
}
