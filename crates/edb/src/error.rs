//! Error taxonomy and per-job diagnostics for the extraction engine.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Where inside the database an error surfaced.
#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct ErrorContext {
    pub table: String,
    pub row: Option<usize>,
    pub column: Option<String>,
}

impl ErrorContext {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row: None,
            column: None,
        }
    }

    pub fn row(table: impl Into<String>, row: usize) -> Self {
        Self {
            table: table.into(),
            row: Some(row),
            column: None,
        }
    }

    pub fn column(table: impl Into<String>, row: usize, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            row: Some(row),
            column: Some(column.into()),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.table)?;
        if let Some(row) = self.row {
            write!(f, "[{row}]")?;
        }
        if let Some(column) = &self.column {
            write!(f, ".{column}")?;
        }
        Ok(())
    }
}

/// All errors produced by the extraction and export engine.
#[derive(Error, Debug)]
pub enum EdbError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Malformed database '{path}': {reason}")]
    MalformedDatabase { path: PathBuf, reason: String },

    #[error("Unsupported column compression 0x{tag:02X} at {context}")]
    UnsupportedColumnType { tag: u8, context: ErrorContext },

    #[error("Decompression failed at {context}: {reason}")]
    DecompressionFailed {
        context: ErrorContext,
        reason: String,
    },

    #[error("Unexpected PropertyBlob shape at {context}: {reason}")]
    UnexpectedPropertyBlobShape {
        context: ErrorContext,
        reason: &'static str,
    },

    #[error("Long value 0x{lv_id:08X} missing at {context}")]
    LongValueMissing { lv_id: u32, context: ErrorContext },

    #[error("PST output exceeds the 50 GiB limit")]
    PstSpaceExhausted,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    IoError(std::io::Error),
}

impl From<std::io::Error> for EdbError {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::Interrupted {
            return EdbError::Cancelled;
        }
        if let Some(inner) = error.get_ref() {
            if matches!(
                inner.downcast_ref::<pst_writer::ndb::NdbError>(),
                Some(pst_writer::ndb::NdbError::SpaceExhausted(_))
            ) {
                return EdbError::PstSpaceExhausted;
            }
        }
        EdbError::IoError(error)
    }
}

impl EdbError {
    /// Stable kind label used for diagnostic grouping.
    pub fn kind(&self) -> &'static str {
        match self {
            EdbError::InputNotFound(_) => "InputNotFound",
            EdbError::MalformedDatabase { .. } => "MalformedDatabase",
            EdbError::UnsupportedColumnType { .. } => "UnsupportedColumnType",
            EdbError::DecompressionFailed { .. } => "DecompressionFailed",
            EdbError::UnexpectedPropertyBlobShape { .. } => "UnexpectedPropertyBlobShape",
            EdbError::LongValueMissing { .. } => "LongValueMissing",
            EdbError::PstSpaceExhausted => "PstSpaceExhausted",
            EdbError::Cancelled => "Cancelled",
            EdbError::IoError(_) => "IoError",
        }
    }
}

pub type Result<T> = std::result::Result<T, EdbError>;

/// Per-job record of recovered errors. Rows with decode problems are still
/// emitted; the report is summarized at job end.
#[derive(Default, Debug)]
pub struct Diagnostics {
    entries: Vec<String>,
    counts: BTreeMap<&'static str, usize>,
    /// U+FFFD substitutions made while decoding string fields.
    pub replacement_chars: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, error: &EdbError) {
        *self.counts.entry(error.kind()).or_default() += 1;
        self.entries.push(error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.replacement_chars == 0
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Counts grouped by error kind, for the end-of-job summary.
    pub fn summary(&self) -> impl Iterator<Item = (&'static str, usize)> + '_ {
        self.counts.iter().map(|(kind, count)| (*kind, *count))
    }
}
