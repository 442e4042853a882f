//! Table error types
//!
//! Error codes:
//! - FLINT_TABLE_IO_ERROR (ERROR severity)
//! - FLINT_TABLE_OPEN_FAILED (ERROR severity)
//! - FLINT_TABLE_REVISION_UNAVAILABLE (ERROR severity)
//! - FLINT_TABLE_APPLY_FAILED (ERROR severity)
//! - FLINT_TABLE_REVISION_DISCARDED (ERROR severity)
//! - FLINT_TABLE_CORRUPTION (FATAL severity)

use std::fmt;
use std::io;

use super::kind::TableKind;

/// Severity levels shared by every error type in the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Operation fails, database stays usable
    Error,
    /// Database can no longer be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Table-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableErrorCode {
    /// Disk I/O failure outside of open/apply
    FlintTableIoError,
    /// Table directory or slot files could not be opened
    FlintTableOpenFailed,
    /// The requested revision is not held by either revision slot
    FlintTableRevisionUnavailable,
    /// Writing a new revision failed; on-disk state is at the prior revision
    FlintTableApplyFailed,
    /// The opened revision was overwritten by a writer while being read
    FlintTableRevisionDiscarded,
    /// Checksum or structural failure inside a committed revision
    FlintTableCorruption,
}

impl TableErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            TableErrorCode::FlintTableIoError => "FLINT_TABLE_IO_ERROR",
            TableErrorCode::FlintTableOpenFailed => "FLINT_TABLE_OPEN_FAILED",
            TableErrorCode::FlintTableRevisionUnavailable => "FLINT_TABLE_REVISION_UNAVAILABLE",
            TableErrorCode::FlintTableApplyFailed => "FLINT_TABLE_APPLY_FAILED",
            TableErrorCode::FlintTableRevisionDiscarded => "FLINT_TABLE_REVISION_DISCARDED",
            TableErrorCode::FlintTableCorruption => "FLINT_TABLE_CORRUPTION",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            TableErrorCode::FlintTableCorruption => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for TableErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Table error with the table it came from and an optional I/O source
#[derive(Debug)]
pub struct TableError {
    code: TableErrorCode,
    table: Option<TableKind>,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl TableError {
    fn new(code: TableErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            table: None,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    /// Create a generic I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(TableErrorCode::FlintTableIoError, message).with_source(source)
    }

    /// Create an open failure with an I/O source
    pub fn open_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(TableErrorCode::FlintTableOpenFailed, message).with_source(source)
    }

    /// Create an open failure without an I/O source
    pub fn open_failed_no_source(message: impl Into<String>) -> Self {
        Self::new(TableErrorCode::FlintTableOpenFailed, message)
    }

    /// The requested revision is not present in either slot
    pub fn revision_unavailable(requested: u64, available: &[u64]) -> Self {
        Self::new(
            TableErrorCode::FlintTableRevisionUnavailable,
            format!("revision {} is not available", requested),
        )
        .with_details(format!("available: {:?}", available))
    }

    /// Create an apply failure with an I/O source
    pub fn apply_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::new(TableErrorCode::FlintTableApplyFailed, message).with_source(source)
    }

    /// Create an apply failure without an I/O source
    pub fn apply_failed_no_source(message: impl Into<String>) -> Self {
        Self::new(TableErrorCode::FlintTableApplyFailed, message)
    }

    /// The reader's revision was overwritten while it was still being read
    pub fn revision_discarded(revision: u64) -> Self {
        Self::new(
            TableErrorCode::FlintTableRevisionDiscarded,
            format!("revision {} was discarded by a newer commit", revision),
        )
    }

    /// Create a corruption error (FATAL)
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::new(TableErrorCode::FlintTableCorruption, message)
    }

    /// Create a corruption error with byte offset context
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self::new(TableErrorCode::FlintTableCorruption, reason)
            .with_details(format!("byte_offset: {}", offset))
    }

    /// Attach the table this error belongs to
    pub fn for_table(mut self, table: TableKind) -> Self {
        self.table = Some(table);
        self
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn with_source(mut self, source: io::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Returns the error code
    pub fn code(&self) -> TableErrorCode {
        self.code
    }

    /// Returns the table the error belongs to, if known
    pub fn table(&self) -> Option<TableKind> {
        self.table
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether this error is fatal
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: ", self.code.severity(), self.code.code())?;
        if let Some(table) = self.table {
            write!(f, "{} table: ", table)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for TableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TableErrorCode::FlintTableIoError.code(), "FLINT_TABLE_IO_ERROR");
        assert_eq!(TableErrorCode::FlintTableApplyFailed.code(), "FLINT_TABLE_APPLY_FAILED");
        assert_eq!(TableErrorCode::FlintTableCorruption.code(), "FLINT_TABLE_CORRUPTION");
    }

    #[test]
    fn test_only_corruption_is_fatal() {
        assert!(TableError::corruption("bad crc").is_fatal());
        assert!(!TableError::revision_discarded(4).is_fatal());
        assert!(!TableError::apply_failed(
            "disk full",
            io::Error::new(io::ErrorKind::Other, "disk full")
        )
        .is_fatal());
    }

    #[test]
    fn test_display_contains_table_and_details() {
        let err = TableError::corruption_at_offset(512, "checksum mismatch")
            .for_table(TableKind::Values);
        let display = format!("{}", err);
        assert!(display.contains("FATAL"));
        assert!(display.contains("FLINT_TABLE_CORRUPTION"));
        assert!(display.contains("values"));
        assert!(display.contains("byte_offset: 512"));
    }

    #[test]
    fn test_revision_unavailable_lists_slots() {
        let err = TableError::revision_unavailable(7, &[5, 6]);
        assert_eq!(err.code(), TableErrorCode::FlintTableRevisionUnavailable);
        assert_eq!(err.details(), Some("available: [5, 6]"));
    }
}
