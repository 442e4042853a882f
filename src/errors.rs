//! Database-level error types
//!
//! Error codes:
//! - FLINT_OPENING_ERROR (ERROR) - a requested revision cannot be opened
//! - FLINT_DATABASE_CORRUPT (FATAL) - no consistent revision within the retry budget
//! - FLINT_CREATE_ERROR (ERROR) - tables exist but may not be created over
//! - FLINT_LOCK_ERROR (ERROR) - write lock not acquired
//! - FLINT_APPLY_ERROR (ERROR) - a table apply failed; recovery ran
//! - FLINT_UNRECOVERABLE_STORAGE (FATAL) - recovery itself failed
//! - FLINT_DATABASE_MODIFIED (ERROR) - a reader's revision was overwritten
//! - FLINT_DOC_NOT_FOUND (ERROR)
//! - FLINT_INVALID_ARGUMENT (ERROR)
//! - FLINT_CONFIG_ERROR (ERROR)

use std::error::Error as StdError;
use std::fmt;

use crate::batch::CodecError;
use crate::lock::LockError;
use crate::table::{Severity, TableError, TableErrorCode};

type BoxedSource = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseErrorCode {
    FlintOpeningError,
    FlintDatabaseCorrupt,
    FlintCreateError,
    FlintLockError,
    FlintApplyError,
    FlintUnrecoverableStorage,
    FlintDatabaseModified,
    FlintDocNotFound,
    FlintInvalidArgument,
    FlintConfigError,
}

impl DatabaseErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            DatabaseErrorCode::FlintOpeningError => "FLINT_OPENING_ERROR",
            DatabaseErrorCode::FlintDatabaseCorrupt => "FLINT_DATABASE_CORRUPT",
            DatabaseErrorCode::FlintCreateError => "FLINT_CREATE_ERROR",
            DatabaseErrorCode::FlintLockError => "FLINT_LOCK_ERROR",
            DatabaseErrorCode::FlintApplyError => "FLINT_APPLY_ERROR",
            DatabaseErrorCode::FlintUnrecoverableStorage => "FLINT_UNRECOVERABLE_STORAGE",
            DatabaseErrorCode::FlintDatabaseModified => "FLINT_DATABASE_MODIFIED",
            DatabaseErrorCode::FlintDocNotFound => "FLINT_DOC_NOT_FOUND",
            DatabaseErrorCode::FlintInvalidArgument => "FLINT_INVALID_ARGUMENT",
            DatabaseErrorCode::FlintConfigError => "FLINT_CONFIG_ERROR",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            DatabaseErrorCode::FlintDatabaseCorrupt
            | DatabaseErrorCode::FlintUnrecoverableStorage => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for DatabaseErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error returned by every public database operation
#[derive(Debug)]
pub struct DatabaseError {
    code: DatabaseErrorCode,
    message: String,
    details: Option<String>,
    source: Option<BoxedSource>,
}

impl DatabaseError {
    fn new(code: DatabaseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    fn with_source(mut self, source: impl Into<BoxedSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn opening(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::FlintOpeningError, message)
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::FlintDatabaseCorrupt, message)
    }

    pub fn create(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::FlintCreateError, message)
    }

    pub fn create_from(message: impl Into<String>, source: TableError) -> Self {
        Self::new(DatabaseErrorCode::FlintCreateError, message).with_source(source)
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::FlintUnrecoverableStorage, message)
    }

    /// Recovery after `original` failed with `cause`.
    pub fn unrecoverable_after(original: &DatabaseError, cause: DatabaseError) -> Self {
        Self::new(
            DatabaseErrorCode::FlintUnrecoverableStorage,
            "recovery from a failed commit did not complete; database must be repaired externally",
        )
        .with_details(format!("original: {}", original))
        .with_source(cause)
    }

    pub fn modified(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::FlintDatabaseModified, message)
    }

    pub fn doc_not_found(docid: u32) -> Self {
        Self::new(
            DatabaseErrorCode::FlintDocNotFound,
            format!("document {} not found", docid),
        )
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::FlintInvalidArgument, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(DatabaseErrorCode::FlintConfigError, message)
    }

    pub fn config_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::new(DatabaseErrorCode::FlintConfigError, message).with_source(source)
    }

    pub fn code(&self) -> DatabaseErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }

    /// Whether the same call may succeed if simply repeated (after reopening,
    /// for readers).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            DatabaseErrorCode::FlintApplyError | DatabaseErrorCode::FlintDatabaseModified
        )
    }

    /// The table error underneath, if this error was raised by a table.
    pub fn table_error(&self) -> Option<&TableError> {
        self.source.as_ref()?.downcast_ref::<TableError>()
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl StdError for DatabaseError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<TableError> for DatabaseError {
    fn from(err: TableError) -> Self {
        let code = match err.code() {
            TableErrorCode::FlintTableApplyFailed => DatabaseErrorCode::FlintApplyError,
            TableErrorCode::FlintTableRevisionDiscarded => DatabaseErrorCode::FlintDatabaseModified,
            TableErrorCode::FlintTableCorruption => DatabaseErrorCode::FlintDatabaseCorrupt,
            TableErrorCode::FlintTableOpenFailed
            | TableErrorCode::FlintTableRevisionUnavailable
            | TableErrorCode::FlintTableIoError => DatabaseErrorCode::FlintOpeningError,
        };
        let message = match err.table() {
            Some(table) => format!("{} table: {}", table, err.message()),
            None => err.message().to_string(),
        };
        Self::new(code, message).with_source(err)
    }
}

impl From<LockError> for DatabaseError {
    fn from(err: LockError) -> Self {
        Self::new(DatabaseErrorCode::FlintLockError, err.to_string()).with_source(err)
    }
}

impl From<CodecError> for DatabaseError {
    fn from(err: CodecError) -> Self {
        Self::new(DatabaseErrorCode::FlintDatabaseCorrupt, err.to_string()).with_source(err)
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DatabaseError>;
