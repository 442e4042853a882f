//! flintdb - a single-writer, multi-reader document index store
//!
//! Five versioned tables (postings, positions, terms, values, records) move
//! together from one revision to the next. A commit either lands in every
//! table or in none; a failed commit skips its revision number for good.

pub mod batch;
pub mod config;
pub mod crash_point;
pub mod database;
pub mod errors;
pub mod lock;
pub mod manager;
pub mod observability;
pub mod table;

pub use batch::{ChangeBatch, CommitOutcome, DocId, Document, Posting, StoredDocument};
pub use config::DatabaseConfig;
pub use database::{Database, OpenMode, WritableDatabase};
pub use errors::{DatabaseError, DatabaseErrorCode, DbResult};
pub use table::TableKind;
