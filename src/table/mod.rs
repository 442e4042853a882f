//! Versioned table subsystem
//!
//! A table is an abstract key → tag store whose on-disk state is always one
//! whole revision. Changes are staged in memory and written by `apply`,
//! which either advances the table to the new revision or leaves it at the
//! prior one.
//!
//! # Layout
//!
//! ```text
//! <db>/<kind>/table.dat   append-only checksummed entries
//! <db>/<kind>/base.A      revision slot
//! <db>/<kind>/base.B      revision slot
//! ```

mod base;
mod checksum;
mod diff;
mod errors;
mod kind;
mod record;
mod versioned;

pub use base::{RevisionSlot, SlotName, SlotPair};
pub use checksum::compute_checksum;
pub use diff::{DiffSet, Key, Lookup, Tag};
pub use errors::{Severity, TableError, TableErrorCode, TableResult};
pub use kind::TableKind;
pub use record::EntryRecord;
pub use versioned::{VersionedTable, DATA_FILE};
