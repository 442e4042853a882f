//! Document batches over the five tables
//!
//! Turns add/replace/delete of whole documents into per-table staged writes
//! and commits them as one revision.

mod change_batch;
mod codec;
mod document;
mod stats;

pub use change_batch::{ChangeBatch, CommitOutcome, RecoveryOutcome};
pub(crate) use change_batch::read_stats;
pub use codec::{
    docid_key, parse_docid_key, position_key, CodecError, CodecResult, DocId, PositionList,
    Posting, PostingList, TermEntry, TermList, ValueSet,
};
pub use document::{Document, StoredDocument, TermInfo};
pub use stats::{DatabaseStats, STATS_KEY};
