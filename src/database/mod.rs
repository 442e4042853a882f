//! Database handles
//!
//! `Database` reads one consistent revision; `WritableDatabase` is the single
//! lock-holding writer.

mod lookup;
mod mode;
mod reader;
mod writer;

pub use mode::OpenMode;
pub use reader::Database;
pub use writer::{WritableDatabase, RECOVERY_FAILED_MARKER};
