//! Logical table kinds and their fixed apply order

use std::fmt;

/// The logical tables that make up one database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    /// term → posting list; always applied first (recovery anchor)
    Postings,
    /// (docid, term) → position list
    Positions,
    /// docid → term list
    Terms,
    /// docid → value slots
    Values,
    /// docid → stored data blob; always applied last (commit point)
    Records,
}

impl TableKind {
    /// Every kind, in the order a commit applies them.
    pub const APPLY_ORDER: [TableKind; 5] = [
        TableKind::Postings,
        TableKind::Positions,
        TableKind::Terms,
        TableKind::Values,
        TableKind::Records,
    ];

    /// Directory name of the table under the database root.
    pub fn dir_name(&self) -> &'static str {
        match self {
            TableKind::Postings => "postings",
            TableKind::Positions => "positions",
            TableKind::Terms => "terms",
            TableKind::Values => "values",
            TableKind::Records => "records",
        }
    }

    /// Position of this kind in [`TableKind::APPLY_ORDER`].
    pub fn index(&self) -> usize {
        match self {
            TableKind::Postings => 0,
            TableKind::Positions => 1,
            TableKind::Terms => 2,
            TableKind::Values => 3,
            TableKind::Records => 4,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_order_anchors() {
        assert_eq!(TableKind::APPLY_ORDER[0], TableKind::Postings);
        assert_eq!(TableKind::APPLY_ORDER[4], TableKind::Records);
    }

    #[test]
    fn test_index_matches_apply_order() {
        for (i, kind) in TableKind::APPLY_ORDER.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }
}
