//! One-shot fault injection for in-process failure tests

use std::collections::HashSet;

use crate::table::TableKind;

/// Failures armed against one manager. Each fires once, then disarms.
#[derive(Debug, Default, Clone)]
pub struct FaultPlan {
    apply: HashSet<TableKind>,
    restamp: bool,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next apply of `kind` writes its entries, then fails before the
    /// revision slot is written.
    pub fn inject_apply_failure(&mut self, kind: TableKind) {
        self.apply.insert(kind);
    }

    /// Next `force_set_revision` fails on the Postings table.
    pub fn inject_restamp_failure(&mut self) {
        self.restamp = true;
    }

    pub fn is_armed(&self) -> bool {
        !self.apply.is_empty() || self.restamp
    }

    pub fn clear(&mut self) {
        self.apply.clear();
        self.restamp = false;
    }

    pub(crate) fn take_apply(&mut self, kind: TableKind) -> bool {
        self.apply.remove(&kind)
    }

    pub(crate) fn take_restamp(&mut self) -> bool {
        std::mem::take(&mut self.restamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_faults_fire_once() {
        let mut plan = FaultPlan::new();
        plan.inject_apply_failure(TableKind::Values);
        plan.inject_restamp_failure();
        assert!(plan.is_armed());

        assert!(!plan.take_apply(TableKind::Terms));
        assert!(plan.take_apply(TableKind::Values));
        assert!(!plan.take_apply(TableKind::Values));

        assert!(plan.take_restamp());
        assert!(!plan.take_restamp());
        assert!(!plan.is_armed());
    }

    #[test]
    fn test_clear_disarms() {
        let mut plan = FaultPlan::new();
        plan.inject_apply_failure(TableKind::Records);
        plan.clear();
        assert!(!plan.is_armed());
    }
}
