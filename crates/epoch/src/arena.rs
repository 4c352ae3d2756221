//! Registry of epochs on this node.
//!
//! Epochs refer to their ancestor by [`EpochIndex`] rather than by owning
//! it, so a chain of epochs never keeps an old epoch's resources alive. The
//! arena only stores `(id, serial, state, ancestor)`; keys and links live in
//! each epoch's own lifecycle and are released when it reaches OFF.
//!
//! Indices are never reused. [`EpochArena::compact`] drops OFF records that
//! no live epoch names as its ancestor.

use std::collections::{BTreeMap, HashSet};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use overlay_types::{EpochId, EpochState};

use crate::error::EpochError;

/// Position of an epoch in the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpochIndex(usize);

impl EpochIndex {
    pub fn get(&self) -> usize {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub id: EpochId,
    /// Registration order on this node
    pub serial: u64,
    pub state: EpochState,
    pub ancestor: Option<EpochIndex>,
}

#[derive(Debug, Default)]
struct Records {
    next: usize,
    live: BTreeMap<usize, EpochRecord>,
}

#[derive(Debug, Default)]
pub struct EpochArena {
    records: RwLock<Records>,
}

impl EpochArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new epoch in PRE_RUN.
    pub fn register(&self, id: EpochId, ancestor: Option<EpochIndex>) -> EpochIndex {
        let mut records = self.records.write();
        let index = records.next;
        records.next += 1;
        records.live.insert(
            index,
            EpochRecord {
                id,
                serial: index as u64,
                state: EpochState::PreRun,
                ancestor,
            },
        );
        EpochIndex(index)
    }

    pub fn get(&self, index: EpochIndex) -> Option<EpochRecord> {
        self.records.read().live.get(&index.0).cloned()
    }

    pub fn state(&self, index: EpochIndex) -> Option<EpochState> {
        self.records.read().live.get(&index.0).map(|r| r.state)
    }

    /// Move an epoch to the immediate successor of its current state.
    pub fn advance(
        &self,
        index: EpochIndex,
        next: EpochState,
        operation: &'static str,
    ) -> Result<(), EpochError> {
        let mut records = self.records.write();
        let record = records
            .live
            .get_mut(&index.0)
            .ok_or(EpochError::UnknownEpoch(index.0))?;

        if !record.state.can_advance_to(next) {
            return Err(EpochError::LifecycleViolation {
                epoch: record.id,
                state: record.state,
                operation,
            });
        }
        record.state = next;
        Ok(())
    }

    /// Jump straight to OFF from any live state. Returns the state left.
    pub fn retire(&self, index: EpochIndex) -> Result<EpochState, EpochError> {
        let mut records = self.records.write();
        let record = records
            .live
            .get_mut(&index.0)
            .ok_or(EpochError::UnknownEpoch(index.0))?;

        if record.state.is_terminal() {
            return Err(EpochError::LifecycleViolation {
                epoch: record.id,
                state: record.state,
                operation: "cancel",
            });
        }
        let previous = record.state;
        record.state = EpochState::Off;
        Ok(previous)
    }

    /// Remove OFF records that no live epoch names as its ancestor.
    /// Returns the number removed.
    pub fn compact(&self) -> usize {
        let mut records = self.records.write();
        let referenced: HashSet<usize> = records
            .live
            .values()
            .filter(|r| !r.state.is_terminal())
            .filter_map(|r| r.ancestor.map(|a| a.0))
            .collect();

        let before = records.live.len();
        records
            .live
            .retain(|index, r| !r.state.is_terminal() || referenced.contains(index));
        before - records.live.len()
    }

    /// Records currently held.
    pub fn len(&self) -> usize {
        self.records.read().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().live.is_empty()
    }

    /// Records in registration order.
    pub fn records(&self) -> Vec<EpochRecord> {
        self.records.read().live.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_serials() {
        let arena = EpochArena::new();
        let a = arena.register(EpochId(1), None);
        let b = arena.register(EpochId(2), Some(a));

        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(a).unwrap().serial, 0);
        assert_eq!(arena.get(b).unwrap().serial, 1);
        assert_eq!(arena.get(b).unwrap().ancestor, Some(a));
        assert_eq!(arena.state(b), Some(EpochState::PreRun));
    }

    #[test]
    fn test_advance_follows_linear_order() {
        let arena = EpochArena::new();
        let index = arena.register(EpochId(4), None);

        assert!(matches!(
            arena.advance(index, EpochState::Handoff, "begin_handoff"),
            Err(EpochError::LifecycleViolation {
                state: EpochState::PreRun,
                operation: "begin_handoff",
                ..
            })
        ));

        arena.advance(index, EpochState::Running, "start_running").unwrap();
        arena.advance(index, EpochState::Handoff, "begin_handoff").unwrap();
        arena.advance(index, EpochState::Off, "drain").unwrap();

        assert!(arena.advance(index, EpochState::PreRun, "pre_run").is_err());
        assert_eq!(arena.state(index), Some(EpochState::Off));
    }

    #[test]
    fn test_retire() {
        let arena = EpochArena::new();
        let index = arena.register(EpochId(9), None);
        arena.advance(index, EpochState::Running, "start_running").unwrap();

        assert_eq!(arena.retire(index).unwrap(), EpochState::Running);
        assert_eq!(arena.state(index), Some(EpochState::Off));
        assert!(arena.retire(index).is_err());
    }

    #[test]
    fn test_unknown_index() {
        let arena = EpochArena::new();
        let other = EpochArena::new();
        let index = other.register(EpochId(1), None);

        assert!(arena.get(index).is_none());
        assert!(matches!(arena.retire(index), Err(EpochError::UnknownEpoch(0))));
    }

    #[test]
    fn test_compact_keeps_live_ancestors() {
        let arena = EpochArena::new();
        let first = arena.register(EpochId(1), None);
        let second = arena.register(EpochId(2), Some(first));
        let third = arena.register(EpochId(3), Some(second));

        arena.retire(first).unwrap();
        arena.retire(second).unwrap();

        // `second` is the ancestor of a live epoch; `first` is only named by
        // an OFF one.
        assert_eq!(arena.compact(), 1);
        assert!(arena.get(first).is_none());
        assert_eq!(arena.state(second), Some(EpochState::Off));

        arena.retire(third).unwrap();
        assert_eq!(arena.compact(), 2);
        assert!(arena.is_empty());

        // Indices keep counting after compaction.
        let fourth = arena.register(EpochId(4), None);
        assert_eq!(fourth.get(), 3);
        assert_eq!(arena.get(fourth).unwrap().serial, 3);
    }

    #[test]
    fn test_compaction_is_bounded_over_many_epochs() {
        let arena = EpochArena::new();
        let mut previous = None;
        for id in 0..1_000 {
            let index = arena.register(EpochId(id), previous);
            if let Some(previous) = previous {
                arena.retire(previous).unwrap();
            }
            arena.compact();
            previous = Some(index);
        }
        assert!(arena.len() <= 2);
    }
}
