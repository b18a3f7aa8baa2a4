//! The six-permutation delta overlay
//!
//! `DeltaTriples` maintains the triples inserted into and deleted from the
//! immutable base index. Every pending triple is located once per
//! permutation; the six resulting handles are stored next to the triple so
//! a later cancellation can erase all six entries again.
//!
//! # Invariants
//!
//! - The inserted and deleted sets are disjoint
//! - No inserted triple is contained in the base index
//! - Every deleted triple is contained in the base index
//!
//! Mutations are serialized by the caller (or by wrapping the overlay in a
//! [`SharedDeltaTriples`] lock); concurrent scans read through a
//! [`DeltaSnapshot`] taken under the read lock, so a mutation only ever
//! waits for the snapshot copy.

use crate::error::Result;
use crate::located::{DeltaKind, LocatedTriple, LocatedTripleHandle, LocatedTriplesPerBlock};
use crate::merge::DeltaSnapshot;
use hexad_core::{Id, IdTriple, LocalVocab, Permutation, TripleIndex, TurtleTriple};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;

/// The overlay behind a readers-writer lock, as shared between the admin
/// surface (writer) and running scans (readers).
pub type SharedDeltaTriples = Arc<RwLock<DeltaTriples>>;

/// What a call to `insert_triple` / `delete_triple` actually did.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeltaOutcome {
    /// The triple was recorded as a new delta.
    Applied,
    /// The call cancelled the opposite pending delta for the same triple.
    CancelledPending,
    /// The same delta was already pending; nothing changed.
    AlreadyPending,
    /// Insert of a triple the base index already contains; nothing changed.
    AlreadyInBase,
    /// Delete of a triple the base index does not contain; nothing changed.
    NotInBase,
}

/// Counters reported by the admin API.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct DeltaStats {
    pub num_inserted: usize,
    pub num_deleted: usize,
    pub local_vocab_words: usize,
    pub epoch: u64,
}

/// The six handles of one pending triple, indexed by `Permutation::index`.
#[derive(Clone, Copy, Debug)]
struct LocatedTripleHandles {
    per_permutation: [LocatedTripleHandle; 6],
}

/// Triples inserted and deleted after the immutable index build.
pub struct DeltaTriples {
    /// The base index these deltas refer to.
    index: Arc<dyn TripleIndex>,
    /// Components not present in the base vocabulary are minted here.
    local_vocab: LocalVocab,
    /// Positional image of all pending deltas, one container per permutation.
    located: [LocatedTriplesPerBlock; 6],
    triples_inserted: FxHashMap<IdTriple, LocatedTripleHandles>,
    triples_deleted: FxHashMap<IdTriple, LocatedTripleHandles>,
    /// Bumped on every successful mutation; cache keys of delta-touched
    /// scans must include it.
    epoch: u64,
}

impl DeltaTriples {
    /// Empty overlay for the given base index.
    pub fn new(index: Arc<dyn TripleIndex>) -> Self {
        Self {
            index,
            local_vocab: LocalVocab::new(),
            located: Permutation::ALL.map(LocatedTriplesPerBlock::new),
            triples_inserted: FxHashMap::default(),
            triples_deleted: FxHashMap::default(),
            epoch: 0,
        }
    }

    /// The base index this overlay refers to.
    pub fn index(&self) -> &Arc<dyn TripleIndex> {
        &self.index
    }

    /// Wrap the overlay for one-writer/many-readers sharing with scans.
    pub fn into_shared(self) -> SharedDeltaTriples {
        Arc::new(RwLock::new(self))
    }

    /// The overlay's local vocabulary.
    pub fn local_vocab(&self) -> &LocalVocab {
        &self.local_vocab
    }

    /// Number of pending insertions.
    pub fn num_inserted(&self) -> usize {
        self.triples_inserted.len()
    }

    /// Number of pending deletions.
    pub fn num_deleted(&self) -> usize {
        self.triples_deleted.len()
    }

    /// Current mutation epoch.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Counters for the admin API.
    pub fn stats(&self) -> DeltaStats {
        DeltaStats {
            num_inserted: self.num_inserted(),
            num_deleted: self.num_deleted(),
            local_vocab_words: self.local_vocab.len(),
            epoch: self.epoch,
        }
    }

    /// The located entries of one permutation.
    pub fn located_triples_for(&self, permutation: Permutation) -> &LocatedTriplesPerBlock {
        &self.located[permutation.index()]
    }

    /// Read-consistent copy of one permutation's entries plus the local
    /// vocabulary, for consumption outside the lock.
    pub fn snapshot_for(&self, permutation: Permutation) -> DeltaSnapshot {
        DeltaSnapshot::new(
            permutation,
            self.located[permutation.index()].snapshot(),
            self.local_vocab.snapshot(),
            self.epoch,
        )
    }

    /// Translate a parsed triple to `Id`s, minting unknown components into
    /// the overlay's local vocabulary.
    pub fn id_triple(&mut self, turtle: &TurtleTriple) -> IdTriple {
        IdTriple::new(
            self.intern_term(&turtle.subject),
            self.intern_term(&turtle.predicate),
            self.intern_term(&turtle.object),
        )
    }

    fn intern_term(&mut self, term: &str) -> Id {
        match self.index.vocab().index_of(term) {
            Some(index) => Id::from_vocab_index(index),
            None => Id::from_local_vocab_index(self.local_vocab.get_index_and_add(term)),
        }
    }

    /// Record the insertion of a triple.
    pub fn insert_triple(&mut self, turtle: &TurtleTriple) -> Result<DeltaOutcome> {
        let span = tracing::debug_span!("delta_insert", triple = %turtle);
        let _guard = span.enter();
        let triple = self.id_triple(turtle);
        let outcome = self.insert_id_triple(triple)?;
        tracing::debug!(?outcome, "insert");
        Ok(outcome)
    }

    /// Record the deletion of a triple.
    pub fn delete_triple(&mut self, turtle: &TurtleTriple) -> Result<DeltaOutcome> {
        let span = tracing::debug_span!("delta_delete", triple = %turtle);
        let _guard = span.enter();
        let triple = self.id_triple(turtle);
        let outcome = self.delete_id_triple(triple)?;
        tracing::debug!(?outcome, "delete");
        Ok(outcome)
    }

    /// Insertion on an already interned triple.
    pub fn insert_id_triple(&mut self, triple: IdTriple) -> Result<DeltaOutcome> {
        // A pending delete is cancelled instead of recording an insert; the
        // triple is in the base, so after the cancellation scans see it
        // again.
        if let Some(handles) = self.triples_deleted.remove(&triple) {
            self.erase_in_all_permutations(handles)?;
            self.epoch += 1;
            return Ok(DeltaOutcome::CancelledPending);
        }
        if self.triples_inserted.contains_key(&triple) {
            return Ok(DeltaOutcome::AlreadyPending);
        }
        if self.index.contains(&triple) {
            return Ok(DeltaOutcome::AlreadyInBase);
        }
        let handles = self.locate_and_add(triple, DeltaKind::Insert)?;
        self.triples_inserted.insert(triple, handles);
        self.epoch += 1;
        Ok(DeltaOutcome::Applied)
    }

    /// Deletion on an already interned triple.
    pub fn delete_id_triple(&mut self, triple: IdTriple) -> Result<DeltaOutcome> {
        if let Some(handles) = self.triples_inserted.remove(&triple) {
            self.erase_in_all_permutations(handles)?;
            self.epoch += 1;
            return Ok(DeltaOutcome::CancelledPending);
        }
        if self.triples_deleted.contains_key(&triple) {
            return Ok(DeltaOutcome::AlreadyPending);
        }
        if !self.index.contains(&triple) {
            return Ok(DeltaOutcome::NotInBase);
        }
        let handles = self.locate_and_add(triple, DeltaKind::Delete)?;
        self.triples_deleted.insert(triple, handles);
        self.epoch += 1;
        Ok(DeltaOutcome::Applied)
    }

    /// Drop all pending deltas and reset the local vocabulary.
    pub fn clear(&mut self) {
        for container in &mut self.located {
            container.clear();
        }
        self.triples_inserted.clear();
        self.triples_deleted.clear();
        self.local_vocab.clear();
        self.epoch += 1;
    }

    /// Locate `triple` in all six permutations (in parallel) and add one
    /// entry per container. Nothing is added unless all six locations
    /// succeed.
    fn locate_and_add(
        &mut self,
        triple: IdTriple,
        kind: DeltaKind,
    ) -> Result<LocatedTripleHandles> {
        let index = &self.index;
        let mut slots: [Option<Result<LocatedTriple>>; 6] = Default::default();

        rayon::scope(|scope| {
            for (slot, permutation) in slots.iter_mut().zip(Permutation::ALL) {
                scope.spawn(move |_| {
                    *slot = Some(LocatedTriple::locate(
                        index.as_ref(),
                        permutation,
                        &triple,
                        kind,
                    ));
                });
            }
        });

        let mut entries = Vec::with_capacity(6);
        for slot in slots {
            entries.push(slot.expect("every permutation slot is filled by the scope")?);
        }

        let mut handles = Vec::with_capacity(6);
        for (container, entry) in self.located.iter_mut().zip(entries) {
            handles.push(container.add(entry));
        }
        Ok(LocatedTripleHandles {
            per_permutation: handles
                .try_into()
                .expect("exactly six permutation handles"),
        })
    }

    fn erase_in_all_permutations(&mut self, handles: LocatedTripleHandles) -> Result<()> {
        for (container, handle) in self.located.iter_mut().zip(handles.per_permutation) {
            container.erase(handle)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexad_core::MemoryIndex;

    fn turtle(s: &str, p: &str, o: &str) -> TurtleTriple {
        TurtleTriple::new(s, p, o)
    }

    fn base_index() -> Arc<dyn TripleIndex> {
        let triples = vec![
            turtle("<a>", "<knows>", "<b>"),
            turtle("<a>", "<knows>", "<c>"),
            turtle("<b>", "<knows>", "<c>"),
            turtle("<c>", "<likes>", "<a>"),
        ];
        Arc::new(MemoryIndex::build(&triples, 2).unwrap())
    }

    fn deltas() -> DeltaTriples {
        DeltaTriples::new(base_index())
    }

    #[test]
    fn test_insert_novel_triple_hits_all_six_permutations() {
        let mut deltas = deltas();
        let outcome = deltas.insert_triple(&turtle("<b>", "<likes>", "<c>")).unwrap();
        assert_eq!(outcome, DeltaOutcome::Applied);
        assert_eq!(deltas.num_inserted(), 1);
        assert_eq!(deltas.num_deleted(), 0);
        for permutation in Permutation::ALL {
            assert_eq!(deltas.located_triples_for(permutation).len(), 1);
        }
    }

    #[test]
    fn test_insert_then_delete_cancels() {
        let mut deltas = deltas();
        deltas.insert_triple(&turtle("<b>", "<likes>", "<c>")).unwrap();
        let outcome = deltas.delete_triple(&turtle("<b>", "<likes>", "<c>")).unwrap();
        assert_eq!(outcome, DeltaOutcome::CancelledPending);
        assert_eq!(deltas.num_inserted(), 0);
        assert_eq!(deltas.num_deleted(), 0);
        for permutation in Permutation::ALL {
            assert!(deltas.located_triples_for(permutation).is_empty());
        }
    }

    #[test]
    fn test_delete_then_insert_cancels() {
        let mut deltas = deltas();
        let outcome = deltas.delete_triple(&turtle("<a>", "<knows>", "<b>")).unwrap();
        assert_eq!(outcome, DeltaOutcome::Applied);
        assert_eq!(deltas.num_deleted(), 1);

        let outcome = deltas.insert_triple(&turtle("<a>", "<knows>", "<b>")).unwrap();
        assert_eq!(outcome, DeltaOutcome::CancelledPending);
        assert_eq!(deltas.num_inserted(), 0);
        assert_eq!(deltas.num_deleted(), 0);
    }

    #[test]
    fn test_insert_of_base_triple_is_a_noop() {
        let mut deltas = deltas();
        let outcome = deltas.insert_triple(&turtle("<a>", "<knows>", "<b>")).unwrap();
        assert_eq!(outcome, DeltaOutcome::AlreadyInBase);
        assert_eq!(deltas.num_inserted(), 0);
        assert_eq!(deltas.epoch(), 0);
    }

    #[test]
    fn test_delete_of_absent_triple_is_a_noop() {
        let mut deltas = deltas();
        let outcome = deltas.delete_triple(&turtle("<z>", "<knows>", "<z>")).unwrap();
        assert_eq!(outcome, DeltaOutcome::NotInBase);
        assert_eq!(deltas.num_deleted(), 0);
    }

    #[test]
    fn test_double_insert_is_pending_noop() {
        let mut deltas = deltas();
        deltas.insert_triple(&turtle("<b>", "<likes>", "<c>")).unwrap();
        let epoch = deltas.epoch();
        let outcome = deltas.insert_triple(&turtle("<b>", "<likes>", "<c>")).unwrap();
        assert_eq!(outcome, DeltaOutcome::AlreadyPending);
        assert_eq!(deltas.num_inserted(), 1);
        assert_eq!(deltas.epoch(), epoch);
    }

    #[test]
    fn test_sets_stay_disjoint() {
        let mut deltas = deltas();
        let operations = [
            ("ins", "<b>", "<likes>", "<c>"),
            ("del", "<a>", "<knows>", "<b>"),
            ("ins", "<a>", "<knows>", "<b>"),
            ("del", "<b>", "<likes>", "<c>"),
            ("del", "<a>", "<knows>", "<c>"),
            ("ins", "<x>", "<y>", "<z>"),
        ];
        for (op, s, p, o) in operations {
            let t = turtle(s, p, o);
            match op {
                "ins" => deltas.insert_triple(&t).unwrap(),
                _ => deltas.delete_triple(&t).unwrap(),
            };
            // Invariant: no triple pending in both directions.
            for key in deltas.triples_inserted.keys() {
                assert!(!deltas.triples_deleted.contains_key(key));
                assert!(!deltas.index.contains(key));
            }
            for key in deltas.triples_deleted.keys() {
                assert!(deltas.index.contains(key));
            }
        }
        assert_eq!(deltas.num_inserted(), 1); // <x> <y> <z>
        assert_eq!(deltas.num_deleted(), 1); // <a> <knows> <c>
    }

    #[test]
    fn test_unknown_terms_are_minted_locally() {
        let mut deltas = deltas();
        deltas.insert_triple(&turtle("<new>", "<knows>", "<b>")).unwrap();
        assert_eq!(deltas.local_vocab().len(), 1);
        assert!(deltas.local_vocab().lookup("<new>").is_some());

        // Interning is stable across calls.
        let t1 = deltas.id_triple(&turtle("<new>", "<knows>", "<b>"));
        let t2 = deltas.id_triple(&turtle("<new>", "<knows>", "<b>"));
        assert_eq!(t1, t2);
        assert!(t1.subject.local_vocab_index().is_some());
        assert!(t1.predicate.vocab_index().is_some());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut deltas = deltas();
        deltas.insert_triple(&turtle("<b>", "<likes>", "<c>")).unwrap();
        deltas.delete_triple(&turtle("<a>", "<knows>", "<b>")).unwrap();
        deltas.insert_triple(&turtle("<u>", "<v>", "<w>")).unwrap();
        let epoch = deltas.epoch();

        deltas.clear();
        assert_eq!(deltas.num_inserted(), 0);
        assert_eq!(deltas.num_deleted(), 0);
        assert!(deltas.local_vocab().is_empty());
        assert!(deltas.epoch() > epoch);
        for permutation in Permutation::ALL {
            assert!(deltas.located_triples_for(permutation).is_empty());
        }
    }

    #[test]
    fn test_snapshot_is_consistent_after_later_mutations() {
        let mut deltas = deltas();
        deltas.insert_triple(&turtle("<b>", "<likes>", "<c>")).unwrap();
        let snapshot = deltas.snapshot_for(Permutation::Spo);
        let epoch = snapshot.epoch();

        deltas.insert_triple(&turtle("<x>", "<y>", "<z>")).unwrap();
        let entries: usize = (0..=4).map(|b| snapshot.entries_for_block(b).len()).sum();
        assert_eq!(entries, 1);
        assert!(deltas.epoch() > epoch);
    }

    #[test]
    fn test_stats() {
        let mut deltas = deltas();
        deltas.insert_triple(&turtle("<n1>", "<knows>", "<n2>")).unwrap();
        deltas.delete_triple(&turtle("<a>", "<knows>", "<b>")).unwrap();
        let stats = deltas.stats();
        assert_eq!(stats.num_inserted, 1);
        assert_eq!(stats.num_deleted, 1);
        assert_eq!(stats.local_vocab_words, 2);
        assert_eq!(stats.epoch, 2);
    }
}
