//! Merging located delta triples into permutation scans
//!
//! For each visited block of a scan, the base rows are interleaved with the
//! block's located entries: a delete entry suppresses the base row it is
//! located at, an insert entry is emitted immediately before the base row
//! it was located at. Entries located at the phantom block (index
//! `num_blocks`) are appended after the last base block.
//!
//! Because entries are positioned by the rules in [`crate::located`], the
//! merged stream preserves the permutation's sort order by construction.

use crate::located::{DeltaKind, LocatedTriple};
use hexad_core::{IdTable, Permutation, SharedLocalVocab};
use std::collections::BTreeMap;

/// Interleave `entries` (sorted, all located in this block) with the base
/// rows of one block. Returns the merged rows.
pub fn merge_block_rows(
    base: &IdTable,
    entries: &[LocatedTriple],
    permutation: Permutation,
) -> IdTable {
    if entries.is_empty() {
        return base.clone();
    }

    let inserts = entries
        .iter()
        .filter(|e| e.kind == DeltaKind::Insert)
        .count();
    let mut merged = IdTable::with_capacity(3, base.num_rows() + inserts);

    let mut next_entry = 0;
    for row in 0..base.num_rows() {
        let mut suppressed = false;
        while next_entry < entries.len() && entries[next_entry].row_index == row {
            let entry = &entries[next_entry];
            match entry.kind {
                DeltaKind::Insert => merged.push_row(&permutation.key(&entry.triple)),
                DeltaKind::Delete => {
                    debug_assert_eq!(
                        permutation.key(&entry.triple),
                        [base.at(row, 0), base.at(row, 1), base.at(row, 2)],
                        "a delete entry must be located at the row it deletes"
                    );
                    suppressed = true;
                }
            }
            next_entry += 1;
        }
        if !suppressed {
            merged.push_row(&[base.at(row, 0), base.at(row, 1), base.at(row, 2)]);
        }
    }
    // Entries located one past the last row can only exist for the phantom
    // block, which is handled by `trailing_insert_rows`.
    debug_assert_eq!(next_entry, entries.len(), "unconsumed block entries");

    merged
}

/// Rows for insert entries located at the phantom block.
pub fn trailing_insert_rows(entries: &[LocatedTriple], permutation: Permutation) -> IdTable {
    let mut rows = IdTable::with_capacity(3, entries.len());
    for entry in entries {
        debug_assert_eq!(
            entry.kind,
            DeltaKind::Insert,
            "only insertions can be located past the last block"
        );
        rows.push_row(&permutation.key(&entry.triple));
    }
    rows
}

impl crate::located::LocatedTriplesPerBlock {
    /// Base rows of one block merged with this container's entries, read
    /// directly (callers holding the overlay lock; scans prefer a
    /// [`DeltaSnapshot`]).
    pub fn merge_into_block_scan(&self, block_index: usize, base: &IdTable) -> IdTable {
        let entries: Vec<LocatedTriple> = self.entries_for_block(block_index).copied().collect();
        merge_block_rows(base, &entries, self.permutation())
    }
}

/// Read-consistent copy of one permutation's located entries.
///
/// Taken under the overlay's read lock and consumed lock-free afterwards,
/// so a long scan never holds up writers.
#[derive(Debug)]
pub struct DeltaSnapshot {
    permutation: Permutation,
    blocks: BTreeMap<usize, Vec<LocatedTriple>>,
    local_vocab: SharedLocalVocab,
    epoch: u64,
}

impl DeltaSnapshot {
    pub(crate) fn new(
        permutation: Permutation,
        blocks: BTreeMap<usize, Vec<LocatedTriple>>,
        local_vocab: SharedLocalVocab,
        epoch: u64,
    ) -> Self {
        Self {
            permutation,
            blocks,
            local_vocab,
            epoch,
        }
    }

    /// Snapshot with no entries (scans without an overlay).
    pub fn empty(permutation: Permutation) -> Self {
        Self::new(permutation, BTreeMap::new(), SharedLocalVocab::default(), 0)
    }

    /// The permutation this snapshot belongs to.
    pub fn permutation(&self) -> Permutation {
        self.permutation
    }

    /// The overlay's local vocabulary at snapshot time.
    pub fn local_vocab(&self) -> &SharedLocalVocab {
        &self.local_vocab
    }

    /// The overlay epoch at snapshot time (cache-key ingredient).
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the snapshot carries no entries at all.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Sorted entries located in `block_index`.
    pub fn entries_for_block(&self, block_index: usize) -> &[LocatedTriple] {
        self.blocks.get(&block_index).map_or(&[], Vec::as_slice)
    }

    /// Base rows of one block merged with this snapshot's entries.
    pub fn merge_block(&self, block_index: usize, base: &IdTable) -> IdTable {
        merge_block_rows(base, self.entries_for_block(block_index), self.permutation)
    }

    /// Rows appended after the last base block (`num_blocks` = phantom).
    pub fn trailing_rows(&self, num_blocks: usize) -> IdTable {
        trailing_insert_rows(self.entries_for_block(num_blocks), self.permutation)
    }
}
