//! Located triples for one permutation
//!
//! A delta triple's position in a permutation is a `(block index, row index
//! within that block)` pair:
//!
//! 1. If the triple is contained in the permutation, its position is its
//!    block and row.
//! 2. If a block straddles the triple (first triple smaller, last larger),
//!    the position is the first row that is larger.
//! 3. If the triple falls between two blocks, the position is row 0 of the
//!    later block.
//! 4. If the triple is smaller than everything, the position is row 0 of
//!    block 0.
//! 5. If the triple is larger than everything, the block index is one past
//!    the last block (the "phantom block"); such entries are appended at
//!    the tail of a full scan.

use crate::error::{DeltaError, Result};
use hexad_core::{Id, IdTriple, Permutation, TripleIndex};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Whether a delta triple is an insertion or a deletion.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum DeltaKind {
    Insert,
    Delete,
}

/// One delta triple positioned inside one permutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocatedTriple {
    /// Index of the block the triple falls into (`num_blocks` = phantom).
    pub block_index: usize,
    /// Row index within that block, per the rules in the module docs.
    pub row_index: usize,
    /// The triple itself.
    pub triple: IdTriple,
    /// Insertion or deletion.
    pub kind: DeltaKind,
}

impl LocatedTriple {
    /// Locate `triple` in `permutation` of the base index.
    pub fn locate(
        index: &dyn TripleIndex,
        permutation: Permutation,
        triple: &IdTriple,
        kind: DeltaKind,
    ) -> Result<Self> {
        let metadata = index.block_metadata(permutation);

        // First block whose last triple is not smaller than ours.
        let block_index = metadata
            .partition_point(|meta| permutation.compare(&meta.last, triple) == Ordering::Less);

        let position = if block_index == metadata.len() {
            // Larger than everything: phantom block.
            (block_index, 0)
        } else if permutation.compare(&metadata[block_index].first, triple) == Ordering::Greater {
            // Falls before this block (between blocks, or before block 0).
            (block_index, 0)
        } else {
            // Inside the block: first row that is not smaller.
            let key = permutation.key(triple);
            let rows = index.block(permutation, block_index)?;
            let row_index = partition_rows(&rows, |row_key| row_key < key);
            (block_index, row_index)
        };

        Ok(Self {
            block_index: position.0,
            row_index: position.1,
            triple: *triple,
            kind,
        })
    }
}

/// First row index for which `pred` on the row's key is false.
fn partition_rows(rows: &hexad_core::IdTable, pred: impl Fn([Id; 3]) -> bool) -> usize {
    let mut low = 0;
    let mut high = rows.num_rows();
    while low < high {
        let mid = low + (high - low) / 2;
        let key = [rows.at(mid, 0), rows.at(mid, 1), rows.at(mid, 2)];
        if pred(key) {
            low = mid + 1;
        } else {
            high = mid;
        }
    }
    low
}

/// Stable cursor to an entry of a [`LocatedTriplesPerBlock`] container.
///
/// Handles are slab ids, not pointers: they stay valid across unrelated
/// additions and erasures of the same container.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LocatedTripleHandle(u32);

/// Sort key of an entry within its block: `(row, triple key, kind)`, with
/// the slab id as final tiebreak.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
struct EntryKey {
    row_index: usize,
    triple_key: [Id; 3],
    kind: DeltaKind,
    slot: u32,
}

/// All located delta triples of one permutation, grouped by block and kept
/// sorted within each block.
#[derive(Debug)]
pub struct LocatedTriplesPerBlock {
    permutation: Permutation,
    entries: Vec<Option<LocatedTriple>>,
    free_slots: Vec<u32>,
    blocks: BTreeMap<usize, BTreeSet<EntryKey>>,
    len: usize,
}

impl LocatedTriplesPerBlock {
    /// Empty container for one permutation.
    pub fn new(permutation: Permutation) -> Self {
        Self {
            permutation,
            entries: Vec::new(),
            free_slots: Vec::new(),
            blocks: BTreeMap::new(),
            len: 0,
        }
    }

    /// The permutation this container belongs to.
    pub fn permutation(&self) -> Permutation {
        self.permutation
    }

    /// Add an entry, returning a stable handle for later erasure.
    pub fn add(&mut self, located: LocatedTriple) -> LocatedTripleHandle {
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.entries[slot as usize] = Some(located);
                slot
            }
            None => {
                let slot = self.entries.len() as u32;
                self.entries.push(Some(located));
                slot
            }
        };
        let key = self.entry_key(&located, slot);
        self.blocks.entry(located.block_index).or_default().insert(key);
        self.len += 1;
        LocatedTripleHandle(slot)
    }

    /// Erase the entry behind `handle`.
    pub fn erase(&mut self, handle: LocatedTripleHandle) -> Result<()> {
        let slot = handle.0;
        let located = self
            .entries
            .get_mut(slot as usize)
            .and_then(Option::take)
            .ok_or(DeltaError::StaleHandle)?;

        let key = self.entry_key(&located, slot);
        if let Some(set) = self.blocks.get_mut(&located.block_index) {
            set.remove(&key);
            if set.is_empty() {
                self.blocks.remove(&located.block_index);
            }
        }
        self.free_slots.push(slot);
        self.len -= 1;
        Ok(())
    }

    /// Total number of entries across all blocks (cached).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the container is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of entries located in `block_index`.
    pub fn count_for_block(&self, block_index: usize) -> usize {
        self.blocks.get(&block_index).map_or(0, BTreeSet::len)
    }

    /// Entries of one block, in `(row, triple, kind)` order.
    pub fn entries_for_block(
        &self,
        block_index: usize,
    ) -> impl Iterator<Item = &LocatedTriple> + '_ {
        self.blocks
            .get(&block_index)
            .into_iter()
            .flat_map(move |set| {
                set.iter().map(move |key| {
                    self.entries[key.slot as usize]
                        .as_ref()
                        .expect("sorted sets only reference live slots")
                })
            })
    }

    /// Indices of all blocks holding at least one entry, ascending.
    pub fn blocks_with_entries(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocks.keys().copied()
    }

    /// Sorted copy of every block's entries, for lock-free consumption.
    pub fn snapshot(&self) -> BTreeMap<usize, Vec<LocatedTriple>> {
        self.blocks
            .iter()
            .map(|(&block, set)| {
                (
                    block,
                    set.iter()
                        .map(|key| {
                            *self.entries[key.slot as usize]
                                .as_ref()
                                .expect("sorted sets only reference live slots")
                        })
                        .collect(),
                )
            })
            .collect()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.free_slots.clear();
        self.blocks.clear();
        self.len = 0;
    }

    fn entry_key(&self, located: &LocatedTriple, slot: u32) -> EntryKey {
        EntryKey {
            row_index: located.row_index,
            triple_key: self.permutation.key(&located.triple),
            kind: located.kind,
            slot,
        }
    }
}
