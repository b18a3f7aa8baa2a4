//! # Hexad Delta
//!
//! Overlay for triples inserted into or deleted from the base index after
//! its immutable build. How it works in principle:
//!
//! 1. For each delta triple, find its location in each of the six
//!    permutations (block index and row index within that block).
//! 2. Per permutation and block, keep a sorted list of the located delta
//!    triples ([`LocatedTriplesPerBlock`]).
//! 3. During a permutation scan, merge the relevant entries into each
//!    block's rows ([`merge_block_rows`]); the merged stream stays sorted
//!    by construction.
//!
//! # Design
//!
//! - **Stable handles**: located entries live in a slab; the sorted
//!   per-block sets store slab ids, so a handle survives unrelated
//!   insertions and erasures
//! - **Six-way synchronization**: [`DeltaTriples`] records, per pending
//!   triple, the six handles needed to undo it, and keeps the inserted and
//!   deleted sets disjoint
//! - **Snapshot reads**: scans copy one permutation's entries under a read
//!   lock ([`DeltaSnapshot`]); mutations only ever wait for that copy

pub mod delta;
pub mod error;
pub mod located;
pub mod merge;

pub use delta::{DeltaOutcome, DeltaStats, DeltaTriples, SharedDeltaTriples};
pub use error::{DeltaError, Result};
pub use located::{DeltaKind, LocatedTriple, LocatedTripleHandle, LocatedTriplesPerBlock};
pub use merge::{merge_block_rows, trailing_insert_rows, DeltaSnapshot};
