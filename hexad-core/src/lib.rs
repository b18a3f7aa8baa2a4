//! # Hexad Core
//!
//! Core types for the hexad SPARQL execution engine.
//!
//! This crate provides:
//! - The tagged 64-bit identifier (`Id`) and the `IdTriple` record
//! - `IdTable`, the columnar tuple carrier shared by all operators
//! - `LocalVocab` / `SharedLocalVocab`, the query-scope string dictionary
//! - The six triple permutations and their comparators
//! - The `TripleIndex` trait consumed by the execution core, plus an
//!   in-memory reference implementation (`MemoryIndex`)
//! - Cooperative cancellation (`CancellationToken`)
//!
//! ## Design Principles
//!
//! 1. **Opaque identifiers**: operators compare `Id`s bitwise; only the
//!    aggregation layer interprets tags
//! 2. **Cheap sharing**: `IdTable` clones share column storage, mutation
//!    takes an owned copy
//! 3. **Seal-on-share**: a `LocalVocab` is append-only while exclusively
//!    owned and immutable once turned into a `SharedLocalVocab`

pub mod cancel;
pub mod error;
pub mod id;
pub mod id_table;
pub mod index;
pub mod local_vocab;
pub mod permutation;
pub mod triple;

pub use cancel::CancellationToken;
pub use error::{CoreError, Result};
pub use id::{Id, VocabIndex};
pub use id_table::IdTable;
pub use index::{BlockMetadata, MemoryIndex, TripleIndex, Vocabulary};
pub use local_vocab::{LocalVocab, LocalVocabIndex, SharedLocalVocab};
pub use permutation::Permutation;
pub use triple::{IdTriple, TurtleTriple};
