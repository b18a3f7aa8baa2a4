//! # Hexad Query
//!
//! Query execution core for the hexad engine.
//!
//! This crate provides:
//! - [`QueryResult`], the carrier every operator produces: either a fully
//!   materialized `IdTable` or a single-consumer lazy sequence of chunks,
//!   with sort metadata and a shared local vocabulary
//! - The chunk-producer framework: explicit `next_chunk` producers,
//!   decorator wrappers for on-the-fly invariant checking, limit/offset
//!   windowing, consumption caching and chunk callbacks, plus a
//!   worker-thread handoff with cooperative cancellation
//! - The [`Operation`] trait implemented by every query-tree node
//! - [`IndexScan`], a permutation scan that merges the delta overlay into
//!   each block
//! - [`GroupBy`], the aggregation operator
//!
//! ## Consumer contract
//!
//! A lazy result is consumed by exactly one consumer, at most once. Its
//! finish callback (if registered) fires exactly once: after complete
//! consumption, after an early stop, or with the error flag set when the
//! producer fails.

pub mod checks;
pub mod chunks;
pub mod context;
pub mod error;
pub mod group_by;
pub mod operator;
pub mod result;
pub mod scan;
pub mod variable;

pub use checks::{expensive_checks_enabled, set_expensive_checks_enabled};
pub use chunks::{producer_fn, BoxedChunkProducer, ChunkProducer, TableChunks, WorkerProducer};
pub use context::ExecutionContext;
pub use error::{QueryError, Result};
pub use group_by::{AggregateAlias, AggregateKind, GroupBy};
pub use operator::{BoxedOperation, Operation, PrecomputedOperation};
pub use result::{ChunkStream, LimitOffsetClause, QueryResult};
pub use scan::IndexScan;
pub use variable::{ColumnIndexAndTypeInfo, Definedness, Variable, VariableToColumnMap};
