//! Execution context for query operators
//!
//! Carries what every operator evaluation needs: the base index (for block
//! fetches and vocabulary lookups), the query's cancellation token, and the
//! row target for coalescing chunks.

use crate::error::{QueryError, Result};
use hexad_core::{CancellationToken, TripleIndex};
use std::sync::Arc;

/// Per-query execution state shared by all operators of one tree.
#[derive(Clone)]
pub struct ExecutionContext {
    index: Arc<dyn TripleIndex>,
    cancellation: CancellationToken,
    chunk_rows: usize,
}

impl ExecutionContext {
    /// Context over the given base index with a fresh cancellation token.
    pub fn new(index: Arc<dyn TripleIndex>) -> Self {
        Self {
            index,
            cancellation: CancellationToken::new(),
            chunk_rows: 1000,
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Target row count when coalescing chunks.
    pub fn with_chunk_rows(mut self, chunk_rows: usize) -> Self {
        self.chunk_rows = chunk_rows.max(1);
        self
    }

    /// The base index.
    pub fn index(&self) -> &Arc<dyn TripleIndex> {
        &self.index
    }

    /// The query's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Target row count when coalescing chunks.
    pub fn chunk_rows(&self) -> usize {
        self.chunk_rows
    }

    /// Fail with `Cancelled` if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancellation.is_cancelled() {
            Err(QueryError::Cancelled)
        } else {
            Ok(())
        }
    }
}
