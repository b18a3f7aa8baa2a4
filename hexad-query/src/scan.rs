//! Permutation scan with delta overlay
//!
//! `IndexScan` walks one permutation block by block and produces a lazy
//! result: the pending delta triples located in each block are merged
//! into its rows, consecutive merged blocks are coalesced into one chunk
//! until the context's row target is reached, and insertions located past
//! the last block are appended to the final chunk.
//!
//! The overlay is read through a snapshot taken under the read lock when
//! the scan starts, so a long-running consumer never blocks writers, and
//! the scan sees one consistent overlay state. The snapshot's epoch is
//! part of the cache key: any later mutation invalidates cached scans.

use crate::context::ExecutionContext;
use crate::error::{QueryError, Result};
use crate::operator::{sorted_variable_names, Operation};
use crate::result::QueryResult;
use crate::variable::{ColumnIndexAndTypeInfo, Variable, VariableToColumnMap};
use hexad_core::{Permutation, TripleIndex};
use hexad_delta::{DeltaSnapshot, SharedDeltaTriples};
use std::sync::Arc;

/// Full scan of one permutation, merging the delta overlay into each block.
pub struct IndexScan {
    index: Arc<dyn TripleIndex>,
    permutation: Permutation,
    deltas: Option<SharedDeltaTriples>,
    variables: VariableToColumnMap,
}

impl IndexScan {
    /// Scan `permutation` of `index`, binding the subject, predicate and
    /// object to the given variables. Output columns are in the
    /// permutation's key order.
    pub fn new(
        index: Arc<dyn TripleIndex>,
        permutation: Permutation,
        subject: Variable,
        predicate: Variable,
        object: Variable,
    ) -> Self {
        let mut variables = VariableToColumnMap::default();
        variables.insert(
            subject,
            ColumnIndexAndTypeInfo::always_defined(permutation.subject_column()),
        );
        variables.insert(
            predicate,
            ColumnIndexAndTypeInfo::always_defined(permutation.predicate_column()),
        );
        variables.insert(
            object,
            ColumnIndexAndTypeInfo::always_defined(permutation.object_column()),
        );
        Self {
            index,
            permutation,
            deltas: None,
            variables,
        }
    }

    /// Merge the given overlay into the scan.
    pub fn with_deltas(mut self, deltas: SharedDeltaTriples) -> Self {
        self.deltas = Some(deltas);
        self
    }

    fn take_snapshot(&self) -> DeltaSnapshot {
        match &self.deltas {
            Some(shared) => shared.read().snapshot_for(self.permutation),
            None => DeltaSnapshot::empty(self.permutation),
        }
    }
}

impl Operation for IndexScan {
    fn compute_result(&self, ctx: &ExecutionContext) -> Result<QueryResult> {
        let snapshot = self.take_snapshot();
        let local_vocab = snapshot.local_vocab().clone();
        let index = Arc::clone(&self.index);
        let permutation = self.permutation;
        let num_blocks = index.block_metadata(permutation).len();
        let cancellation = ctx.cancellation().clone();

        tracing::debug!(
            permutation = %permutation,
            num_blocks,
            delta_epoch = snapshot.epoch(),
            "index scan"
        );

        let target_rows = ctx.chunk_rows();
        let mut next_block = 0usize;
        let mut done = false;
        let producer = crate::chunks::producer_fn(move || {
            if done {
                return Ok(None);
            }
            let mut chunk: Option<hexad_core::IdTable> = None;
            loop {
                if cancellation.is_cancelled() {
                    done = true;
                    return Err(QueryError::Cancelled);
                }
                if next_block < num_blocks {
                    let base = index.block(permutation, next_block)?;
                    let merged = snapshot.merge_block(next_block, &base);
                    next_block += 1;
                    if merged.is_empty() {
                        // Every base row of the block was deleted.
                        continue;
                    }
                    match chunk.as_mut() {
                        None => chunk = Some(merged),
                        Some(accumulated) => accumulated.append(&merged),
                    }
                    // Coalesce further blocks until the row target.
                    if chunk.as_ref().is_some_and(|c| c.num_rows() >= target_rows) {
                        return Ok(chunk.take());
                    }
                    continue;
                }
                done = true;
                let trailing = snapshot.trailing_rows(num_blocks);
                if !trailing.is_empty() {
                    match chunk.as_mut() {
                        None => chunk = Some(trailing),
                        Some(accumulated) => accumulated.append(&trailing),
                    }
                }
                return Ok(chunk.take());
            }
        });

        Ok(QueryResult::lazy(producer, vec![0, 1, 2], local_vocab))
    }

    fn result_width(&self) -> usize {
        3
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        vec![0, 1, 2]
    }

    fn variable_columns(&self) -> &VariableToColumnMap {
        &self.variables
    }

    fn size_estimate(&self) -> usize {
        let pending = self
            .deltas
            .as_ref()
            .map_or(0, |shared| shared.read().num_inserted());
        self.index.num_triples() + pending
    }

    fn cost_estimate(&self) -> usize {
        self.size_estimate()
    }

    fn as_string(&self, indent: usize) -> String {
        // The epoch makes cached scans invalid across overlay mutations.
        let epoch = self
            .deltas
            .as_ref()
            .map_or(0, |shared| shared.read().epoch());
        format!(
            "{}SCAN {} epoch={} [{}]",
            " ".repeat(indent),
            self.permutation.label(),
            epoch,
            sorted_variable_names(&self.variables).join(", "),
        )
    }
}
