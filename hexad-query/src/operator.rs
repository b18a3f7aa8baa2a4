//! The operator interface
//!
//! Every node of a query tree implements [`Operation`]. The planner wires
//! operations into a tree; evaluation asks the root for its result, which
//! pulls the children's results in turn.
//!
//! `as_string` doubles as the result-cache key, so implementations must
//! render variable lists in a stable (alphabetical) order: equivalent
//! queries must produce identical keys.

use crate::chunks::TableChunks;
use crate::context::ExecutionContext;
use crate::error::Result;
use crate::result::QueryResult;
use crate::variable::VariableToColumnMap;
use hexad_core::{IdTable, SharedLocalVocab};

/// A query-tree node.
pub trait Operation: Send + Sync {
    /// Evaluate this node.
    fn compute_result(&self, ctx: &ExecutionContext) -> Result<QueryResult>;

    /// Number of output columns.
    fn result_width(&self) -> usize;

    /// Columns the output is guaranteed to be sorted by.
    fn result_sorted_on(&self) -> Vec<usize>;

    /// Output variables and their columns.
    fn variable_columns(&self) -> &VariableToColumnMap;

    /// Estimated number of result rows.
    fn size_estimate(&self) -> usize;

    /// Estimated evaluation cost.
    fn cost_estimate(&self) -> usize;

    /// Estimated multiplicity of the given output column.
    fn multiplicity(&self, _column: usize) -> f64 {
        1.0
    }

    /// Textual form of the subtree, used as cache key and for debugging.
    fn as_string(&self, indent: usize) -> String;
}

/// Boxed operation for tree composition.
pub type BoxedOperation = Box<dyn Operation>;

/// Variable names of a column map in alphabetical order, for cache keys.
pub fn sorted_variable_names(variables: &VariableToColumnMap) -> Vec<String> {
    let mut names: Vec<String> = variables.keys().map(|v| v.name().to_string()).collect();
    names.sort();
    names
}

/// An operation around an already computed table.
///
/// Serves as the leaf under test harnesses and as the adapter for cached
/// results. Can replay its table either materialized or as a lazy stream
/// of fixed-size chunks.
pub struct PrecomputedOperation {
    table: IdTable,
    sorted_by: Vec<usize>,
    variables: VariableToColumnMap,
    local_vocab: SharedLocalVocab,
    lazy_chunk_rows: Option<usize>,
}

impl PrecomputedOperation {
    /// Replay `table` as a materialized result.
    pub fn materialized(
        table: IdTable,
        sorted_by: Vec<usize>,
        variables: VariableToColumnMap,
    ) -> Self {
        Self {
            table,
            sorted_by,
            variables,
            local_vocab: SharedLocalVocab::default(),
            lazy_chunk_rows: None,
        }
    }

    /// Replay `table` as a lazy stream of `chunk_rows`-sized chunks.
    pub fn lazy(
        table: IdTable,
        sorted_by: Vec<usize>,
        variables: VariableToColumnMap,
        chunk_rows: usize,
    ) -> Self {
        Self {
            table,
            sorted_by,
            variables,
            local_vocab: SharedLocalVocab::default(),
            lazy_chunk_rows: Some(chunk_rows.max(1)),
        }
    }

    /// Attach a local vocabulary to the replayed result.
    pub fn with_local_vocab(mut self, local_vocab: SharedLocalVocab) -> Self {
        self.local_vocab = local_vocab;
        self
    }
}

impl Operation for PrecomputedOperation {
    fn compute_result(&self, _ctx: &ExecutionContext) -> Result<QueryResult> {
        match self.lazy_chunk_rows {
            None => QueryResult::materialized(
                self.table.clone(),
                self.sorted_by.clone(),
                self.local_vocab.clone(),
            ),
            Some(chunk_rows) => {
                let mut chunks = Vec::new();
                let mut offset = 0;
                while offset < self.table.num_rows() {
                    chunks.push(self.table.window(offset, chunk_rows));
                    offset += chunk_rows;
                }
                Ok(QueryResult::lazy(
                    TableChunks::new(chunks),
                    self.sorted_by.clone(),
                    self.local_vocab.clone(),
                ))
            }
        }
    }

    fn result_width(&self) -> usize {
        self.table.num_columns()
    }

    fn result_sorted_on(&self) -> Vec<usize> {
        self.sorted_by.clone()
    }

    fn variable_columns(&self) -> &VariableToColumnMap {
        &self.variables
    }

    fn size_estimate(&self) -> usize {
        self.table.num_rows()
    }

    fn cost_estimate(&self) -> usize {
        self.table.num_rows()
    }

    fn as_string(&self, indent: usize) -> String {
        format!(
            "{}PRECOMPUTED {}x{} [{}]",
            " ".repeat(indent),
            self.table.num_rows(),
            self.table.num_columns(),
            sorted_variable_names(&self.variables).join(", "),
        )
    }
}
