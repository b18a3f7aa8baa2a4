//! Error types for query execution

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, QueryError>;

/// Query execution errors
#[derive(Error, Debug)]
pub enum QueryError {
    /// Error from hexad-core (block fetch, vocabulary)
    #[error("core error: {0}")]
    Core(#[from] hexad_core::CoreError),

    /// Error from the delta overlay
    #[error("delta error: {0}")]
    Delta(#[from] hexad_delta::DeltaError),

    /// A materialized result was read as lazy, or vice versa
    #[error("wrong result variant: {0}")]
    WrongVariant(&'static str),

    /// Second attempt to consume a lazy result
    #[error("a lazy result can only be consumed once")]
    AlreadyConsumed,

    /// A sort column index is not smaller than the column count
    #[error("sort column {column} out of range: every sort column must be smaller than the column count {num_columns}")]
    InvalidSortColumn { column: usize, num_columns: usize },

    /// Adjacent rows break the declared sort order
    #[error("compareRowsBySortColumns: row {row} is smaller than its predecessor on sort columns {columns:?}")]
    SortOrderViolated { row: usize, columns: Vec<usize> },

    /// UNDEFINED appeared in a column declared always defined
    #[error("column of variable {variable} is declared always defined, but row {row} holds UNDEFINED")]
    DefinednessViolated { variable: String, row: usize },

    /// A stream emitted more rows than the declared limit permits
    #[error("limit of {limit} rows exceeded: {rows} rows were emitted")]
    LimitExceeded { limit: u64, rows: u64 },

    /// A chunk producer failed outside the error channel
    #[error("chunk producer failed: {0}")]
    ProducerFailure(String),

    /// An aggregate function name could not be recognized
    #[error("unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// A variable is not part of the input schema
    #[error("variable {0} is not part of the input")]
    MissingVariable(String),

    /// Cooperative cancellation was observed
    #[error("query execution was cancelled")]
    Cancelled,
}
