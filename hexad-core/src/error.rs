//! Error types for hexad-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// A block index outside the permutation's block range was requested
    #[error("block {block_index} out of range for {permutation} ({num_blocks} blocks)")]
    BlockOutOfRange {
        permutation: &'static str,
        block_index: usize,
        num_blocks: usize,
    },

    /// Index construction was asked for a zero-row block size
    #[error("invalid block size: {0}")]
    InvalidBlockSize(usize),

    /// A vocabulary lookup failed for a word that must be present
    #[error("unknown vocabulary word: {0}")]
    UnknownWord(String),
}
