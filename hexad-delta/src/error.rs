//! Error types for the delta overlay

use hexad_core::CoreError;
use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, DeltaError>;

/// Delta overlay errors
#[derive(Error, Debug)]
pub enum DeltaError {
    /// Error from hexad-core (block fetch, vocabulary)
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// A handle did not resolve to a live entry
    #[error("stale located-triple handle")]
    StaleHandle,
}
