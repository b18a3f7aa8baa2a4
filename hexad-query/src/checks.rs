//! Runtime gate for expensive result invariant checks
//!
//! Sort-order and definedness verification walk every row of every chunk.
//! They are on by default in debug builds and can be toggled at runtime
//! (e.g. by an engine flag in release deployments). Skipping the checks
//! never changes the data a result emits.

use std::sync::atomic::{AtomicBool, Ordering};

static EXPENSIVE_CHECKS: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

/// Whether per-row result verification is currently enabled.
pub fn expensive_checks_enabled() -> bool {
    EXPENSIVE_CHECKS.load(Ordering::Relaxed)
}

/// Enable or disable per-row result verification.
pub fn set_expensive_checks_enabled(enabled: bool) {
    EXPENSIVE_CHECKS.store(enabled, Ordering::Relaxed);
}
