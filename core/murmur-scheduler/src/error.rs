//! Error types for the load scheduler.

use thiserror::Error;

/// Result type for scheduler-level failures.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Failures the scheduler itself produces. Load errors pass through
/// untouched; these only describe what happened to the shared load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The request that owned the load was dropped before it settled.
    #[error("load abandoned before completion")]
    Abandoned,
}
