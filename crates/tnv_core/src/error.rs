//! Error types for the TNV solver.
//!
//! Every fatal condition of a solve maps onto one [`TnvError`] variant. Bad
//! arguments are rejected by the public layer before any buffer is touched;
//! the inner context and kernel assume validated input.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type TnvResult<T> = Result<T, TnvError>;

/// Main error type for the TNV solver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TnvError {
    /// A worker buffer could not be reserved.
    #[error("failed to allocate {bytes} bytes of worker buffers")]
    Allocation { bytes: usize },

    /// The thread pool could not be built or a worker failed during dispatch.
    #[error("scheduler failure: {0}")]
    Scheduler(String),

    /// Invalid parameters or mismatched volume shapes.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<rayon::ThreadPoolBuildError> for TnvError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        TnvError::Scheduler(format!("failed to build thread pool: {err}"))
    }
}
