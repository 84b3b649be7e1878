use thiserror::Error;

/// Errors returned by the scan engine.
///
/// A non-associative combine operator is not one of them: it is a
/// precondition the engine cannot observe, and breaking it gives wrong output
/// rather than an error.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Output holds {output} elements but the input has {input}")]
    LengthMismatch { input: usize, output: usize },

    #[error("Failed to allocate carry storage: {slots} slots ({bytes} bytes)")]
    ScratchAllocation { slots: usize, bytes: usize },

    #[error("Dependency {kernel} (event {event}) has not completed")]
    UnmetDependency { event: u64, kernel: &'static str },

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
