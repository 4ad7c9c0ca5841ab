//! Error types for the engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and simulation execution.

/// Top-level error for the engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: vitalis_core::config::ConfigError,
    },

    /// Assembling or running the simulation failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: vitalis_core::RunnerError,
    },

    /// A tracker summary could not be rendered.
    #[error("summary error: {source}")]
    Summary {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}
