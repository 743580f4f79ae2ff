use progsearch_lang::{InferenceError, PcfgError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// A program produced or returned by a backend does not type-check
    /// against the request it was enumerated for.
    #[error("program `{program}` does not type-check against {request}: {source}")]
    TypeMismatch {
        program: String,
        request: String,
        #[source]
        source: InferenceError,
    },
    #[error(
        "malformed response from solver backend: {reason}\n--- request ---\n{request}\n--- response ---\n{response}"
    )]
    BackendProtocol {
        reason: String,
        /// The message sent to the solver.
        request: String,
        /// Whatever the solver wrote back.
        response: String,
    },
    #[error("failed to run solver `{}`: {source}", solver.display())]
    Spawn {
        solver: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    RuleTable(#[from] PcfgError),
    #[error("failed to build worker thread pool: {0}")]
    ThreadPool(String),
}
