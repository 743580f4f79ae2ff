use progsearch_worker::WorkerError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    /// A worker raised or panicked. The search is abandoned.
    #[error("worker for job {job} failed: {message}")]
    WorkerFailure { job: u64, message: String },
    #[error("invalid search configuration: {0}")]
    InvalidConfig(String),
    #[error("{grammars} grammars supplied for {tasks} tasks")]
    GrammarMismatch { grammars: usize, tasks: usize },
    #[error("result channel closed while {running} jobs were running")]
    ChannelClosed { running: usize },
    #[error("failed to spawn worker thread")]
    Spawn(#[source] io::Error),
    #[error("failed to prepare job {job}")]
    Prepare {
        job: u64,
        #[source]
        source: WorkerError,
    },
    #[error("failed to load configuration from {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },
}
