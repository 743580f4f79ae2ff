//! Round-based scheduling of program enumeration across worker threads.
//!
//! [`JobScheduler::search`] groups tasks into jobs that can share one
//! enumeration, widens each job's cost window round by round, and merges what
//! the workers find into bounded per-task frontiers.

pub mod allocation;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod jobs;
pub mod report;
pub mod scheduler;
pub mod stopwatch;

pub use allocation::allocate_cpus;
#[cfg(feature = "cli")]
pub use cli::{run_cli, Cli};
pub use config::SearchConfig;
pub use error::SearchError;
pub use jobs::{partition, GrammarSource, Job, JobKey};
pub use report::{SearchReport, SolutionReport, TaskReport};
pub use scheduler::{JobScheduler, SearchOutcome};
pub use stopwatch::Stopwatch;
