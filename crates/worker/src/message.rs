//! What the scheduler hands a worker and what comes back.

use crate::task::Task;
use polytype::TypeScheme;
use progsearch_frontier::{Frontier, PERFECT_LOG_LIKELIHOOD};
use progsearch_lang::{CostWindow, Grammar, Pcfg, DEFAULT_MAX_DEPTH};
use std::sync::Arc;
use std::time::Duration;

/// Tunables shared by every worker of a search.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOptions {
    pub perfect_log_likelihood: f64,
    /// Candidates scored between deadline checks.
    pub deadline_check_interval: usize,
    pub max_depth: usize,
    pub seed: u64,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            perfect_log_likelihood: PERFECT_LOG_LIKELIHOOD,
            deadline_check_interval: 16,
            max_depth: DEFAULT_MAX_DEPTH,
            seed: 0,
        }
    }
}

/// One round of enumeration for one job.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub id: u64,
    pub grammar: Arc<Grammar>,
    pub request: TypeScheme,
    pub tasks: Vec<Arc<Task>>,
    /// Entries still wanted per task, aligned with `tasks`. Zero means the
    /// task is already saturated and is not scored.
    pub capacities: Vec<usize>,
    pub window: CostWindow,
    /// Wall-clock budget of this round.
    pub timeout: Duration,
    /// Search time the job had already used before this round.
    pub elapsed: Duration,
    pub cpus: usize,
    pub evaluation_timeout: Option<Duration>,
    /// Rule-count table compiled once per job for rule-count backends.
    pub rule_table: Option<Arc<Pcfg>>,
    pub options: WorkerOptions,
}

/// Per-task results of one round, aligned with the request's tasks.
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub frontiers: Vec<Frontier>,
    /// Time to the best entry of each frontier, including earlier rounds.
    pub search_times: Vec<Option<Duration>>,
    pub programs_enumerated: u64,
}

/// A worker that died instead of producing output.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerFailure {
    pub message: String,
}

/// Completion notice sent back to the scheduler.
#[derive(Debug)]
pub struct WorkerMessage {
    pub id: u64,
    pub result: Result<JobOutput, WorkerFailure>,
}
