//! JSON summary of a finished search.

use crate::scheduler::SearchOutcome;
use progsearch_frontier::FrontierEntry;
use progsearch_worker::{SolverBackend, Task};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionReport {
    pub program: String,
    pub log_prior: f64,
    pub log_likelihood: f64,
    pub posterior: f64,
    pub discovery_time_s: f64,
}

impl From<&FrontierEntry> for SolutionReport {
    fn from(entry: &FrontierEntry) -> Self {
        Self {
            program: entry.program.to_string(),
            log_prior: entry.log_prior,
            log_likelihood: entry.log_likelihood,
            posterior: entry.posterior(),
            discovery_time_s: entry.discovery_time.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReport {
    pub name: String,
    pub request: String,
    pub best_search_time_s: Option<f64>,
    pub programs_enumerated: u64,
    /// Best first.
    pub solutions: Vec<SolutionReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub backend: SolverBackend,
    pub generated_at_unix_ms: u128,
    pub tasks: Vec<TaskReport>,
}

impl SearchReport {
    pub fn new(backend: &SolverBackend, tasks: &[Arc<Task>], outcome: &SearchOutcome) -> Self {
        let tasks = tasks
            .iter()
            .enumerate()
            .map(|(n, task)| TaskReport {
                name: task.name.clone(),
                request: task.request.to_string(),
                best_search_time_s: outcome
                    .best_search_times
                    .get(n)
                    .copied()
                    .flatten()
                    .map(|t| t.as_secs_f64()),
                programs_enumerated: outcome.programs_enumerated.get(n).copied().unwrap_or(0),
                solutions: outcome
                    .frontiers
                    .get(n)
                    .map(|f| f.entries().iter().map(SolutionReport::from).collect())
                    .unwrap_or_default(),
            })
            .collect();
        Self {
            backend: backend.clone(),
            generated_at_unix_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or_default(),
            tasks,
        }
    }

    pub fn solved(&self) -> usize {
        self.tasks.iter().filter(|t| !t.solutions.is_empty()).count()
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let blob = serde_json::to_vec_pretty(self)?;
        fs::write(path, blob)
    }
}
