//! Search configuration.

use crate::error::SearchError;
use progsearch_frontier::PERFECT_LOG_LIKELIHOOD;
use progsearch_lang::DEFAULT_MAX_DEPTH;
use progsearch_worker::{SolverBackend, WorkerOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Knobs of one call to [`crate::JobScheduler::search`].
///
/// Every field has a default, so a JSON file only needs the fields it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Worker CPUs shared by all jobs.
    pub cpus: usize,
    /// Compute budget per job, summed over its rounds.
    pub enumeration_timeout_s: f64,
    /// Solutions kept per task.
    pub maximum_frontier: usize,
    /// Budget for scoring a single program, if any.
    pub evaluation_timeout_s: Option<f64>,
    /// One job per task, with at most one CPU each.
    pub isolation: bool,
    pub backend: SolverBackend,
    /// Likelihood above which a solution counts as exact.
    pub perfect_log_likelihood: f64,
    /// A job is relaunched only while it has more than this much budget left.
    pub launch_slack_s: f64,
    /// Window growth per round, in nats.
    pub continuous_budget_increment: f64,
    /// Window growth per round, in rule units.
    pub rule_count_budget_increment: f64,
    /// Programs enumerated between wall-clock checks.
    pub deadline_check_interval: usize,
    pub max_depth: usize,
    /// Shuffle seed for bottom-up observation inputs.
    pub seed: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cpus: thread::available_parallelism().map_or(1, |n| n.get()),
            enumeration_timeout_s: 60.0,
            maximum_frontier: 10,
            evaluation_timeout_s: None,
            isolation: false,
            backend: SolverBackend::default(),
            perfect_log_likelihood: PERFECT_LOG_LIKELIHOOD,
            launch_slack_s: 0.5,
            continuous_budget_increment: 1.5,
            rule_count_budget_increment: 100.0,
            deadline_check_interval: 16,
            max_depth: DEFAULT_MAX_DEPTH,
            seed: 0,
        }
    }
}

impl SearchConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, SearchError> {
        let failed = |reason: String| SearchError::ConfigFile {
            path: path.to_path_buf(),
            reason,
        };
        let data = fs::read(path).map_err(|e| failed(e.to_string()))?;
        let config: SearchConfig = serde_json::from_slice(&data).map_err(|e| failed(e.to_string()))?;
        config.validate().map_err(failed)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cpus == 0 {
            return Err("cpus must be > 0".into());
        }
        if !(self.enumeration_timeout_s.is_finite() && self.enumeration_timeout_s > 0.0) {
            return Err("enumeration_timeout_s must be a positive number".into());
        }
        if let Some(limit) = self.evaluation_timeout_s {
            if !(limit.is_finite() && limit > 0.0) {
                return Err("evaluation_timeout_s must be a positive number".into());
            }
        }
        if !(self.launch_slack_s.is_finite() && self.launch_slack_s >= 0.0) {
            return Err("launch_slack_s must be >= 0".into());
        }
        if self.launch_slack_s >= self.enumeration_timeout_s {
            return Err("launch_slack_s must be smaller than enumeration_timeout_s".into());
        }
        for (name, step) in [
            ("continuous_budget_increment", self.continuous_budget_increment),
            ("rule_count_budget_increment", self.rule_count_budget_increment),
        ] {
            if !(step.is_finite() && step > 0.0) {
                return Err(format!("{name} must be a positive number"));
            }
        }
        if !self.perfect_log_likelihood.is_finite() {
            return Err("perfect_log_likelihood must be finite".into());
        }
        if self.deadline_check_interval == 0 {
            return Err("deadline_check_interval must be > 0".into());
        }
        if self.max_depth == 0 {
            return Err("max_depth must be > 0".into());
        }
        Ok(())
    }

    pub fn enumeration_timeout(&self) -> Duration {
        seconds(self.enumeration_timeout_s)
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_s.map(seconds)
    }

    pub fn launch_slack(&self) -> Duration {
        seconds(self.launch_slack_s)
    }

    /// Window growth per round for the configured backend.
    pub fn budget_increment(&self) -> f64 {
        self.backend.budget_increment(
            self.continuous_budget_increment,
            self.rule_count_budget_increment,
        )
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            perfect_log_likelihood: self.perfect_log_likelihood,
            deadline_check_interval: self.deadline_check_interval,
            max_depth: self.max_depth,
            seed: self.seed,
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}
