//! Scored solutions.

use progsearch_lang::Program;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::time::Duration;

/// Likelihoods above this count as solving a task outright.
pub const PERFECT_LOG_LIKELIHOOD: f64 = -0.01;

/// A program found for a task, with its scores and when it was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrontierEntry {
    pub program: Program,
    pub log_prior: f64,
    pub log_likelihood: f64,
    /// Search time of the owning job when the program was scored.
    #[serde(serialize_with = "seconds")]
    pub discovery_time: Duration,
}

impl FrontierEntry {
    pub fn new(
        program: Program,
        log_prior: f64,
        log_likelihood: f64,
        discovery_time: Duration,
    ) -> Self {
        Self {
            program,
            log_prior,
            log_likelihood,
            discovery_time,
        }
    }

    pub fn posterior(&self) -> f64 {
        self.log_prior + self.log_likelihood
    }

    pub fn is_hit(&self, threshold: f64) -> bool {
        self.log_likelihood > threshold
    }

    pub fn rank(&self) -> Rank {
        Rank {
            posterior: self.posterior(),
            discovery_time: self.discovery_time,
        }
    }
}

fn seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Retention order of entries: a higher posterior is better, and among equal
/// posteriors the earlier discovery is better. `Greater` means better.
#[derive(Debug, Clone, Copy)]
pub struct Rank {
    pub posterior: f64,
    pub discovery_time: Duration,
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.posterior
            .total_cmp(&other.posterior)
            .then_with(|| other.discovery_time.cmp(&self.discovery_time))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}
