//! Per-task solution pools of one running job.

use crate::message::{JobOutput, JobRequest};
use progsearch_frontier::{offer, Frontier, FrontierEntry, SolutionPool};
use progsearch_lang::Program;
use std::time::{Duration, Instant};

pub(crate) struct TaskPools {
    pools: Vec<SolutionPool>,
    started: Instant,
    /// Search time used by the job before this round.
    elapsed: Duration,
    perfect: f64,
}

impl TaskPools {
    pub(crate) fn new(job: &JobRequest, started: Instant) -> Self {
        Self {
            pools: job
                .capacities
                .iter()
                .map(|&capacity| SolutionPool::new(capacity))
                .collect(),
            started,
            elapsed: job.elapsed,
            perfect: job.options.perfect_log_likelihood,
        }
    }

    pub(crate) fn wants(&self, task: usize) -> bool {
        self.pools.get(task).is_some_and(|pool| pool.capacity() > 0)
    }

    /// Record a successful evaluation, stamped with the job's search time.
    pub(crate) fn record(&mut self, task: usize, program: &Program, prior: f64, likelihood: f64) {
        let discovery_time = self.elapsed + self.started.elapsed();
        if let Some(pool) = self.pools.get_mut(task) {
            let entry = FrontierEntry::new(program.clone(), prior, likelihood, discovery_time);
            if pool.admits(&entry.rank()) {
                offer(pool, entry);
            }
        }
    }

    /// Every task already holds as many perfect hits as it wants.
    pub(crate) fn saturated(&self) -> bool {
        self.pools.iter().all(|pool| {
            let hits = pool
                .iter()
                .filter(|(_, entry)| entry.is_hit(self.perfect))
                .count();
            hits >= pool.capacity()
        })
    }

    pub(crate) fn finish(self, programs_enumerated: u64) -> JobOutput {
        let frontiers: Vec<Frontier> = self.pools.into_iter().map(Frontier::from_pool).collect();
        let search_times = frontiers
            .iter()
            .map(|f| f.best().map(|best| best.discovery_time))
            .collect();
        JobOutput {
            frontiers,
            search_times,
            programs_enumerated,
        }
    }
}
