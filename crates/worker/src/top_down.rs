//! In-process best-first enumeration.

use crate::backend::SearchWorker;
use crate::error::WorkerError;
use crate::message::{JobOutput, JobRequest};
use crate::pools::TaskPools;
use std::time::Instant;
use tracing::debug;

/// Enumerates the job's window with [`progsearch_lang::Grammar::enumerate`]
/// and scores every program against every task that still wants entries.
pub struct TopDownWorker;

impl SearchWorker for TopDownWorker {
    fn name(&self) -> &str {
        "top-down"
    }

    fn run(&self, job: &JobRequest) -> Result<JobOutput, WorkerError> {
        let started = Instant::now();
        let deadline = started + job.timeout;
        let mut pools = TaskPools::new(job, started);
        let interval = job.options.deadline_check_interval.max(1) as u64;

        let mut enumeration = job
            .grammar
            .enumerate(&job.request, job.window)
            .with_max_depth(job.options.max_depth)
            .with_deadline(deadline);
        let mut programs = 0u64;
        for (cost, program) in enumeration.by_ref() {
            programs += 1;
            for (n, task) in job.tasks.iter().enumerate() {
                if !pools.wants(n) {
                    continue;
                }
                let evaluation = task.score(&program, job.evaluation_timeout);
                if evaluation.success {
                    pools.record(n, &program, -cost, evaluation.log_likelihood);
                }
            }
            if pools.saturated() {
                debug!(job = job.id, programs, "every task saturated");
                break;
            }
            if programs % interval == 0 && Instant::now() >= deadline {
                debug!(job = job.id, programs, "round deadline reached");
                break;
            }
        }
        if enumeration.timed_out() {
            debug!(job = job.id, programs, "enumeration hit the round deadline");
        }
        Ok(pools.finish(programs))
    }
}
