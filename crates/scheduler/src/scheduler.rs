//! The round-based controller that drives every job of a search.
//!
//! Each pass of the loop drops tasks that are solved or out of budget, hands
//! the free CPUs to the jobs that have made the least progress, and dispatches
//! one widened cost window per chosen job. Workers report back over a single
//! channel, and results are merged in arrival order. The loop ends once a
//! dispatch pass leaves nothing running.

use crate::allocation::allocate_cpus;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::jobs::{partition, GrammarSource, Job};
use crossbeam_channel::Sender;
use progsearch_frontier::{BestChange, Frontier, ResultAggregator};
use progsearch_lang::CostWindow;
use progsearch_worker::{run_caught, JobRequest, SearchWorker, Task, WorkerMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Final state of a search, aligned with the input tasks.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub frontiers: Vec<Frontier>,
    /// Job search time at which each task's best solution was found.
    pub best_search_times: Vec<Option<Duration>>,
    pub programs_enumerated: Vec<u64>,
}

impl SearchOutcome {
    pub fn solved(&self) -> usize {
        self.frontiers.iter().filter(|f| !f.is_empty()).count()
    }
}

/// A dispatched round that has not reported back yet.
struct InFlight {
    job: usize,
    /// The job's tasks at dispatch time, aligned with the worker's output.
    tasks: Vec<usize>,
    cpus: usize,
    upper: f64,
}

pub struct JobScheduler {
    config: SearchConfig,
    worker: Arc<dyn SearchWorker>,
}

impl JobScheduler {
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        config.validate().map_err(SearchError::InvalidConfig)?;
        let worker: Arc<dyn SearchWorker> = Arc::from(config.backend.worker());
        Ok(Self { config, worker })
    }

    /// Replace the backend's worker, keeping the backend's window units.
    pub fn with_worker(mut self, worker: Arc<dyn SearchWorker>) -> Self {
        self.worker = worker;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Search for solutions to every task.
    ///
    /// Fails fast: the first worker failure aborts the search and no partial
    /// result is returned. Rounds still running on other threads are detached;
    /// they finish in the background and their results are dropped with the
    /// channel.
    pub fn search(
        &self,
        grammars: &GrammarSource,
        tasks: &[Arc<Task>],
    ) -> Result<SearchOutcome, SearchError> {
        let mut jobs = partition(grammars, tasks, self.config.isolation)?;
        for job in &mut jobs {
            job.rule_table = self
                .config
                .backend
                .prepare(job.grammar(), job.request())
                .map_err(|source| SearchError::Prepare {
                    job: job.id,
                    source,
                })?;
        }
        let inline = jobs.len() == 1;
        if inline {
            info!("only one job; running the worker on the calling thread");
        }
        info!(
            jobs = jobs.len(),
            tasks = tasks.len(),
            cpus = self.config.cpus,
            worker = self.worker.name(),
            "starting search"
        );

        let mut aggregator = ResultAggregator::new(tasks.len(), self.config.maximum_frontier);
        let (sender, receiver) = crossbeam_channel::unbounded();
        let mut in_flight: HashMap<u64, InFlight> = HashMap::new();
        let mut active_cpus = 0;
        let mut next_id = 0u64;

        loop {
            self.refresh(&mut jobs, &aggregator);

            let mut free: Vec<usize> = (0..jobs.len())
                .filter(|&j| self.is_free(&jobs[j]))
                .collect();
            if !free.is_empty() && active_cpus < self.config.cpus {
                free.sort_by(|&a, &b| jobs[a].lower_bound.total_cmp(&jobs[b].lower_bound));
                let allocation = allocate_cpus(
                    self.config.cpus - active_cpus,
                    free.len(),
                    self.config.isolation,
                );
                for (&j, &cpus) in free.iter().zip(&allocation) {
                    if cpus == 0 {
                        continue;
                    }
                    let request = self.job_request(next_id, &jobs[j], tasks, &aggregator, cpus);
                    let job = &mut jobs[j];
                    info!(
                        job = job.id,
                        request = %job.request(),
                        tasks = job.tasks.len(),
                        cpus,
                        lower_bound = request.window.lower,
                        upper_bound = request.window.upper,
                        timeout_s = request.timeout.as_secs_f64(),
                        "launching job"
                    );
                    job.stopwatch.start();
                    in_flight.insert(
                        next_id,
                        InFlight {
                            job: j,
                            tasks: job.tasks.clone(),
                            cpus,
                            upper: request.window.upper,
                        },
                    );
                    active_cpus += cpus;
                    next_id += 1;
                    if inline {
                        let message = run_caught(self.worker.as_ref(), &request);
                        if sender.send(message).is_err() {
                            return Err(SearchError::ChannelClosed {
                                running: in_flight.len(),
                            });
                        }
                    } else {
                        self.spawn(request, sender.clone())?;
                    }
                }
            }

            if jobs.iter().all(|job| !job.stopwatch.is_running()) {
                break;
            }

            let message = receiver.recv().map_err(|_| SearchError::ChannelClosed {
                running: in_flight.len(),
            })?;
            let Some(flight) = in_flight.remove(&message.id) else {
                warn!(id = message.id, "result for unknown dispatch");
                continue;
            };
            let job = &mut jobs[flight.job];
            let output = match message.result {
                Ok(output) => output,
                Err(failure) => {
                    error!(job = job.id, reason = %failure.message, "worker failed; aborting search");
                    return Err(SearchError::WorkerFailure {
                        job: job.id,
                        message: failure.message,
                    });
                }
            };
            active_cpus -= flight.cpus;
            job.stopwatch.stop();
            job.lower_bound = flight.upper;

            for (position, &task) in flight.tasks.iter().enumerate() {
                let Some(frontier) = output.frontiers.get(position) else {
                    warn!(job = job.id, task, "worker returned no frontier for task");
                    continue;
                };
                let search_time = output.search_times.get(position).copied().flatten();
                let change =
                    aggregator.merge(task, frontier, search_time, output.programs_enumerated);
                if matches!(change, BestChange::First | BestChange::Improved) {
                    debug!(
                        task = %tasks[task].name,
                        best_time_s = aggregator.best_time(task).map(|t| t.as_secs_f64()),
                        "new best solution"
                    );
                }
            }
            debug!(
                job = job.id,
                programs = output.programs_enumerated,
                elapsed_s = job.stopwatch.elapsed().as_secs_f64(),
                lower_bound = job.lower_bound,
                "merged round"
            );
        }

        let (frontiers, best_search_times, programs_enumerated) = aggregator.into_parts();
        let outcome = SearchOutcome {
            frontiers,
            best_search_times,
            programs_enumerated,
        };
        info!(
            solved = outcome.solved(),
            tasks = tasks.len(),
            "search finished"
        );
        Ok(outcome)
    }

    /// Drop solved or timed-out tasks and retire jobs left with none.
    fn refresh(&self, jobs: &mut [Job], aggregator: &ResultAggregator) {
        let timeout = self.config.enumeration_timeout();
        for job in jobs.iter_mut().filter(|job| !job.retired) {
            let elapsed = job.stopwatch.elapsed();
            job.tasks.retain(|&task| {
                let hits = aggregator
                    .frontier(task)
                    .map_or(0, |f| f.hits(self.config.perfect_log_likelihood));
                hits < self.config.maximum_frontier && elapsed <= timeout
            });
            if job.tasks.is_empty() {
                job.retired = true;
                info!(
                    job = job.id,
                    elapsed_s = elapsed.as_secs_f64(),
                    lower_bound = job.lower_bound,
                    "retiring job"
                );
            }
        }
    }

    fn is_free(&self, job: &Job) -> bool {
        !job.retired
            && !job.stopwatch.is_running()
            && job.stopwatch.elapsed() + self.config.launch_slack()
                < self.config.enumeration_timeout()
    }

    fn job_request(
        &self,
        id: u64,
        job: &Job,
        tasks: &[Arc<Task>],
        aggregator: &ResultAggregator,
        cpus: usize,
    ) -> JobRequest {
        let elapsed = job.stopwatch.elapsed();
        let capacities = job
            .tasks
            .iter()
            .map(|&task| {
                let hits = aggregator
                    .frontier(task)
                    .map_or(0, |f| f.hits(self.config.perfect_log_likelihood));
                self.config.maximum_frontier.saturating_sub(hits)
            })
            .collect();
        JobRequest {
            id,
            grammar: job.grammar().clone(),
            request: job.request().clone(),
            tasks: job.tasks.iter().map(|&task| tasks[task].clone()).collect(),
            capacities,
            window: CostWindow::new(
                job.lower_bound,
                job.lower_bound + self.config.budget_increment(),
            ),
            timeout: self.config.enumeration_timeout().saturating_sub(elapsed),
            elapsed,
            cpus,
            evaluation_timeout: self.config.evaluation_timeout(),
            rule_table: job.rule_table.clone(),
            options: self.config.worker_options(),
        }
    }

    fn spawn(&self, request: JobRequest, sender: Sender<WorkerMessage>) -> Result<(), SearchError> {
        let worker = Arc::clone(&self.worker);
        thread::Builder::new()
            .name(format!("progsearch-job-{}", request.id))
            .spawn(move || {
                let message = run_caught(worker.as_ref(), &request);
                if sender.send(message).is_err() {
                    debug!(id = request.id, "search ended before worker reported");
                }
            })
            .map_err(SearchError::Spawn)?;
        Ok(())
    }
}
