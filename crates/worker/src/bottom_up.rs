//! Bottom-up synthesis split across a dedicated thread pool.

use crate::backend::SearchWorker;
use crate::error::WorkerError;
use crate::message::{JobOutput, JobRequest};
use crate::pools::TaskPools;
use progsearch_frontier::Frontier;
use progsearch_lang::{BottomUp, BottomUpOptions, Pcfg};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Distinct example inputs used to compare program behavior.
pub const MAX_OBSERVATION_INPUTS: usize = 10;

pub struct BottomUpWorker {
    options: BottomUpOptions,
}

impl BottomUpWorker {
    pub fn new(options: BottomUpOptions) -> Self {
        Self { options }
    }

    fn run_split(
        &self,
        job: &JobRequest,
        pcfg: &Pcfg,
        inputs: &[Vec<Value>],
        roots: &[usize],
        started: Instant,
    ) -> Result<JobOutput, WorkerError> {
        let deadline = started + job.timeout;
        let mut pools = TaskPools::new(job, started);
        let interval = job.options.deadline_check_interval.max(1) as u64;

        let mut search = BottomUp::new(pcfg, job.window.lower, job.window.upper)
            .with_roots(roots)
            .with_deadline(deadline);
        if let Some(semantics) = job.grammar.semantics() {
            search = search.with_observations(semantics, inputs, self.options);
        }

        let mut programs = 0u64;
        for (_, program) in search {
            programs += 1;
            let prior = job
                .grammar
                .log_likelihood(&job.request, &program)
                .map_err(|source| {
                    error!(job = job.id, %program, %source, "typing error in bottom-up program");
                    WorkerError::TypeMismatch {
                        program: program.to_string(),
                        request: job.request.to_string(),
                        source,
                    }
                })?;
            for (n, task) in job.tasks.iter().enumerate() {
                if !pools.wants(n) {
                    continue;
                }
                let evaluation = task.score(&program, job.evaluation_timeout);
                if evaluation.success {
                    pools.record(n, &program, prior, evaluation.log_likelihood);
                }
            }
            if pools.saturated() {
                break;
            }
            if programs % interval == 0 && Instant::now() >= deadline {
                break;
            }
        }
        Ok(pools.finish(programs))
    }
}

impl SearchWorker for BottomUpWorker {
    fn name(&self) -> &str {
        "bottom-up"
    }

    fn run(&self, job: &JobRequest) -> Result<JobOutput, WorkerError> {
        let started = Instant::now();
        let pcfg = match &job.rule_table {
            Some(pcfg) => pcfg.clone(),
            None => Arc::new(Pcfg::from_grammar(&job.grammar, &job.request)?),
        };
        if self.options.observational_equivalence && job.grammar.semantics().is_none() {
            warn!(job = job.id, "grammar has no semantics; observational pruning disabled");
        }
        let inputs = observation_inputs(job, job.options.seed);
        let splits = pcfg.split(job.cpus);
        debug!(
            job = job.id,
            splits = splits.len(),
            lower = job.window.lower,
            upper = job.window.upper,
            "bottom-up round"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(splits.len().max(1))
            .build()
            .map_err(|e| WorkerError::ThreadPool(e.to_string()))?;
        let outputs: Vec<Result<JobOutput, WorkerError>> = pool.install(|| {
            splits
                .par_iter()
                .map(|roots| self.run_split(job, &pcfg, &inputs, roots, started))
                .collect()
        });

        let mut frontiers = vec![Frontier::empty(); job.tasks.len()];
        let mut programs_enumerated = 0;
        for output in outputs {
            let output = output?;
            programs_enumerated += output.programs_enumerated;
            for (n, incoming) in output.frontiers.iter().enumerate() {
                let capacity = job.capacities.get(n).copied().unwrap_or(0);
                frontiers[n] = frontiers[n].combine(incoming, capacity);
            }
        }
        let search_times = frontiers
            .iter()
            .map(|f| f.best().map(|best| best.discovery_time))
            .collect();
        Ok(JobOutput {
            frontiers,
            search_times,
            programs_enumerated,
        })
    }
}

/// Distinct inputs across the job's tasks, shuffled deterministically and
/// capped at [`MAX_OBSERVATION_INPUTS`].
pub fn observation_inputs(job: &JobRequest, seed: u64) -> Vec<Vec<Value>> {
    let mut seen = HashSet::new();
    let mut inputs: Vec<Vec<Value>> = job
        .tasks
        .iter()
        .flat_map(|task| task.examples.iter())
        .filter(|example| seen.insert(Value::Array(example.inputs.clone()).to_string()))
        .map(|example| example.inputs.clone())
        .collect();
    let mut rng = StdRng::seed_from_u64(seed);
    inputs.shuffle(&mut rng);
    inputs.truncate(MAX_OBSERVATION_INPUTS);
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::WorkerOptions;
    use crate::task::{AllOrNothing, Example, Task};
    use polytype::{ptp, tp};
    use progsearch_lang::{CostWindow, Grammar, PrimitiveSemantics, Semantics};
    use serde_json::json;
    use std::time::Duration;

    fn eval(name: &str, args: &[Value]) -> Option<Value> {
        match (name, args) {
            ("zero", []) => Some(json!(0)),
            ("succ", [x]) => Some(json!(x.as_i64()? + 1)),
            ("double", [x]) => Some(json!(x.as_i64()? * 2)),
            _ => None,
        }
    }

    fn setup(cpus: usize) -> JobRequest {
        let base = Grammar::uniform(vec![
            ("zero", ptp!(int)),
            ("succ", ptp!(@arrow[tp!(int), tp!(int)])),
            ("double", ptp!(@arrow[tp!(int), tp!(int)])),
        ]);
        let semantics: Arc<dyn Semantics> = Arc::new(PrimitiveSemantics::new(&base, eval));
        let grammar = Arc::new(base.with_semantics(semantics.clone()));
        let request = ptp!(@arrow[tp!(int), tp!(int)]);
        let example = |i: i64, o: i64| Example {
            inputs: vec![json!(i)],
            output: json!(o),
        };
        let task = Arc::new(Task::new(
            "double-plus-one",
            request.clone(),
            vec![example(1, 3), example(4, 9), example(0, 1)],
            Arc::new(AllOrNothing::new(semantics)),
        ));
        JobRequest {
            id: 3,
            rule_table: Some(Arc::new(Pcfg::from_grammar(&grammar, &request).unwrap())),
            grammar,
            request,
            tasks: vec![task],
            capacities: vec![2],
            window: CostWindow::new(0.0, 100.0),
            timeout: Duration::from_secs(10),
            elapsed: Duration::ZERO,
            cpus,
            evaluation_timeout: None,
            options: WorkerOptions::default(),
        }
    }

    #[test]
    fn finds_solution_with_grammar_prior() {
        let job = setup(1);
        let output = BottomUpWorker::new(BottomUpOptions::default())
            .run(&job)
            .unwrap();
        let best = output.frontiers[0].best().expect("solution found");
        assert_eq!(best.program.to_string(), "(lambda (succ (double $0)))");
        let prior = job.grammar.log_likelihood(&job.request, &best.program).unwrap();
        assert_eq!(best.log_prior, prior);
        assert!(output.search_times[0].is_some());
    }

    #[test]
    fn splitting_across_cpus_finds_the_same_programs() {
        let worker = BottomUpWorker::new(BottomUpOptions::default());
        let serial = worker.run(&setup(1)).unwrap();
        let parallel = worker.run(&setup(3)).unwrap();
        let programs = |output: &JobOutput| -> Vec<String> {
            output.frontiers[0]
                .entries()
                .iter()
                .map(|e| e.program.to_string())
                .collect()
        };
        assert_eq!(programs(&serial), programs(&parallel));
        assert_eq!(serial.programs_enumerated, parallel.programs_enumerated);
    }

    #[test]
    fn observation_inputs_are_distinct_and_capped() {
        let mut job = setup(1);
        let task = job.tasks[0].clone();
        let many = (0..30)
            .map(|i| Example {
                inputs: vec![json!(i % 15)],
                output: json!(0),
            })
            .collect();
        job.tasks.push(Arc::new(Task::new(
            "noise",
            task.request.clone(),
            many,
            Arc::new(AllOrNothing::new(Arc::new(PrimitiveSemantics::new(
                &job.grammar,
                eval,
            )))),
        )));
        let inputs = observation_inputs(&job, 7);
        assert_eq!(inputs.len(), MAX_OBSERVATION_INPUTS);
        let distinct: HashSet<String> = inputs.iter().map(|i| json!(i).to_string()).collect();
        assert_eq!(distinct.len(), inputs.len());
        assert_eq!(inputs, observation_inputs(&job, 7));
    }
}
