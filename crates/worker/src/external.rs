//! Delegation to a native solver process over JSON.
//!
//! The solver reads one request object on stdin and answers with one object
//! mapping each task name to its solutions, plus `number_enumerated`.

use crate::backend::SearchWorker;
use crate::error::WorkerError;
use crate::message::{JobOutput, JobRequest};
use crate::task::Example;
use progsearch_frontier::{Frontier, FrontierEntry};
use progsearch_lang::types::type_to_json;
use progsearch_lang::GrammarJson;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

const SHATTER: usize = 10;

#[derive(Debug, Serialize)]
struct SolverRequest<'a> {
    #[serde(rename = "DSL")]
    dsl: GrammarJson,
    tasks: Vec<SolverTask<'a>>,
    #[serde(rename = "programTimeout")]
    program_timeout: Option<f64>,
    nc: usize,
    timeout: f64,
    #[serde(rename = "lowerBound")]
    lower_bound: f64,
    #[serde(rename = "upperBound")]
    upper_bound: f64,
    #[serde(rename = "budgetIncrement")]
    budget_increment: f64,
    verbose: bool,
    shatter: usize,
}

#[derive(Debug, Serialize)]
struct SolverTask<'a> {
    examples: &'a [Example],
    name: &'a str,
    request: Value,
    #[serde(rename = "maximumFrontier")]
    maximum_frontier: usize,
}

#[derive(Debug, Deserialize)]
struct SolverSolution {
    program: String,
    #[serde(rename = "logLikelihood")]
    log_likelihood: f64,
    #[serde(default)]
    time: f64,
}

pub struct ExternalWorker {
    solver: PathBuf,
}

impl ExternalWorker {
    pub fn new(solver: PathBuf) -> Self {
        Self { solver }
    }

    fn message(&self, job: &JobRequest) -> Result<String, WorkerError> {
        let request = type_to_json(&job.request.instantiate(&mut Default::default()));
        let message = SolverRequest {
            dsl: job.grammar.to_json(),
            tasks: job
                .tasks
                .iter()
                .zip(&job.capacities)
                .map(|(task, &capacity)| SolverTask {
                    examples: &task.examples,
                    name: &task.name,
                    request: request.clone(),
                    maximum_frontier: capacity,
                })
                .collect(),
            program_timeout: job.evaluation_timeout.map(|t| t.as_secs_f64()),
            nc: job.cpus,
            timeout: job.timeout.as_secs_f64(),
            lower_bound: job.window.lower,
            upper_bound: job.window.upper,
            budget_increment: job.window.upper - job.window.lower,
            verbose: false,
            shatter: SHATTER,
        };
        serde_json::to_string(&message).map_err(|e| WorkerError::BackendProtocol {
            reason: format!("could not encode request: {e}"),
            request: String::new(),
            response: String::new(),
        })
    }

    fn exchange(&self, message: &str) -> Result<String, WorkerError> {
        let spawn_error = |source| WorkerError::Spawn {
            solver: self.solver.clone(),
            source,
        };
        let mut child = Command::new(&self.solver)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = message.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&bytes))
        });
        let output = child.wait_with_output().map_err(spawn_error)?;
        if let Some(writer) = writer {
            // A solver may legitimately exit before reading all of stdin.
            if let Ok(Err(err)) = writer.join() {
                debug!(solver = %self.solver.display(), %err, "solver closed stdin early");
            }
        }
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let reason = format!(
                "solver exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Err(self.protocol_error(reason, message, &stdout));
        }
        Ok(stdout)
    }

    /// A malformed exchange, logged with everything needed to replay it.
    fn protocol_error(&self, reason: String, request: &str, response: &str) -> WorkerError {
        error!(
            solver = %self.solver.display(),
            %reason,
            request,
            response,
            "malformed solver exchange"
        );
        WorkerError::BackendProtocol {
            reason,
            request: request.to_string(),
            response: response.to_string(),
        }
    }
}

impl SearchWorker for ExternalWorker {
    fn name(&self) -> &str {
        "external"
    }

    fn run(&self, job: &JobRequest) -> Result<JobOutput, WorkerError> {
        let message = self.message(job)?;
        let response = self.exchange(&message)?;
        let protocol = |reason: String| self.protocol_error(reason, &message, &response);
        let body: Map<String, Value> = serde_json::from_str(&response)
            .map_err(|e| protocol(format!("response is not a JSON object: {e}")))?;
        let programs_enumerated = body
            .get("number_enumerated")
            .and_then(Value::as_u64)
            .unwrap_or(0);

        let mut frontiers = Vec::with_capacity(job.tasks.len());
        for (task, &capacity) in job.tasks.iter().zip(&job.capacities) {
            let solutions = body
                .get(&task.name)
                .ok_or_else(|| protocol(format!("no entry for task `{}`", task.name)))?;
            let solutions: Vec<SolverSolution> = serde_json::from_value(solutions.clone())
                .map_err(|e| protocol(format!("bad solutions for `{}`: {e}", task.name)))?;
            let mut entries = Vec::with_capacity(solutions.len());
            for solution in solutions {
                let program = job
                    .grammar
                    .parse(&solution.program)
                    .map_err(|e| protocol(format!("bad program `{}`: {e}", solution.program)))?;
                let log_prior = job
                    .grammar
                    .log_likelihood(&job.request, &program)
                    .map_err(|source| {
                        error!(task = %task.name, %program, %source, "typing error in solver program");
                        WorkerError::TypeMismatch {
                            program: program.to_string(),
                            request: job.request.to_string(),
                            source,
                        }
                    })?;
                let found_at = Duration::try_from_secs_f64(solution.time.max(0.0))
                    .unwrap_or(Duration::ZERO);
                entries.push(FrontierEntry::new(
                    program,
                    log_prior,
                    solution.log_likelihood,
                    job.elapsed + found_at,
                ));
            }
            let mut frontier = Frontier::from_entries(entries);
            if frontier.len() > capacity {
                frontier = frontier.combine(&Frontier::empty(), capacity);
            }
            frontiers.push(frontier);
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
