//! Search backends and the panic-safe entry point used by the scheduler.

use crate::bottom_up::BottomUpWorker;
use crate::error::WorkerError;
use crate::external::ExternalWorker;
use crate::message::{JobOutput, JobRequest, WorkerFailure, WorkerMessage};
use crate::top_down::TopDownWorker;
use polytype::TypeScheme;
use progsearch_lang::{BottomUpOptions, Grammar, Pcfg};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::error::Error;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

/// Enumerates one job round and scores candidates against its tasks.
pub trait SearchWorker: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, job: &JobRequest) -> Result<JobOutput, WorkerError>;
}

/// Which enumeration strategy a search uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SolverBackend {
    /// Best-first enumeration in-process, windows measured in nats.
    #[default]
    TopDown,
    /// Bank-based synthesis over integer rule costs.
    BottomUp {
        #[serde(default = "enabled")]
        observational_equivalence: bool,
        #[serde(default = "enabled")]
        sound: bool,
    },
    /// A native solver binary speaking JSON over stdin/stdout.
    External { solver: PathBuf },
}

fn enabled() -> bool {
    true
}

impl SolverBackend {
    /// Whether windows are measured in integer rule units.
    pub fn uses_rule_counts(&self) -> bool {
        matches!(self, SolverBackend::BottomUp { .. })
    }

    pub fn budget_increment(&self, continuous: f64, rule_count: f64) -> f64 {
        if self.uses_rule_counts() {
            rule_count
        } else {
            continuous
        }
    }

    /// Compile whatever per-job state the backend needs before any round is
    /// dispatched.
    pub fn prepare(
        &self,
        grammar: &Grammar,
        request: &TypeScheme,
    ) -> Result<Option<Arc<Pcfg>>, WorkerError> {
        if !self.uses_rule_counts() {
            return Ok(None);
        }
        Ok(Some(Arc::new(Pcfg::from_grammar(grammar, request)?)))
    }

    pub fn worker(&self) -> Box<dyn SearchWorker> {
        match self {
            SolverBackend::TopDown => Box::new(TopDownWorker),
            SolverBackend::BottomUp {
                observational_equivalence,
                sound,
            } => Box::new(BottomUpWorker::new(BottomUpOptions {
                observational_equivalence: *observational_equivalence,
                sound: *sound,
            })),
            SolverBackend::External { solver } => Box::new(ExternalWorker::new(solver.clone())),
        }
    }

    pub fn run(&self, job: &JobRequest) -> Result<JobOutput, WorkerError> {
        self.worker().run(job)
    }
}

/// Run a job, turning both errors and panics into a failure message so the
/// scheduler always hears back.
pub fn run_caught(worker: &dyn SearchWorker, job: &JobRequest) -> WorkerMessage {
    let result = match panic::catch_unwind(AssertUnwindSafe(|| worker.run(job))) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => {
            let message = error_chain(&err);
            error!(job = job.id, worker = worker.name(), reason = %message, "worker failed");
            Err(WorkerFailure { message })
        }
        Err(payload) => {
            let message = format!("worker panicked: {}", panic_message(&*payload));
            error!(job = job.id, worker = worker.name(), reason = %message, "worker panicked");
            Err(WorkerFailure { message })
        }
    };
    WorkerMessage { id: job.id, result }
}

fn error_chain(err: &dyn Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Exploding;

    impl SearchWorker for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn run(&self, _job: &JobRequest) -> Result<JobOutput, WorkerError> {
            panic!("scorer blew up on task {}", 3)
        }
    }

    fn job() -> JobRequest {
        use crate::message::WorkerOptions;
        use polytype::ptp;
        use progsearch_lang::CostWindow;
        use std::time::Duration;

        JobRequest {
            id: 7,
            grammar: Arc::new(Grammar::uniform(vec![("zero", ptp!(int))])),
            request: ptp!(int),
            tasks: Vec::new(),
            capacities: Vec::new(),
            window: CostWindow::new(0.0, 1.5),
            timeout: Duration::from_secs(1),
            elapsed: Duration::ZERO,
            cpus: 1,
            evaluation_timeout: None,
            rule_table: None,
            options: WorkerOptions::default(),
        }
    }

    #[test]
    fn panics_become_failures() {
        let message = run_caught(&Exploding, &job());
        assert_eq!(message.id, 7);
        let failure = message.result.unwrap_err();
        assert!(failure.message.contains("scorer blew up on task 3"));
    }

    #[test]
    fn backend_kinds_deserialize_from_config() {
        let backend: SolverBackend =
            serde_json::from_str(r#"{"kind": "bottom-up", "sound": false}"#).unwrap();
        assert_eq!(
            backend,
            SolverBackend::BottomUp {
                observational_equivalence: true,
                sound: false
            }
        );
        assert!(backend.uses_rule_counts());
        assert_eq!(backend.budget_increment(1.5, 100.0), 100.0);
        let top_down: SolverBackend = serde_json::from_str(r#"{"kind": "top-down"}"#).unwrap();
        assert_eq!(top_down.budget_increment(1.5, 100.0), 1.5);
    }

    #[test]
    fn rule_tables_are_compiled_only_for_rule_count_backends() {
        let grammar = job().grammar;
        let request = polytype::ptp!(int);
        assert!(SolverBackend::TopDown.prepare(&grammar, &request).unwrap().is_none());
        let bottom_up = SolverBackend::BottomUp {
            observational_equivalence: false,
            sound: true,
        };
        assert!(bottom_up.prepare(&grammar, &request).unwrap().is_some());
    }
}
