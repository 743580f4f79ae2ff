//! Tasks and how candidate programs are scored against them.

use polytype::TypeScheme;
use progsearch_lang::{Program, Semantics};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One input/output observation. `inputs` are the program's arguments in
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub inputs: Vec<Value>,
    pub output: Value,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub success: bool,
    pub log_likelihood: f64,
}

impl Evaluation {
    pub fn hit(log_likelihood: f64) -> Self {
        Self {
            success: true,
            log_likelihood,
        }
    }

    pub fn miss() -> Self {
        Self {
            success: false,
            log_likelihood: f64::NEG_INFINITY,
        }
    }
}

/// Scores a program against a task. Failures are reported as a miss, never
/// as an error.
pub trait Evaluator: Send + Sync {
    fn score(&self, program: &Program, task: &Task, timeout: Option<Duration>) -> Evaluation;
}

/// Any scoring closure is an evaluator.
impl<F> Evaluator for F
where
    F: Fn(&Program, &Task) -> Evaluation + Send + Sync,
{
    fn score(&self, program: &Program, task: &Task, _timeout: Option<Duration>) -> Evaluation {
        self(program, task)
    }
}

/// Likelihood zero when every example is reproduced exactly, a miss
/// otherwise.
pub struct AllOrNothing {
    semantics: Arc<dyn Semantics>,
}

impl AllOrNothing {
    pub fn new(semantics: Arc<dyn Semantics>) -> Self {
        Self { semantics }
    }
}

impl Evaluator for AllOrNothing {
    fn score(&self, program: &Program, task: &Task, timeout: Option<Duration>) -> Evaluation {
        let started = Instant::now();
        for example in &task.examples {
            if timeout.is_some_and(|limit| started.elapsed() > limit) {
                return Evaluation::miss();
            }
            match self.semantics.run(program, &example.inputs) {
                Some(output) if output == example.output => {}
                _ => return Evaluation::miss(),
            }
        }
        Evaluation::hit(0.0)
    }
}

/// A search target: a request type, its examples, and how to score
/// candidates for it.
#[derive(Clone)]
pub struct Task {
    pub name: String,
    pub request: TypeScheme,
    pub examples: Vec<Example>,
    evaluator: Arc<dyn Evaluator>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("request", &self.request.to_string())
            .field("examples", &self.examples.len())
            .finish()
    }
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        request: TypeScheme,
        examples: Vec<Example>,
        evaluator: Arc<dyn Evaluator>,
    ) -> Self {
        Self {
            name: name.into(),
            request,
            examples,
            evaluator,
        }
    }

    pub fn score(&self, program: &Program, timeout: Option<Duration>) -> Evaluation {
        self.evaluator.score(program, self, timeout)
    }
}
