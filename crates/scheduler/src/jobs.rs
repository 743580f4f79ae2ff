//! Grouping tasks into jobs that share one enumeration.

use crate::error::SearchError;
use crate::stopwatch::Stopwatch;
use polytype::TypeScheme;
use progsearch_lang::{Grammar, Pcfg};
use progsearch_worker::Task;
use std::sync::Arc;

/// The grammar each task is searched with.
#[derive(Debug, Clone)]
pub enum GrammarSource {
    Shared(Arc<Grammar>),
    /// One grammar per task, aligned with the task list.
    PerTask(Vec<Arc<Grammar>>),
}

impl GrammarSource {
    pub fn grammar_for(&self, task: usize) -> Option<&Arc<Grammar>> {
        match self {
            GrammarSource::Shared(grammar) => Some(grammar),
            GrammarSource::PerTask(grammars) => grammars.get(task),
        }
    }

    pub fn check(&self, tasks: usize) -> Result<(), SearchError> {
        match self {
            GrammarSource::PerTask(grammars) if grammars.len() != tasks => {
                Err(SearchError::GrammarMismatch {
                    grammars: grammars.len(),
                    tasks,
                })
            }
            _ => Ok(()),
        }
    }
}

impl From<Grammar> for GrammarSource {
    fn from(grammar: Grammar) -> Self {
        GrammarSource::Shared(Arc::new(grammar))
    }
}

impl From<Arc<Grammar>> for GrammarSource {
    fn from(grammar: Arc<Grammar>) -> Self {
        GrammarSource::Shared(grammar)
    }
}

/// What makes two tasks share a job: the same grammar (by identity), the
/// same request, and under isolation the same task.
#[derive(Debug, Clone)]
pub struct JobKey {
    pub grammar: Arc<Grammar>,
    pub request: TypeScheme,
    pub isolated: Option<usize>,
}

impl PartialEq for JobKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.grammar, &other.grammar)
            && self.request == other.request
            && self.isolated == other.isolated
    }
}

/// Scheduler-side state of one job.
#[derive(Debug)]
pub struct Job {
    pub id: u64,
    pub key: JobKey,
    /// Indices into the search's task list of the tasks still searched for.
    pub tasks: Vec<usize>,
    pub stopwatch: Stopwatch,
    /// Start of the next window to dispatch.
    pub lower_bound: f64,
    /// Set once no task is left. A retired job may still have a worker in
    /// flight; its result is merged but it is never relaunched.
    pub retired: bool,
    pub rule_table: Option<Arc<Pcfg>>,
}

impl Job {
    fn new(id: u64, key: JobKey, task: usize) -> Self {
        Self {
            id,
            key,
            tasks: vec![task],
            stopwatch: Stopwatch::new(),
            lower_bound: 0.0,
            retired: false,
            rule_table: None,
        }
    }

    pub fn grammar(&self) -> &Arc<Grammar> {
        &self.key.grammar
    }

    pub fn request(&self) -> &TypeScheme {
        &self.key.request
    }
}

/// Partition tasks into jobs, in order of each job's first task.
pub fn partition(
    grammars: &GrammarSource,
    tasks: &[Arc<Task>],
    isolation: bool,
) -> Result<Vec<Job>, SearchError> {
    grammars.check(tasks.len())?;
    let mut jobs: Vec<Job> = Vec::new();
    for (index, task) in tasks.iter().enumerate() {
        let grammar = grammars
            .grammar_for(index)
            .ok_or(SearchError::GrammarMismatch {
                grammars: index,
                tasks: tasks.len(),
            })?;
        let key = JobKey {
            grammar: grammar.clone(),
            request: task.request.clone(),
            isolated: isolation.then_some(index),
        };
        match jobs.iter_mut().find(|job| job.key == key) {
            Some(job) => job.tasks.push(index),
            None => {
                let id = jobs.len() as u64;
                jobs.push(Job::new(id, key, index));
            }
        }
    }
    Ok(jobs)
}
