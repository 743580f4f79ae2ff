//! Parallel program enumeration over typed probabilistic grammars.
//!
//! The member crates, re-exported under one name:
//! [`lang`] (types, programs, grammars and enumeration), [`frontier`]
//! (bounded solution pools), [`worker`] (search backends) and [`scheduler`]
//! (the round-based controller).

pub use progsearch_frontier as frontier;
pub use progsearch_lang as lang;
pub use progsearch_scheduler as scheduler;
pub use progsearch_worker as worker;

pub use progsearch_frontier::{Frontier, FrontierEntry, PERFECT_LOG_LIKELIHOOD};
pub use progsearch_lang::{CostWindow, Grammar, Program};
pub use progsearch_scheduler::{GrammarSource, JobScheduler, SearchConfig, SearchError, SearchOutcome};
pub use progsearch_worker::{Evaluation, Evaluator, SolverBackend, Task};
