//! Search workers: one job round in, per-task frontiers out.
//!
//! A [`JobRequest`] names a grammar, a request type, the tasks sharing them
//! and a cost window. A [`SearchWorker`] enumerates that window, scores each
//! program against every task that still wants entries, and answers with a
//! [`JobOutput`]. [`run_caught`] wraps a worker so that errors and panics come
//! back as a [`WorkerFailure`] rather than silence.

pub mod backend;
pub mod bottom_up;
pub mod error;
pub mod external;
pub mod message;
mod pools;
pub mod task;
pub mod top_down;

pub use backend::{run_caught, SearchWorker, SolverBackend};
pub use bottom_up::{BottomUpWorker, MAX_OBSERVATION_INPUTS};
pub use error::WorkerError;
pub use external::ExternalWorker;
pub use message::{JobOutput, JobRequest, WorkerFailure, WorkerMessage, WorkerOptions};
pub use task::{AllOrNothing, Evaluation, Evaluator, Example, Task};
pub use top_down::TopDownWorker;
