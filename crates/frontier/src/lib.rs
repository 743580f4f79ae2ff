//! Retention of the best solutions found per task.
//!
//! Workers keep a [`SolutionPool`] per task while they enumerate; the
//! scheduler folds each finished job into a [`ResultAggregator`], which keeps
//! every task's [`Frontier`] bounded and tracks the time to its best solution.

pub mod aggregate;
pub mod entry;
pub mod frontier;
pub mod pool;

pub use aggregate::{best_time_after_merge, BestChange, ResultAggregator};
pub use entry::{FrontierEntry, Rank, PERFECT_LOG_LIKELIHOOD};
pub use frontier::{offer, Frontier, SolutionPool};
pub use pool::BoundedPriorityPool;
