//! Merging worker results into the per-task totals of a search.

use crate::frontier::Frontier;
use std::cmp::Ordering;
use std::time::Duration;
use tracing::debug;

/// How a merge changed a task's best solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BestChange {
    /// The task had no solution before.
    First,
    Improved,
    /// Same best score, reported at an earlier or equal time.
    Tied,
    Unchanged,
}

/// Time to the best solution after merging an incoming best.
///
/// A strictly better incoming solution takes its own time. A tie keeps the
/// earlier of the two times. A worse solution changes nothing.
pub fn best_time_after_merge(
    previous: Option<(f64, Duration)>,
    incoming: Option<(f64, Duration)>,
) -> (Option<Duration>, BestChange) {
    match (previous, incoming) {
        (None, None) => (None, BestChange::Unchanged),
        (Some((_, time)), None) => (Some(time), BestChange::Unchanged),
        (None, Some((_, time))) => (Some(time), BestChange::First),
        (Some((old_score, old_time)), Some((new_score, new_time))) => {
            match new_score.total_cmp(&old_score) {
                Ordering::Greater => (Some(new_time), BestChange::Improved),
                Ordering::Equal => (Some(old_time.min(new_time)), BestChange::Tied),
                Ordering::Less => (Some(old_time), BestChange::Unchanged),
            }
        }
    }
}

/// Running per-task results of a search.
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    capacity: usize,
    frontiers: Vec<Frontier>,
    best: Vec<Option<(f64, Duration)>>,
    programs: Vec<u64>,
}

impl ResultAggregator {
    pub fn new(tasks: usize, capacity: usize) -> Self {
        Self {
            capacity,
            frontiers: vec![Frontier::empty(); tasks],
            best: vec![None; tasks],
            programs: vec![0; tasks],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frontier(&self, task: usize) -> Option<&Frontier> {
        self.frontiers.get(task)
    }

    pub fn best_time(&self, task: usize) -> Option<Duration> {
        self.best.get(task).copied().flatten().map(|(_, time)| time)
    }

    pub fn programs_enumerated(&self, task: usize) -> u64 {
        self.programs.get(task).copied().unwrap_or(0)
    }

    /// Fold one job's result for `task` into the totals.
    ///
    /// `search_time` is the worker's reported time to its best entry; when
    /// absent, the best entry's own discovery time is used.
    pub fn merge(
        &mut self,
        task: usize,
        incoming: &Frontier,
        search_time: Option<Duration>,
        programs: u64,
    ) -> BestChange {
        let Some(frontier) = self.frontiers.get_mut(task) else {
            debug!(task, "ignoring result for unknown task");
            return BestChange::Unchanged;
        };
        let incoming_best = incoming.best().map(|best| {
            (
                best.posterior(),
                search_time.unwrap_or(best.discovery_time),
            )
        });
        let (time, change) = best_time_after_merge(self.best[task], incoming_best);
        *frontier = frontier.combine(incoming, self.capacity);
        self.best[task] = match (frontier.best(), time) {
            (Some(best), Some(time)) => Some((best.posterior(), time)),
            _ => None,
        };
        self.programs[task] += programs;
        change
    }

    pub fn into_parts(self) -> (Vec<Frontier>, Vec<Option<Duration>>, Vec<u64>) {
        let times = self.best.iter().map(|b| b.map(|(_, time)| time)).collect();
        (self.frontiers, times, self.programs)
    }
}
