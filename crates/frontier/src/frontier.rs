//! Per-task frontiers: the best programs found so far.

use crate::entry::{FrontierEntry, Rank};
use crate::pool::BoundedPriorityPool;
use progsearch_lang::Program;
use serde::Serialize;
use std::collections::HashSet;

/// Pool used by workers to retain the best `K` entries of one task.
pub type SolutionPool = BoundedPriorityPool<Rank, FrontierEntry>;

/// Offer an entry to a pool, keyed by its rank.
pub fn offer(pool: &mut SolutionPool, entry: FrontierEntry) -> Option<FrontierEntry> {
    pool.push(entry.rank(), entry).map(|(_, evicted)| evicted)
}

/// Entries ordered best first, at most one per program.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Frontier {
    entries: Vec<FrontierEntry>,
}

impl Frontier {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Sort entries best first and drop repeated programs, keeping the best
    /// copy of each.
    pub fn from_entries(mut entries: Vec<FrontierEntry>) -> Self {
        entries.sort_by(|a, b| b.rank().cmp(&a.rank()));
        let mut seen: HashSet<Program> = HashSet::with_capacity(entries.len());
        entries.retain(|entry| seen.insert(entry.program.clone()));
        Self { entries }
    }

    pub fn from_pool(pool: SolutionPool) -> Self {
        Self::from_entries(
            pool.into_sorted_vec()
                .into_iter()
                .map(|(_, entry)| entry)
                .collect(),
        )
    }

    pub fn entries(&self) -> &[FrontierEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<FrontierEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn best(&self) -> Option<&FrontierEntry> {
        self.entries.first()
    }

    /// Number of entries whose likelihood exceeds `threshold`.
    pub fn hits(&self, threshold: f64) -> usize {
        self.entries.iter().filter(|e| e.is_hit(threshold)).count()
    }

    pub fn contains(&self, program: &Program) -> bool {
        self.entries.iter().any(|e| &e.program == program)
    }

    /// Union of two frontiers cut down to the best `capacity` entries.
    pub fn combine(&self, other: &Frontier, capacity: usize) -> Frontier {
        let mut entries = Vec::with_capacity(self.len() + other.len());
        entries.extend(self.entries.iter().cloned());
        entries.extend(other.entries.iter().cloned());
        let mut combined = Frontier::from_entries(entries);
        combined.entries.truncate(capacity);
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::PERFECT_LOG_LIKELIHOOD;
    use std::time::Duration;

    fn entry(name: &str, prior: f64, likelihood: f64, millis: u64) -> FrontierEntry {
        FrontierEntry::new(
            Program::primitive(name),
            prior,
            likelihood,
            Duration::from_millis(millis),
        )
    }

    #[test]
    fn pool_retains_top_k_by_posterior() {
        let mut pool = SolutionPool::new(2);
        offer(&mut pool, entry("a", -3.0, 0.0, 1));
        offer(&mut pool, entry("b", -1.0, 0.0, 2));
        let evicted = offer(&mut pool, entry("c", -2.0, 0.0, 3));
        assert_eq!(evicted.map(|e| e.program), Some(Program::primitive("a")));
        let frontier = Frontier::from_pool(pool);
        let names: Vec<String> = frontier
            .entries()
            .iter()
            .map(|e| e.program.to_string())
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn combine_is_bounded_and_deduplicated() {
        let left = Frontier::from_entries(vec![
            entry("a", -1.0, 0.0, 30),
            entry("b", -2.0, 0.0, 10),
        ]);
        let right = Frontier::from_entries(vec![
            entry("a", -1.0, 0.0, 5),
            entry("c", -1.5, -1.0, 1),
            entry("d", -4.0, 0.0, 1),
        ]);
        let combined = left.combine(&right, 3);
        assert_eq!(combined.len(), 3);
        let best = combined.best().unwrap();
        assert_eq!(best.program, Program::primitive("a"));
        assert_eq!(best.discovery_time, Duration::from_millis(5));
        assert!(combined.contains(&Program::primitive("b")));
        assert!(combined.contains(&Program::primitive("c")));
        assert_eq!(combined.hits(PERFECT_LOG_LIKELIHOOD), 2);
    }

    #[test]
    fn combine_with_empty_keeps_everything_up_to_capacity() {
        let frontier = Frontier::from_entries(vec![entry("a", -1.0, 0.0, 0)]);
        assert_eq!(frontier.combine(&Frontier::empty(), 5), frontier);
        assert!(frontier.combine(&Frontier::empty(), 0).is_empty());
    }
}
