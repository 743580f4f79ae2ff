//! Bottom-up program synthesis over a rule-count grammar.
//!
//! Programs are built cost level by cost level: level `c` holds every body of
//! a nonterminal with total rule cost `c`, assembled from the banks of lower
//! levels. With observational equivalence enabled, a body whose outputs on
//! the sample inputs match an earlier body of the same type is dropped.

use crate::pcfg::{Pcfg, Rule};
use crate::program::Program;
use crate::semantics::Semantics;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

const DEADLINE_STRIDE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BottomUpOptions {
    pub observational_equivalence: bool,
    /// When set, only bodies that evaluate successfully on every sample input
    /// are used to prune; failing bodies are always kept.
    pub sound: bool,
}

impl Default for BottomUpOptions {
    fn default() -> Self {
        Self {
            observational_equivalence: true,
            sound: true,
        }
    }
}

/// Iterator over `(cost, program)` pairs in integer rule units.
pub struct BottomUp<'a> {
    pcfg: &'a Pcfg,
    semantics: Option<&'a dyn Semantics>,
    inputs: &'a [Vec<Value>],
    options: BottomUpOptions,
    lower: u32,
    upper: u32,
    roots: Option<HashSet<usize>>,
    bank: HashMap<String, Vec<Vec<Program>>>,
    seen: HashMap<String, HashSet<String>>,
    level: u32,
    ready: VecDeque<(u32, Program)>,
    deadline: Option<Instant>,
    built: usize,
    timed_out: bool,
}

impl<'a> BottomUp<'a> {
    /// Search the window `[lower, upper)` of rule units. Fractional bounds
    /// round up.
    pub fn new(pcfg: &'a Pcfg, lower: f64, upper: f64) -> Self {
        Self {
            pcfg,
            semantics: None,
            inputs: &[],
            options: BottomUpOptions {
                observational_equivalence: false,
                sound: true,
            },
            lower: units(lower),
            upper: units(upper),
            roots: None,
            bank: HashMap::new(),
            seen: HashMap::new(),
            level: 0,
            ready: VecDeque::new(),
            deadline: None,
            built: 0,
            timed_out: false,
        }
    }

    /// Prune observationally equivalent bodies using `semantics` on `inputs`.
    pub fn with_observations(
        mut self,
        semantics: &'a dyn Semantics,
        inputs: &'a [Vec<Value>],
        options: BottomUpOptions,
    ) -> Self {
        self.semantics = Some(semantics);
        self.inputs = inputs;
        self.options = options;
        self
    }

    /// Only yield programs whose outermost rule is one of these start rules.
    pub fn with_roots(mut self, roots: &[usize]) -> Self {
        self.roots = Some(roots.iter().copied().collect());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    fn check_deadline(&mut self) -> bool {
        self.built += 1;
        if self.built % DEADLINE_STRIDE != 0 {
            return false;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.timed_out = true;
            }
        }
        self.timed_out
    }

    fn level_of(&self, nonterminal: &str, cost: u32) -> &[Program] {
        self.bank
            .get(nonterminal)
            .and_then(|levels| levels.get(cost as usize))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every argument tuple whose costs sum to `budget`, each argument
    /// costing at least one unit.
    fn arguments(&self, nonterminals: &[String], budget: u32) -> Vec<Vec<Program>> {
        let Some((first, rest)) = nonterminals.split_first() else {
            return if budget == 0 { vec![Vec::new()] } else { Vec::new() };
        };
        let reserved = rest.len() as u32;
        let mut tuples = Vec::new();
        for cost in 1..=budget.saturating_sub(reserved) {
            let heads = self.level_of(first, cost);
            if heads.is_empty() {
                continue;
            }
            let tails = self.arguments(rest, budget - cost);
            for head in heads {
                for tail in &tails {
                    let mut tuple = Vec::with_capacity(nonterminals.len());
                    tuple.push(head.clone());
                    tuple.extend(tail.iter().cloned());
                    tuples.push(tuple);
                }
            }
        }
        tuples
    }

    fn signature(&self, body: &Program) -> Option<(String, bool)> {
        let semantics = self.semantics?;
        if !self.options.observational_equivalence || self.inputs.is_empty() {
            return None;
        }
        let outputs: Vec<Option<Value>> = self
            .inputs
            .iter()
            .map(|input| {
                let env: Vec<Value> = input.iter().rev().cloned().collect();
                semantics.evaluate(body, &env)
            })
            .collect();
        let complete = outputs.iter().all(Option::is_some);
        serde_json::to_string(&outputs).ok().map(|s| (s, complete))
    }

    /// Whether a new body duplicates the behavior of one already banked.
    fn redundant(&mut self, nonterminal: &str, body: &Program) -> bool {
        let Some((signature, complete)) = self.signature(body) else {
            return false;
        };
        if self.options.sound && !complete {
            return false;
        }
        !self
            .seen
            .entry(nonterminal.to_string())
            .or_default()
            .insert(signature)
    }

    fn build_level(&mut self) {
        let level = self.level;
        let pcfg = self.pcfg;
        for (nonterminal, rules) in &pcfg.rules {
            let mut fresh = Vec::new();
            for (index, rule) in rules.iter().enumerate() {
                if self.timed_out || rule.cost > level {
                    continue;
                }
                for body in self.expand(rule, level - rule.cost) {
                    if self.check_deadline() {
                        break;
                    }
                    if self.redundant(nonterminal, &body) {
                        continue;
                    }
                    if nonterminal == &pcfg.start && level >= self.lower && self.is_root(index) {
                        self.ready.push_back((level, pcfg.close(body.clone())));
                    }
                    fresh.push(body);
                }
            }
            let levels = self.bank.entry(nonterminal.clone()).or_default();
            if levels.len() <= level as usize {
                levels.resize(level as usize + 1, Vec::new());
            }
            levels[level as usize] = fresh;
        }
    }

    fn expand(&self, rule: &Rule, budget: u32) -> Vec<Program> {
        if rule.arguments.is_empty() {
            return if budget == 0 {
                vec![rule.program.clone()]
            } else {
                Vec::new()
            };
        }
        self.arguments(&rule.arguments, budget)
            .into_iter()
            .map(|args| {
                args.into_iter()
                    .fold(rule.program.clone(), |program, arg| program.apply(arg))
            })
            .collect()
    }

    fn is_root(&self, index: usize) -> bool {
        self.roots.as_ref().map_or(true, |roots| roots.contains(&index))
    }
}

impl Iterator for BottomUp<'_> {
    type Item = (f64, Program);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((cost, program)) = self.ready.pop_front() {
                return Some((cost as f64, program));
            }
            if self.timed_out || self.level + 1 >= self.upper {
                return None;
            }
            self.level += 1;
            self.build_level();
        }
    }
}

fn units(bound: f64) -> u32 {
    if bound <= 0.0 {
        0
    } else {
        bound.ceil().min(u32::MAX as f64) as u32
    }
}
