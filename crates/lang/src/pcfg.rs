//! Integer rule-count view of a grammar for one monomorphic request.
//!
//! Bottom-up search needs each nonterminal's rules up front. Types act as
//! nonterminals and every production cost is quantized to a positive integer,
//! so search budgets are counted in rule units instead of nats.

use crate::grammar::{logsumexp, Grammar};
use crate::program::Program;
use crate::types::{arguments, is_monomorphic, return_type, scheme_body};
use polytype::{Context, Type, TypeScheme};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use tracing::debug;

/// Rule units per nat of negative log-probability.
pub const RULE_COST_SCALE: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PcfgError {
    #[error("rule-count search needs a monomorphic request, got {0}")]
    Polymorphic(String),
    #[error("no production derives the return type of {0}")]
    Underivable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// A primitive, an invention, or a variable index.
    pub program: Program,
    /// Nonterminals of the arguments, in order.
    pub arguments: Vec<String>,
    pub cost: u32,
}

#[derive(Debug, Clone)]
pub struct Pcfg {
    pub request: Type,
    /// Nonterminal the program body must derive.
    pub start: String,
    /// Number of lambdas wrapping every program body.
    pub arity: usize,
    pub rules: BTreeMap<String, Vec<Rule>>,
}

/// Convert a log-probability to a rule cost of at least one unit.
pub fn rule_cost(log_probability: f64) -> Option<u32> {
    if !log_probability.is_finite() {
        return None;
    }
    let scaled = (-log_probability * RULE_COST_SCALE).ceil();
    Some(scaled.max(1.0).min(u32::MAX as f64) as u32)
}

impl Pcfg {
    /// Compile the productions reachable from `request`.
    ///
    /// Polymorphic and higher-order productions are left out of the rule set.
    pub fn from_grammar(grammar: &Grammar, request: &TypeScheme) -> Result<Self, PcfgError> {
        let mut ctx = Context::default();
        let request = request.instantiate(&mut ctx);
        if !is_monomorphic(&request) {
            return Err(PcfgError::Polymorphic(request.to_string()));
        }
        let parameters = arguments(&request);
        let variables: Vec<Type> = parameters.iter().rev().cloned().collect();
        let start = return_type(&request).clone();

        let mut usable = Vec::new();
        for production in &grammar.productions {
            let tp = scheme_body(&production.tp);
            let first_order = arguments(tp).iter().all(|a| a.as_arrow().is_none());
            if !is_monomorphic(tp) || !first_order {
                debug!(production = %production.program, tp = %tp, "skipping rule");
                continue;
            }
            usable.push((production, tp));
        }

        let mut rules = BTreeMap::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(nonterminal) = queue.pop_front() {
            let key = nonterminal.to_string();
            if rules.contains_key(&key) {
                continue;
            }
            let mut weighted: Vec<(f64, Program, Vec<Type>)> = usable
                .iter()
                .filter(|(_, tp)| return_type(tp) == &nonterminal)
                .map(|(p, tp)| (p.log_probability, p.program.clone(), arguments(tp)))
                .collect();
            let variables_start = weighted.len();
            for (i, tp) in variables.iter().enumerate() {
                if tp == &nonterminal {
                    weighted.push((grammar.log_variable, Program::Index(i), Vec::new()));
                }
            }
            let nvariables = weighted.len() - variables_start;
            if nvariables > 1 {
                let share = (nvariables as f64).ln();
                for entry in &mut weighted[variables_start..] {
                    entry.0 -= share;
                }
            }
            if grammar.is_normalized() && !weighted.is_empty() {
                let z = logsumexp(weighted.iter().map(|w| w.0));
                for entry in &mut weighted {
                    entry.0 -= z;
                }
            }
            let mut derived = Vec::with_capacity(weighted.len());
            for (log_probability, program, args) in weighted {
                let Some(cost) = rule_cost(log_probability) else {
                    continue;
                };
                for arg in &args {
                    queue.push_back(arg.clone());
                }
                derived.push(Rule {
                    program,
                    arguments: args.iter().map(|a| a.to_string()).collect(),
                    cost,
                });
            }
            rules.insert(key, derived);
        }

        let start = start.to_string();
        if rules.get(&start).map_or(true, Vec::is_empty) {
            return Err(PcfgError::Underivable(request.to_string()));
        }
        Ok(Self {
            request,
            start,
            arity: parameters.len(),
            rules,
        })
    }

    pub fn start_rules(&self) -> &[Rule] {
        self.rules
            .get(&self.start)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Partition the start rules into at most `parts` disjoint groups of
    /// indices, round-robin.
    pub fn split(&self, parts: usize) -> Vec<Vec<usize>> {
        let n = self.start_rules().len();
        let parts = parts.clamp(1, n.max(1));
        let mut groups = vec![Vec::new(); parts];
        for i in 0..n {
            groups[i % parts].push(i);
        }
        groups.retain(|g| !g.is_empty());
        groups
    }

    /// Wrap a body in the lambdas binding the request's parameters.
    pub fn close(&self, body: Program) -> Program {
        (0..self.arity).fold(body, |body, _| Program::lambda(body))
    }
}
