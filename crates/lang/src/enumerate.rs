//! Best-first enumeration of programs inside a cost window.
//!
//! Cost is the negative log-prior of a program. A window `[lower, upper)`
//! yields every well-typed program whose cost falls inside it, cheapest first,
//! so enumerating `[a, b)` and then `[b, c)` produces exactly the programs of
//! `[a, c)`.

use crate::grammar::Grammar;
use crate::program::Program;
use crate::types::arguments;
use polytype::{Context, Type, TypeScheme};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

pub const DEFAULT_MAX_DEPTH: usize = 99;

const DEADLINE_STRIDE: u64 = 1024;

/// Half-open interval of program costs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostWindow {
    pub lower: f64,
    pub upper: f64,
}

impl CostWindow {
    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    /// The first window of a search with the given increment.
    pub fn initial(increment: f64) -> Self {
        Self::new(0.0, increment)
    }

    pub fn contains(&self, cost: f64) -> bool {
        self.lower <= cost && cost < self.upper
    }

    /// The window immediately above this one.
    pub fn next(&self, increment: f64) -> Self {
        Self::new(self.upper, self.upper + increment)
    }
}

#[derive(Debug, Clone)]
enum Token {
    Abstraction,
    Head(Program, usize),
}

#[derive(Debug, Clone)]
struct Hole {
    request: Type,
    env: Vec<Type>,
    depth: usize,
}

#[derive(Debug)]
struct Partial {
    cost: f64,
    seq: u64,
    ctx: Context,
    holes: Vec<Hole>,
    trail: Vec<Token>,
}

// BinaryHeap is a max-heap: cheaper and older states compare greater.
impl Ord for Partial {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Partial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Partial {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Partial {}

/// Iterator over `(cost, program)` pairs of one request type within a window.
pub struct Enumeration<'g> {
    grammar: &'g Grammar,
    window: CostWindow,
    heap: BinaryHeap<Partial>,
    seq: u64,
    max_depth: usize,
    deadline: Option<Instant>,
    expansions: u64,
    timed_out: bool,
}

impl<'g> Enumeration<'g> {
    pub fn new(grammar: &'g Grammar, request: &TypeScheme, window: CostWindow) -> Self {
        let mut ctx = Context::default();
        let request = request.instantiate(&mut ctx);
        let mut heap = BinaryHeap::new();
        heap.push(Partial {
            cost: 0.0,
            seq: 0,
            ctx,
            holes: vec![Hole {
                request,
                env: Vec::new(),
                depth: 0,
            }],
            trail: Vec::new(),
        });
        Self {
            grammar,
            window,
            heap,
            seq: 1,
            max_depth: DEFAULT_MAX_DEPTH,
            deadline: None,
            expansions: 0,
            timed_out: false,
        }
    }

    /// Applications nested deeper than this are not generated.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether enumeration stopped because the deadline passed.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    fn push(&mut self, mut state: Partial) {
        state.seq = self.seq;
        self.seq += 1;
        self.heap.push(state);
    }

    fn deadline_passed(&mut self) -> bool {
        self.expansions += 1;
        if self.expansions % DEADLINE_STRIDE != 0 {
            return false;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.timed_out = true;
                self.heap.clear();
                true
            }
            _ => false,
        }
    }

    fn expand(&mut self, mut state: Partial, hole: Hole) {
        let request = hole.request.apply(&state.ctx);
        if let Some((arg, ret)) = request.as_arrow() {
            let mut env = Vec::with_capacity(hole.env.len() + 1);
            env.push(arg.clone());
            env.extend(hole.env.iter().cloned());
            state.trail.push(Token::Abstraction);
            state.holes.push(Hole {
                request: ret.clone(),
                env,
                depth: hole.depth,
            });
            self.push(state);
            return;
        }
        for cand in self.grammar.candidates(&request, &state.ctx, &hole.env) {
            let cost = state.cost - cand.log_probability;
            if !(cost < self.window.upper) {
                continue;
            }
            let args = arguments(&cand.tp);
            if !args.is_empty() && hole.depth >= self.max_depth {
                continue;
            }
            let nargs = args.len();
            let mut holes = state.holes.clone();
            for arg in args.into_iter().rev() {
                holes.push(Hole {
                    request: arg,
                    env: hole.env.clone(),
                    depth: hole.depth + 1,
                });
            }
            let mut trail = state.trail.clone();
            trail.push(Token::Head(cand.program, nargs));
            self.push(Partial {
                cost,
                seq: 0,
                ctx: cand.ctx,
                holes,
                trail,
            });
        }
    }
}

impl Iterator for Enumeration<'_> {
    type Item = (f64, Program);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(mut state) = self.heap.pop() {
            if self.deadline_passed() {
                return None;
            }
            match state.holes.pop() {
                Some(hole) => self.expand(state, hole),
                None if state.cost >= self.window.lower => {
                    if let Some(program) = assemble(state.trail) {
                        return Some((state.cost, program));
                    }
                }
                None => {}
            }
        }
        None
    }
}

fn assemble(trail: Vec<Token>) -> Option<Program> {
    let mut tokens = trail.into_iter();
    let program = build(&mut tokens)?;
    match tokens.next() {
        None => Some(program),
        Some(_) => None,
    }
}

fn build(tokens: &mut impl Iterator<Item = Token>) -> Option<Program> {
    match tokens.next()? {
        Token::Abstraction => Some(Program::lambda(build(tokens)?)),
        Token::Head(head, nargs) => {
            let mut program = head;
            for _ in 0..nargs {
                program = program.apply(build(tokens)?);
            }
            Some(program)
        }
    }
}

impl Grammar {
    /// Enumerate programs of type `request` whose cost lies in `window`.
    pub fn enumerate(&self, request: &TypeScheme, window: CostWindow) -> Enumeration<'_> {
        Enumeration::new(self, request, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use polytype::{ptp, tp};

    fn peano() -> Grammar {
        Grammar::unnormalized(
            f64::NEG_INFINITY,
            vec![
                ("zero", ptp!(int), -1.0),
                ("succ", ptp!(@arrow[tp!(int), tp!(int)]), -1.0),
            ],
        )
        .unwrap()
    }

    fn arithmetic() -> Grammar {
        Grammar::uniform(vec![
            ("zero", ptp!(int)),
            ("one", ptp!(int)),
            ("+", ptp!(@arrow[tp!(int), tp!(int), tp!(int)])),
            (
                "map",
                ptp!(0, 1; @arrow[
                    tp!(@arrow[tp!(0), tp!(1)]),
                    tp!(list(tp!(0))),
                    tp!(list(tp!(1)))
                ]),
            ),
            ("range", ptp!(@arrow[tp!(int), tp!(list(tp!(int)))])),
        ])
    }

    #[test]
    fn peano_window_yields_cheapest_programs() {
        let grammar = peano();
        let found: Vec<_> = grammar
            .enumerate(&ptp!(int), CostWindow::new(0.0, 3.0))
            .map(|(cost, program)| (cost, program.to_string()))
            .collect();
        assert_eq!(
            found,
            vec![(1.0, "zero".to_string()), (2.0, "(succ zero)".to_string())]
        );
    }

    #[test]
    fn adjacent_windows_partition_the_search() {
        let grammar = arithmetic();
        let request = ptp!(@arrow[tp!(int), tp!(list(tp!(int)))]);
        let whole: Vec<Program> = grammar
            .enumerate(&request, CostWindow::new(0.0, 7.0))
            .map(|(_, p)| p)
            .collect();
        let mut split: Vec<Program> = grammar
            .enumerate(&request, CostWindow::new(0.0, 4.5))
            .map(|(_, p)| p)
            .collect();
        split.extend(
            grammar
                .enumerate(&request, CostWindow::new(4.5, 7.0))
                .map(|(_, p)| p),
        );
        assert!(!whole.is_empty());
        assert_eq!(whole.len(), split.len());
        let whole_set: std::collections::HashSet<_> = whole.iter().collect();
        assert_eq!(whole_set.len(), whole.len());
        assert!(split.iter().all(|p| whole_set.contains(p)));
    }

    #[test]
    fn costs_are_nondecreasing_and_match_likelihood() {
        let grammar = arithmetic();
        let request = ptp!(@arrow[tp!(int), tp!(int)]);
        let mut last = 0.0;
        let mut count = 0;
        for (cost, program) in grammar.enumerate(&request, CostWindow::new(0.0, 8.0)) {
            assert!(cost >= last);
            last = cost;
            let prior = grammar.log_likelihood(&request, &program).unwrap();
            assert_relative_eq!(prior, -cost);
            count += 1;
        }
        assert!(count > 10);
    }

    #[test]
    fn polymorphic_productions_are_instantiated() {
        let grammar = arithmetic();
        let request = ptp!(@arrow[tp!(int), tp!(list(tp!(int)))]);
        let mut programs = Vec::new();
        for (cost, program) in grammar.enumerate(&request, CostWindow::new(0.0, 10.0)) {
            let prior = grammar.log_likelihood(&request, &program).unwrap();
            assert_relative_eq!(prior, -cost, epsilon = 1e-9);
            programs.push(program.to_string());
        }
        assert!(programs.contains(&"(lambda (map (lambda one) (range $0)))".to_string()));
        assert!(programs.contains(&"(lambda (range $0))".to_string()));
        assert!(programs
            .iter()
            .any(|p| p.starts_with("(lambda (map (lambda")));
    }

    #[test]
    fn depth_limit_keeps_leaves_only() {
        let grammar = peano();
        let programs: Vec<String> = grammar
            .enumerate(&ptp!(int), CostWindow::new(0.0, 50.0))
            .with_max_depth(2)
            .map(|(_, p)| p.to_string())
            .collect();
        assert_eq!(programs, vec!["zero", "(succ zero)", "(succ (succ zero))"]);
    }

    #[test]
    fn past_deadline_stops_enumeration() {
        let grammar = arithmetic();
        let request = ptp!(@arrow[tp!(int), tp!(int)]);
        let mut enumeration = grammar
            .enumerate(&request, CostWindow::new(0.0, 40.0))
            .with_deadline(Instant::now());
        let produced = enumeration.by_ref().count();
        assert!(enumeration.timed_out());
        assert!(produced < 1024);
    }
}
