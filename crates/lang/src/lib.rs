//! Typed combinator language for program search.
//!
//! A [`Grammar`] assigns log-probabilities to typed productions. Programs are
//! generated either top-down, best-first within a cost window
//! ([`Grammar::enumerate`]), or bottom-up over a rule-count view of the
//! grammar ([`Pcfg`], [`BottomUp`]).

pub mod bottom_up;
pub mod enumerate;
pub mod grammar;
pub mod pcfg;
pub mod program;
pub mod semantics;
pub mod types;

pub use bottom_up::{BottomUp, BottomUpOptions};
pub use enumerate::{CostWindow, Enumeration, DEFAULT_MAX_DEPTH};
pub use grammar::{
    Candidate, Grammar, GrammarError, GrammarJson, InferenceError, Production, ProductionJson,
    TypeSpec,
};
pub use pcfg::{Pcfg, PcfgError, Rule, RULE_COST_SCALE};
pub use program::{ParseError, Program};
pub use semantics::{PrimitiveSemantics, Semantics};
pub use types::{parse_scheme, parse_type, TypeParseError};
