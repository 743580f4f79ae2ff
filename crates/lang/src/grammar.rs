//! Probabilistic grammars over typed productions.

use crate::program::{ParseError, Program};
use crate::semantics::Semantics;
use crate::types::{
    arguments, fork, parse_type, return_type, scheme_body, type_from_json, type_to_json,
    TypeParseError,
};
use polytype::{Context, Type, TypeScheme, UnificationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("unknown production `{0}`")]
    UnknownProduction(String),
    #[error("unbound variable ${0}")]
    UnboundIndex(usize),
    #[error("no production `{program}` can produce {request}")]
    NoCandidate { program: String, request: String },
    #[error("`{0}` is not in eta-long form")]
    NotEtaLong(String),
    #[error("could not unify: {0}")]
    Unify(String),
}

impl From<UnificationError> for InferenceError {
    fn from(err: UnificationError) -> Self {
        InferenceError::Unify(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("bad type for production `{expression}`: {source}")]
    Type {
        expression: String,
        #[source]
        source: TypeParseError,
    },
    #[error("bad production `{expression}`: {source}")]
    Program {
        expression: String,
        #[source]
        source: ParseError,
    },
    #[error("cannot infer a type for invention `{expression}`: {source}")]
    Inference {
        expression: String,
        #[source]
        source: InferenceError,
    },
    /// Raw weights are costs; a positive one would make programs cheaper as
    /// they grow.
    #[error("unnormalized weight of `{expression}` must be at most zero, got {log_probability}")]
    PositiveWeight {
        expression: String,
        log_probability: f64,
    },
}

#[derive(Debug, Clone)]
pub struct Production {
    pub program: Program,
    pub tp: TypeScheme,
    pub log_probability: f64,
}

/// A candidate for filling a hole of a given type.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub log_probability: f64,
    pub program: Program,
    /// Instantiated type of the candidate, with the context applied.
    pub tp: Type,
    pub ctx: Context,
}

/// Weighted productions plus the weight of referring to a bound variable.
///
/// A normalized grammar renormalizes candidate weights at each hole over the
/// productions whose return type unifies with the hole, so candidate
/// log-probabilities are proper. An unnormalized grammar uses the raw weights
/// as given, which makes hand-specified costs easy to reason about.
#[derive(Clone)]
pub struct Grammar {
    pub log_variable: f64,
    pub productions: Vec<Production>,
    normalized: bool,
    semantics: Option<Arc<dyn Semantics>>,
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("log_variable", &self.log_variable)
            .field("productions", &self.productions)
            .field("normalized", &self.normalized)
            .field("semantics", &self.semantics.is_some())
            .finish()
    }
}

impl Grammar {
    pub fn new(log_variable: f64, productions: Vec<Production>) -> Self {
        Self {
            log_variable,
            productions,
            normalized: true,
            semantics: None,
        }
    }

    /// Every primitive and the variable production get weight zero before
    /// normalization.
    pub fn uniform(primitives: Vec<(&str, TypeScheme)>) -> Self {
        let productions = primitives
            .into_iter()
            .map(|(name, tp)| Production {
                program: Program::primitive(name),
                tp,
                log_probability: 0.0,
            })
            .collect();
        Self::new(0.0, productions)
    }

    /// Productions weighted by raw log-probabilities, used as-is. Every
    /// weight, the variable weight included, must be at most zero.
    pub fn unnormalized(
        log_variable: f64,
        primitives: Vec<(&str, TypeScheme, f64)>,
    ) -> Result<Self, GrammarError> {
        let productions = primitives
            .into_iter()
            .map(|(name, tp, log_probability)| Production {
                program: Program::primitive(name),
                tp,
                log_probability,
            })
            .collect();
        let grammar = Self {
            log_variable,
            productions,
            normalized: false,
            semantics: None,
        };
        grammar.check_weights()?;
        Ok(grammar)
    }

    /// Unnormalized weights are summed into costs as they stand, so none may
    /// be positive.
    fn check_weights(&self) -> Result<(), GrammarError> {
        if self.normalized {
            return Ok(());
        }
        if !(self.log_variable <= 0.0) {
            return Err(GrammarError::PositiveWeight {
                expression: "$_".to_string(),
                log_probability: self.log_variable,
            });
        }
        match self.productions.iter().find(|p| !(p.log_probability <= 0.0)) {
            Some(p) => Err(GrammarError::PositiveWeight {
                expression: p.program.to_string(),
                log_probability: p.log_probability,
            }),
            None => Ok(()),
        }
    }

    pub fn with_semantics(mut self, semantics: Arc<dyn Semantics>) -> Self {
        self.semantics = Some(semantics);
        self
    }

    pub fn semantics(&self) -> Option<&dyn Semantics> {
        self.semantics.as_deref()
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Add a learned abstraction as a production of its own.
    pub fn invent(&mut self, body: Program, log_probability: f64) -> Result<(), GrammarError> {
        if !self.normalized && !(log_probability <= 0.0) {
            return Err(GrammarError::PositiveWeight {
                expression: format!("#{body}"),
                log_probability,
            });
        }
        let tp = self
            .infer(&body)
            .map_err(|source| GrammarError::Inference {
                expression: format!("#{body}"),
                source,
            })?;
        self.productions.push(Production {
            program: Program::invented(body),
            tp,
            log_probability,
        });
        Ok(())
    }

    pub fn production(&self, program: &Program) -> Option<&Production> {
        self.productions.iter().find(|p| &p.program == program)
    }

    /// Parse program text, accepting only primitives this grammar knows.
    pub fn parse(&self, text: &str) -> Result<Program, ParseError> {
        let names: HashSet<&str> = self
            .productions
            .iter()
            .filter_map(|p| match &p.program {
                Program::Primitive(name) => Some(&**name),
                _ => None,
            })
            .collect();
        Program::parse(text, |name| names.contains(name))
    }

    /// Candidates that can fill a hole of type `request` in environment `env`
    /// (innermost binding first).
    pub fn candidates(&self, request: &Type, ctx: &Context, env: &[Type]) -> Vec<Candidate> {
        let mut cands = Vec::with_capacity(self.productions.len() + env.len());
        for production in &self.productions {
            let mut ctx = fork(ctx);
            let mut tp = production.tp.instantiate(&mut ctx);
            if ctx.unify(return_type(&tp), request).is_ok() {
                tp.apply_mut(&ctx);
                cands.push(Candidate {
                    log_probability: production.log_probability,
                    program: production.program.clone(),
                    tp,
                    ctx,
                });
            }
        }
        let variables_start = cands.len();
        for (i, tp) in env.iter().enumerate() {
            let mut ctx = fork(ctx);
            let tp = tp.apply(&ctx);
            if ctx.unify(return_type(&tp), request).is_ok() {
                let tp = tp.apply(&ctx);
                cands.push(Candidate {
                    log_probability: self.log_variable,
                    program: Program::Index(i),
                    tp,
                    ctx,
                });
            }
        }
        let variables = cands.len() - variables_start;
        if variables > 0 {
            let share = (variables as f64).ln();
            for cand in &mut cands[variables_start..] {
                cand.log_probability -= share;
            }
        }
        if self.normalized && !cands.is_empty() {
            let z = logsumexp(cands.iter().map(|c| c.log_probability));
            for cand in &mut cands {
                cand.log_probability -= z;
            }
        }
        cands
    }

    /// Log-prior of an eta-long program under `request`.
    ///
    /// This is the negated enumeration cost of the program, summed in the
    /// same order the enumerator accumulates it.
    pub fn log_likelihood(
        &self,
        request: &TypeScheme,
        program: &Program,
    ) -> Result<f64, InferenceError> {
        let mut ctx = Context::default();
        let request = request.instantiate(&mut ctx);
        let mut total = 0.0;
        self.accumulate(&mut ctx, &[], &request, program, &mut total)?;
        Ok(total)
    }

    fn accumulate(
        &self,
        ctx: &mut Context,
        env: &[Type],
        request: &Type,
        program: &Program,
        total: &mut f64,
    ) -> Result<(), InferenceError> {
        let request = request.apply(ctx);
        if let Some((arg, ret)) = request.as_arrow() {
            let Program::Abstraction(body) = program else {
                return Err(InferenceError::NotEtaLong(program.to_string()));
            };
            let mut inner = Vec::with_capacity(env.len() + 1);
            inner.push(arg.clone());
            inner.extend_from_slice(env);
            return self.accumulate(ctx, &inner, ret, body, total);
        }
        let (head, args) = program.spine();
        let cand = self
            .candidates(&request, ctx, env)
            .into_iter()
            .find(|c| &c.program == head)
            .ok_or_else(|| InferenceError::NoCandidate {
                program: head.to_string(),
                request: request.to_string(),
            })?;
        let arg_types = arguments(&cand.tp);
        if arg_types.len() != args.len() {
            return Err(InferenceError::NotEtaLong(program.to_string()));
        }
        *ctx = cand.ctx;
        *total += cand.log_probability;
        for (arg_tp, arg) in arg_types.iter().zip(args) {
            self.accumulate(ctx, env, arg_tp, arg, total)?;
        }
        Ok(())
    }

    /// Infer the most general type of a closed program.
    pub fn infer(&self, program: &Program) -> Result<TypeScheme, InferenceError> {
        let mut ctx = Context::default();
        let tp = self.infer_internal(program, &mut ctx, &[])?;
        Ok(tp.apply(&ctx).generalize(&[]))
    }

    fn infer_internal(
        &self,
        program: &Program,
        ctx: &mut Context,
        env: &[Type],
    ) -> Result<Type, InferenceError> {
        match program {
            Program::Primitive(_) => self
                .production(program)
                .map(|p| p.tp.instantiate(ctx))
                .ok_or_else(|| InferenceError::UnknownProduction(program.to_string())),
            Program::Invented(body) => match self.production(program) {
                Some(p) => Ok(p.tp.instantiate(ctx)),
                None => self.infer(body).map(|scheme| scheme.instantiate(ctx)),
            },
            Program::Application(f, x) => {
                let f_tp = self.infer_internal(f, ctx, env)?;
                let x_tp = self.infer_internal(x, ctx, env)?;
                let ret = ctx.new_variable();
                ctx.unify(&f_tp, &Type::arrow(x_tp, ret.clone()))?;
                Ok(ret.apply(ctx))
            }
            Program::Abstraction(body) => {
                let arg = ctx.new_variable();
                let mut inner = Vec::with_capacity(env.len() + 1);
                inner.push(arg.clone());
                inner.extend_from_slice(env);
                let ret = self.infer_internal(body, ctx, &inner)?;
                Ok(Type::arrow(arg, ret).apply(ctx))
            }
            Program::Index(i) => env
                .get(*i)
                .map(|tp| tp.apply(ctx))
                .ok_or(InferenceError::UnboundIndex(*i)),
        }
    }

    /// The grammar in the JSON shape native solver backends read.
    pub fn to_json(&self) -> GrammarJson {
        GrammarJson {
            log_variable: self.log_variable,
            normalized: self.normalized,
            productions: self
                .productions
                .iter()
                .map(|p| ProductionJson {
                    expression: p.program.to_string(),
                    tp: TypeSpec::Structured(type_to_json(scheme_body(&p.tp))),
                    log_probability: p.log_probability,
                })
                .collect(),
        }
    }

    /// Build a grammar from its JSON description. Primitives are registered
    /// first so inventions may refer to any of them.
    pub fn from_json(description: &GrammarJson) -> Result<Self, GrammarError> {
        let mut grammar = Grammar {
            log_variable: description.log_variable,
            productions: Vec::with_capacity(description.productions.len()),
            normalized: description.normalized,
            semantics: None,
        };
        let (inventions, primitives): (Vec<_>, Vec<_>) = description
            .productions
            .iter()
            .partition(|p| p.expression.trim_start().starts_with('#'));
        for p in primitives {
            let tp = p.tp.parse().map_err(|source| GrammarError::Type {
                expression: p.expression.clone(),
                source,
            })?;
            grammar.productions.push(Production {
                program: Program::primitive(p.expression.trim()),
                tp: tp.generalize(&[]),
                log_probability: p.log_probability,
            });
        }
        for p in inventions {
            let program = grammar
                .parse(&p.expression)
                .map_err(|source| GrammarError::Program {
                    expression: p.expression.clone(),
                    source,
                })?;
            let tp = p.tp.parse().map_err(|source| GrammarError::Type {
                expression: p.expression.clone(),
                source,
            })?;
            if let Program::Invented(body) = &program {
                grammar
                    .infer(body)
                    .map_err(|source| GrammarError::Inference {
                        expression: p.expression.clone(),
                        source,
                    })?;
            }
            grammar.productions.push(Production {
                program,
                tp: tp.generalize(&[]),
                log_probability: p.log_probability,
            });
        }
        grammar.check_weights()?;
        Ok(grammar)
    }
}

pub(crate) fn logsumexp(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let largest = values.clone().fold(f64::NEG_INFINITY, f64::max);
    if largest == f64::NEG_INFINITY {
        return largest;
    }
    largest + values.map(|v| (v - largest).exp()).sum::<f64>().ln()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarJson {
    #[serde(rename = "logVariable")]
    pub log_variable: f64,
    #[serde(default = "default_normalized")]
    pub normalized: bool,
    pub productions: Vec<ProductionJson>,
}

fn default_normalized() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionJson {
    pub expression: String,
    #[serde(rename = "type")]
    pub tp: TypeSpec,
    #[serde(rename = "logProbability")]
    pub log_probability: f64,
}

/// A type written either as text (`int -> int`) or as structured JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    Text(String),
    Structured(Value),
}

impl TypeSpec {
    pub fn parse(&self) -> Result<Type, TypeParseError> {
        match self {
            TypeSpec::Text(text) => parse_type(text),
            TypeSpec::Structured(value) => type_from_json(value),
        }
    }
}
