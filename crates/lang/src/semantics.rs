//! Executable meaning for programs, used by evaluators and by the
//! observational-equivalence pruning of bottom-up search.

use crate::grammar::Grammar;
use crate::program::Program;
use crate::types::{arguments, scheme_body};
use serde_json::Value;
use std::collections::HashMap;

pub trait Semantics: Send + Sync {
    /// Evaluate an open program body. `env[0]` is the innermost variable.
    fn evaluate(&self, body: &Program, env: &[Value]) -> Option<Value>;

    /// Apply a closed program in eta-long form to `inputs`, in argument order.
    fn run(&self, program: &Program, inputs: &[Value]) -> Option<Value> {
        let mut body = program;
        let mut binders = 0;
        while let Program::Abstraction(inner) = body {
            body = inner;
            binders += 1;
        }
        if binders != inputs.len() {
            return None;
        }
        let env: Vec<Value> = inputs.iter().rev().cloned().collect();
        self.evaluate(body, &env)
    }
}

/// A first-order interpreter: every primitive is a function of its fully
/// evaluated arguments.
pub struct PrimitiveSemantics<F> {
    arities: HashMap<String, usize>,
    primitive: F,
}

impl<F> PrimitiveSemantics<F>
where
    F: Fn(&str, &[Value]) -> Option<Value> + Send + Sync,
{
    /// Arities are read off the grammar's production types.
    pub fn new(grammar: &Grammar, primitive: F) -> Self {
        let arities = grammar
            .productions
            .iter()
            .filter_map(|p| match &p.program {
                Program::Primitive(name) => {
                    Some((name.to_string(), arguments(scheme_body(&p.tp)).len()))
                }
                _ => None,
            })
            .collect();
        Self { arities, primitive }
    }
}

impl<F> Semantics for PrimitiveSemantics<F>
where
    F: Fn(&str, &[Value]) -> Option<Value> + Send + Sync,
{
    fn evaluate(&self, body: &Program, env: &[Value]) -> Option<Value> {
        let (head, args) = body.spine();
        match head {
            Program::Index(i) if args.is_empty() => env.get(*i).cloned(),
            Program::Primitive(name) => {
                if *self.arities.get(&**name)? != args.len() {
                    return None;
                }
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg, env))
                    .collect::<Option<Vec<_>>>()?;
                (self.primitive)(&**name, &values)
            }
            Program::Invented(inner) => {
                let values = args
                    .iter()
                    .map(|arg| self.evaluate(arg, env))
                    .collect::<Option<Vec<_>>>()?;
                self.run(inner, &values)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polytype::{ptp, tp};
    use serde_json::json;

    fn semantics() -> (
        Grammar,
        PrimitiveSemantics<impl Fn(&str, &[Value]) -> Option<Value> + Send + Sync>,
    ) {
        let grammar = Grammar::uniform(vec![
            ("zero", ptp!(int)),
            ("succ", ptp!(@arrow[tp!(int), tp!(int)])),
            ("-", ptp!(@arrow[tp!(int), tp!(int), tp!(int)])),
        ]);
        let semantics = PrimitiveSemantics::new(&grammar, |name: &str, args: &[Value]| {
            match (name, args) {
                ("zero", []) => Some(json!(0)),
                ("succ", [x]) => Some(json!(x.as_i64()? + 1)),
                ("-", [x, y]) => Some(json!(x.as_i64()? - y.as_i64()?)),
                _ => None,
            }
        });
        (grammar, semantics)
    }

    #[test]
    fn runs_with_arguments_in_order() {
        let (grammar, semantics) = semantics();
        let program = grammar.parse("(lambda (lambda (- $1 $0)))").unwrap();
        assert_eq!(semantics.run(&program, &[json!(5), json!(2)]), Some(json!(3)));
    }

    #[test]
    fn inventions_are_applied() {
        let (grammar, semantics) = semantics();
        let program = grammar
            .parse("(lambda (#(lambda (succ (succ $0))) $0))")
            .unwrap();
        assert_eq!(semantics.run(&program, &[json!(1)]), Some(json!(3)));
    }

    #[test]
    fn arity_mismatch_fails_quietly() {
        let (grammar, semantics) = semantics();
        let program = grammar.parse("(lambda (succ $0 $0))").unwrap();
        assert_eq!(semantics.run(&program, &[json!(1)]), None);
        let program = grammar.parse("(lambda (succ $0))").unwrap();
        assert_eq!(semantics.run(&program, &[]), None);
    }
}
