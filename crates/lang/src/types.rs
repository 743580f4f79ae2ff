//! Type signatures for the combinator language.
//!
//! Types are `polytype` types whose constructor names are interned as
//! `&'static str`, so that requests parsed from text or JSON can be mixed
//! freely with types written through the `tp!`/`ptp!` macros.

use polytype::{Context, Type, TypeScheme};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use thiserror::Error;

static NAMES: OnceLock<Mutex<HashSet<&'static str>>> = OnceLock::new();

/// Intern a constructor name, leaking each distinct name exactly once.
pub fn intern(name: &str) -> &'static str {
    let names = NAMES.get_or_init(|| Mutex::new(HashSet::new()));
    let mut names = match names.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(existing) = names.get(name) {
        return *existing;
    }
    let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
    names.insert(leaked);
    leaked
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeParseError {
    #[error("unexpected end of type `{0}`")]
    UnexpectedEnd(String),
    #[error("unexpected token `{token}` in type `{text}`")]
    UnexpectedToken { token: String, text: String },
    #[error("malformed type json: {0}")]
    Json(String),
}

/// Parse a type such as `int`, `list(int)`, `int -> int` or `t0 -> t0`.
///
/// Arrows associate to the right and may be written `->` or `→`.
/// Identifiers of the form `t<n>` are type variables.
pub fn parse_type(text: &str) -> Result<Type, TypeParseError> {
    let tokens = tokenize(text);
    let mut parser = TypeParser {
        tokens: &tokens,
        pos: 0,
        text,
    };
    let tp = parser.arrow()?;
    match parser.tokens.get(parser.pos) {
        None => Ok(tp),
        Some(token) => Err(TypeParseError::UnexpectedToken {
            token: token.clone(),
            text: text.to_string(),
        }),
    }
}

/// Parse a type and generalize every variable in it.
pub fn parse_scheme(text: &str) -> Result<TypeScheme, TypeParseError> {
    Ok(parse_type(text)?.generalize(&[]))
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '(' | ')' | ',' | '→' => {
                flush(&mut current, &mut tokens);
                tokens.push(if c == '→' { "->".into() } else { c.to_string() });
            }
            '-' if chars.peek() == Some(&'>') => {
                chars.next();
                flush(&mut current, &mut tokens);
                tokens.push("->".into());
            }
            c if c.is_whitespace() => flush(&mut current, &mut tokens),
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

struct TypeParser<'a> {
    tokens: &'a [String],
    pos: usize,
    text: &'a str,
}

impl<'a> TypeParser<'a> {
    fn next(&mut self) -> Result<&'a str, TypeParseError> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or_else(|| TypeParseError::UnexpectedEnd(self.text.to_string()))?;
        self.pos += 1;
        Ok(token.as_str())
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn unexpected(&self, token: &str) -> TypeParseError {
        TypeParseError::UnexpectedToken {
            token: token.to_string(),
            text: self.text.to_string(),
        }
    }

    fn arrow(&mut self) -> Result<Type, TypeParseError> {
        let lhs = self.atom()?;
        if self.peek() == Some("->") {
            self.pos += 1;
            let rhs = self.arrow()?;
            return Ok(Type::arrow(lhs, rhs));
        }
        Ok(lhs)
    }

    fn atom(&mut self) -> Result<Type, TypeParseError> {
        let token = self.next()?;
        match token {
            "(" => {
                let inner = self.arrow()?;
                match self.next()? {
                    ")" => Ok(inner),
                    other => Err(self.unexpected(other)),
                }
            }
            ")" | "," | "->" => Err(self.unexpected(token)),
            name => {
                if let Some(var) = variable_index(name) {
                    return Ok(Type::Variable(var));
                }
                let mut args = Vec::new();
                if self.peek() == Some("(") {
                    self.pos += 1;
                    loop {
                        args.push(self.arrow()?);
                        match self.next()? {
                            "," => continue,
                            ")" => break,
                            other => return Err(self.unexpected(other)),
                        }
                    }
                }
                Ok(Type::Constructed(intern(name), args))
            }
        }
    }
}

fn variable_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix('t')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// An independent copy of a typing context.
///
/// `Context::clone` shares polytype's path-compression cache between the
/// copies, so bindings made through one copy show up when applying types in
/// another. Contexts that branch must be forked instead.
pub fn fork(ctx: &Context) -> Context {
    let mut forked = Context::default();
    let mut next = 0;
    for (&var, tp) in ctx.substitution() {
        forked.extend(var, tp.clone());
        next = next.max(var + 1);
    }
    let target = match ctx.clone().new_variable() {
        Type::Variable(var) => var,
        Type::Constructed(..) => next,
    };
    for _ in next..target {
        forked.new_variable();
    }
    forked
}

/// The innermost body of a type scheme, with its quantified variables free.
pub fn scheme_body(scheme: &TypeScheme) -> &Type {
    match scheme {
        TypeScheme::Monotype(tp) => tp,
        TypeScheme::Polytype { body, .. } => scheme_body(body),
    }
}

/// Argument types of a curried function type, outermost first.
pub fn arguments(tp: &Type) -> Vec<Type> {
    let mut args = Vec::new();
    let mut current = tp;
    while let Some((arg, ret)) = current.as_arrow() {
        args.push(arg.clone());
        current = ret;
    }
    args
}

/// The final return type of a curried function type.
pub fn return_type(tp: &Type) -> &Type {
    let mut current = tp;
    while let Some((_, ret)) = current.as_arrow() {
        current = ret;
    }
    current
}

pub fn is_monomorphic(tp: &Type) -> bool {
    match tp {
        Type::Variable(_) => false,
        Type::Constructed(_, args) => args.iter().all(is_monomorphic),
    }
}

/// Serialize a type to the `{"constructor", "arguments"}` / `{"index"}` shape
/// understood by native solver backends.
pub fn type_to_json(tp: &Type) -> Value {
    if let Some((arg, ret)) = tp.as_arrow() {
        return json!({
            "constructor": "->",
            "arguments": [type_to_json(arg), type_to_json(ret)],
        });
    }
    match tp {
        Type::Variable(index) => json!({ "index": index }),
        Type::Constructed(name, args) => json!({
            "constructor": name,
            "arguments": args.iter().map(type_to_json).collect::<Vec<_>>(),
        }),
    }
}

pub fn type_from_json(value: &Value) -> Result<Type, TypeParseError> {
    if let Some(index) = value.get("index") {
        let index = index
            .as_u64()
            .ok_or_else(|| TypeParseError::Json(format!("bad variable index {index}")))?;
        return Ok(Type::Variable(index as usize));
    }
    let name = value
        .get("constructor")
        .and_then(Value::as_str)
        .ok_or_else(|| TypeParseError::Json(format!("missing constructor in {value}")))?;
    let args = match value.get("arguments") {
        Some(Value::Array(items)) => items
            .iter()
            .map(type_from_json)
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(TypeParseError::Json(format!(
                "arguments must be an array, got {other}"
            )))
        }
        None => Vec::new(),
    };
    if name == "->" || name == "→" {
        let mut args = args.into_iter();
        return match (args.next(), args.next(), args.next()) {
            (Some(arg), Some(ret), None) => Ok(Type::arrow(arg, ret)),
            _ => Err(TypeParseError::Json("arrow needs exactly two arguments".into())),
        };
    }
    Ok(Type::Constructed(intern(name), args))
}
