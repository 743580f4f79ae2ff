//! Candidate programs: closed terms of a typed combinator language.

use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A term in the combinator language.
///
/// Variables are de Bruijn indices: `Index(0)` refers to the innermost
/// enclosing abstraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Program {
    Primitive(Arc<str>),
    /// A learned abstraction used as a single production.
    Invented(Arc<Program>),
    Application(Box<Program>, Box<Program>),
    Abstraction(Box<Program>),
    Index(usize),
}

impl Program {
    pub fn primitive(name: &str) -> Self {
        Program::Primitive(Arc::from(name))
    }

    pub fn invented(body: Program) -> Self {
        Program::Invented(Arc::new(body))
    }

    pub fn apply(self, arg: Program) -> Self {
        Program::Application(Box::new(self), Box::new(arg))
    }

    pub fn lambda(body: Program) -> Self {
        Program::Abstraction(Box::new(body))
    }

    /// Split an application chain into its head and arguments, in order.
    pub fn spine(&self) -> (&Program, Vec<&Program>) {
        let mut args = Vec::new();
        let mut head = self;
        while let Program::Application(f, x) = head {
            args.push(x.as_ref());
            head = f;
        }
        args.reverse();
        (head, args)
    }

    /// Number of nodes, counting an invention as one.
    pub fn size(&self) -> usize {
        match self {
            Program::Application(f, x) => 1 + f.size() + x.size(),
            Program::Abstraction(body) => 1 + body.size(),
            _ => 1,
        }
    }

    /// Parse the s-expression form produced by `Display`.
    ///
    /// `is_primitive` decides which bare names are accepted; anything else is
    /// reported as unknown.
    pub fn parse(text: &str, is_primitive: impl Fn(&str) -> bool) -> Result<Program, ParseError> {
        let tokens = tokenize(text);
        let mut parser = ProgramParser {
            tokens: &tokens,
            pos: 0,
            is_primitive: &is_primitive,
        };
        let program = parser.expression()?;
        if let Some(extra) = tokens.get(parser.pos) {
            return Err(ParseError::Trailing(extra.clone()));
        }
        Ok(program)
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Program::Primitive(name) => write!(f, "{name}"),
            Program::Invented(body) => write!(f, "#{body}"),
            Program::Index(i) => write!(f, "${i}"),
            Program::Abstraction(body) => write!(f, "(lambda {body})"),
            Program::Application(..) => {
                let (head, args) = self.spine();
                write!(f, "({head}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Serialize for Program {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected end of program text")]
    UnexpectedEnd,
    #[error("unexpected `{0}` in program text")]
    Unexpected(String),
    #[error("trailing input `{0}` after program")]
    Trailing(String),
    #[error("unknown primitive `{0}`")]
    UnknownPrimitive(String),
    #[error("bad variable `{0}`")]
    BadIndex(String),
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        match c {
            '(' | ')' | '#' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct ProgramParser<'a> {
    tokens: &'a [String],
    pos: usize,
    is_primitive: &'a dyn Fn(&str) -> bool,
}

impl<'a> ProgramParser<'a> {
    fn next(&mut self) -> Result<&'a str, ParseError> {
        let token = self.tokens.get(self.pos).ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token.as_str())
    }

    fn peek(&self) -> Option<&'a str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn expression(&mut self) -> Result<Program, ParseError> {
        match self.next()? {
            "(" => {
                if matches!(self.peek(), Some("lambda") | Some("λ")) {
                    self.pos += 1;
                    let body = self.expression()?;
                    self.close()?;
                    return Ok(Program::lambda(body));
                }
                let mut program = self.expression()?;
                loop {
                    match self.peek() {
                        Some(")") => {
                            self.pos += 1;
                            return Ok(program);
                        }
                        Some(_) => program = program.apply(self.expression()?),
                        None => return Err(ParseError::UnexpectedEnd),
                    }
                }
            }
            "#" => Ok(Program::invented(self.expression()?)),
            ")" => Err(ParseError::Unexpected(")".into())),
            token if token.starts_with('$') => token[1..]
                .parse()
                .map(Program::Index)
                .map_err(|_| ParseError::BadIndex(token.to_string())),
            name if (self.is_primitive)(name) => Ok(Program::primitive(name)),
            name => Err(ParseError::UnknownPrimitive(name.to_string())),
        }
    }

    fn close(&mut self) -> Result<(), ParseError> {
        match self.next()? {
            ")" => Ok(()),
            other => Err(ParseError::Unexpected(other.to_string())),
        }
    }
}
