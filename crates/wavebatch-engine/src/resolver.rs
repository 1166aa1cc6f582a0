//! Reference tokens and their resolution against completed results.
//!
//! Grammar:
//!
//! ```text
//! reference := '$' ident segment*
//! segment   := '.' ident | '[' digit+ ']'
//! ident     := [A-Za-z0-9_-]+
//! ```
//!
//! Any string starting with `$` is a token and must match the grammar in
//! full. A token resolves to the addressed value with its JSON type intact.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde_json::Value;

use wavebatch_core::error::ResolutionError;

/// One step of a reference path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// `.name`: mapping key.
    Key(String),
    /// `[n]`: sequence index.
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, ".{}", k),
            Self::Index(i) => write!(f, "[{}]", i),
        }
    }
}

/// A parsed `$id.path[0]` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub operation: String,
    pub path: Vec<Segment>,
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.operation)?;
        for seg in &self.path {
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

/// Whether `s` should be treated as a reference token.
pub fn is_reference(s: &str) -> bool {
    s.starts_with('$')
}

/// Parse a complete reference token.
pub fn parse_reference(token: &str) -> Result<Reference, ResolutionError> {
    Parser::new(token).parse()
}

struct Parser<'a> {
    token: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(token: &'a str) -> Self {
        Self {
            token,
            bytes: token.as_bytes(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Reference, ResolutionError> {
        self.expect(b'$')?;
        let operation = self.ident("operation id")?;
        let mut path = Vec::new();
        while let Some(b) = self.peek() {
            path.push(self.segment(b)?);
        }
        Ok(Reference { operation, path })
    }

    fn segment(&mut self, lead: u8) -> Result<Segment, ResolutionError> {
        match lead {
            b'.' => {
                self.pos += 1;
                Ok(Segment::Key(self.ident("key")?))
            }
            b'[' => {
                self.pos += 1;
                let index = self.index()?;
                self.expect(b']')?;
                Ok(Segment::Index(index))
            }
            _ => Err(self.error("expected '.' or '['")),
        }
    }

    fn ident(&mut self, what: &str) -> Result<String, ResolutionError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error(&format!("expected {}", what)));
        }
        Ok(self.token[start..self.pos].to_string())
    }

    fn index(&mut self) -> Result<usize, ResolutionError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected index digits"));
        }
        self.token[start..self.pos]
            .parse()
            .map_err(|_| self.error("index too large"))
    }

    fn expect(&mut self, want: u8) -> Result<(), ResolutionError> {
        if self.peek() == Some(want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", want as char)))
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn error(&self, reason: &str) -> ResolutionError {
        ResolutionError::InvalidSyntax {
            token: self.token.to_string(),
            reason: format!("{} at position {}", reason, self.pos),
        }
    }
}

/// Ids named by every well-formed token inside `value`.
///
/// Malformed tokens are skipped here; they surface as resolution errors
/// when the owning operation runs.
pub fn referenced_ids(value: &Value) -> BTreeSet<String> {
    let mut ids = BTreeSet::new();
    collect_ids(value, &mut ids);
    ids
}

fn collect_ids(value: &Value, ids: &mut BTreeSet<String>) {
    match value {
        Value::String(s) if is_reference(s) => {
            if let Ok(reference) = parse_reference(s) {
                ids.insert(reference.operation);
            }
        }
        Value::Array(items) => items.iter().for_each(|v| collect_ids(v, ids)),
        Value::Object(map) => map.values().for_each(|v| collect_ids(v, ids)),
        _ => {}
    }
}

/// Substitutes reference tokens using a map of completed results.
pub struct Resolver<'a> {
    results: &'a HashMap<String, Value>,
}

impl<'a> Resolver<'a> {
    pub fn new(results: &'a HashMap<String, Value>) -> Self {
        Self { results }
    }

    /// Resolve every token in `value`, depth first. Non-token values are
    /// copied through unchanged.
    pub fn resolve(&self, value: &Value) -> Result<Value, ResolutionError> {
        match value {
            Value::String(s) if is_reference(s) => self.resolve_token(s),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolve a single token string.
    pub fn resolve_token(&self, token: &str) -> Result<Value, ResolutionError> {
        let reference = parse_reference(token)?;
        self.lookup(&reference).cloned()
    }

    /// Walk a parsed reference to the value it addresses.
    pub fn lookup(&self, reference: &Reference) -> Result<&'a Value, ResolutionError> {
        let mut current = self
            .results
            .get(&reference.operation)
            .ok_or_else(|| ResolutionError::UnknownOperation(reference.operation.clone()))?;

        for seg in &reference.path {
            let next = match (seg, current) {
                (Segment::Key(k), Value::Object(map)) => map.get(k),
                (Segment::Index(i), Value::Array(items)) => items.get(*i),
                _ => None,
            };
            current = next.ok_or_else(|| ResolutionError::PathNotFound {
                segment: seg.to_string(),
                token: reference.to_string(),
            })?;
        }
        Ok(current)
    }
}
