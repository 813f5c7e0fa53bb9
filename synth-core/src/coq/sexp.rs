//! S-expressions as spoken by SerAPI.
//!
//! SerAPI encodes both requests and answers as S-expressions: bare atoms,
//! double-quoted strings with backslash escapes, integers and lists.

use crate::error::{Error, Result};
use std::fmt;

/// A parsed S-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexpr {
    /// Bare symbol, e.g. `Answer`.
    Atom(String),
    /// Quoted string.
    Str(String),
    /// Integer literal.
    Int(i64),
    /// Parenthesized list.
    List(Vec<Sexpr>),
}

impl Sexpr {
    /// Create an atom.
    pub fn atom(s: impl Into<String>) -> Self {
        Self::Atom(s.into())
    }

    /// Create a string.
    pub fn string(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Create a list.
    pub fn list(items: impl IntoIterator<Item = Sexpr>) -> Self {
        Self::List(items.into_iter().collect())
    }

    /// Parse exactly one S-expression from `input`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parser = Parser {
            src: input.as_bytes(),
            input,
            pos: 0,
        };
        let value = parser.value()?;
        parser.skip_ws();
        if parser.pos != input.len() {
            return Err(Error::sexp_parse("trailing input", parser.pos));
        }
        Ok(value)
    }

    /// Whether this is the atom `name`.
    pub fn is_atom(&self, name: &str) -> bool {
        matches!(self, Self::Atom(a) if a == name)
    }

    /// List items, if this is a list.
    pub fn as_list(&self) -> Option<&[Sexpr]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Head atom of a list, e.g. `Answer` for `(Answer 1 Ack)`.
    pub fn head(&self) -> Option<&str> {
        match self.as_list()?.first()? {
            Self::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// String or atom text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Atom(s) | Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Depth-first search for the first sub-list headed by `name`.
    pub fn find_headed(&self, name: &str) -> Option<&Sexpr> {
        if self.head() == Some(name) {
            return Some(self);
        }
        self.as_list()?
            .iter()
            .find_map(|item| item.find_headed(name))
    }

    /// All strings paired with the atom `key`, as in `(str "...")`, in
    /// depth-first order.
    pub fn keyed_strings(&self, key: &str) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_keyed(key, &mut out);
        out
    }

    fn collect_keyed<'a>(&'a self, key: &str, out: &mut Vec<&'a str>) {
        if let Self::List(items) = self {
            if let [Self::Atom(k), Self::Str(v)] = items.as_slice() {
                if k == key {
                    out.push(v);
                    return;
                }
            }
            for item in items {
                item.collect_keyed(key, out);
            }
        }
    }
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atom(a) => write!(f, "{}", a),
            Self::Int(n) => write!(f, "{}", n),
            Self::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        '\n' => f.write_str("\\n")?,
                        _ => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

struct Parser<'a> {
    src: &'a [u8],
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        while self.pos < self.src.len() && self.src[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Sexpr> {
        self.skip_ws();
        match self.src.get(self.pos) {
            None => Err(Error::sexp_parse("unexpected end of input", self.pos)),
            Some(b'(') => {
                self.pos += 1;
                let mut items = Vec::new();
                loop {
                    self.skip_ws();
                    match self.src.get(self.pos) {
                        None => return Err(Error::sexp_parse("unclosed list", self.pos)),
                        Some(b')') => {
                            self.pos += 1;
                            return Ok(Sexpr::List(items));
                        }
                        Some(_) => items.push(self.value()?),
                    }
                }
            }
            Some(b')') => Err(Error::sexp_parse("unexpected `)`", self.pos)),
            Some(b'"') => self.string(),
            Some(_) => Ok(self.atom()),
        }
    }

    fn string(&mut self) -> Result<Sexpr> {
        let open = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = &self.input[self.pos..];
            let mut chars = rest.chars();
            let c = chars
                .next()
                .ok_or_else(|| Error::sexp_parse("unterminated string", open))?;
            self.pos += c.len_utf8();
            match c {
                '"' => return Ok(Sexpr::Str(out)),
                '\\' => {
                    let esc = chars
                        .next()
                        .ok_or_else(|| Error::sexp_parse("unterminated escape", self.pos))?;
                    self.pos += esc.len_utf8();
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
    }

    fn atom(&mut self) -> Sexpr {
        let start = self.pos;
        while self.pos < self.src.len() {
            let b = self.src[self.pos];
            if b.is_ascii_whitespace() || b == b'(' || b == b')' || b == b'"' {
                break;
            }
            self.pos += 1;
        }
        let text = &self.input[start..self.pos];
        match text.parse::<i64>() {
            Ok(n) => Sexpr::Int(n),
            Err(_) => Sexpr::Atom(text.to_string()),
        }
    }
}
