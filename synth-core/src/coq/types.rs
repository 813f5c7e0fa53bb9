//! Proof-state types reported by the Coq backend.
//!
//! Hypothesis and goal text is opaque Coq syntax. The only operation the
//! engine performs on it is whitespace-normalized comparison and word
//! matching; no Coq term is ever parsed from these strings.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::script::normalize_whitespace;

/// A named, typed assumption in a goal's context.
///
/// Coq groups variables sharing a type on one line (`x, y : nat`), so one
/// hypothesis carries one or more names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Declared names, in display order.
    pub names: Vec<String>,
    /// Type text.
    #[serde(rename = "type")]
    pub ty: String,
}

impl Hypothesis {
    /// Create a hypothesis with one or more names.
    pub fn new<I, S>(names: I, ty: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            ty: ty.into(),
        }
    }

    /// Parse a hypothesis line such as `x, y : nat` or `n := 3 : nat`.
    ///
    /// The names end at the first `:` that does not start a `:=`. A let-bound
    /// hypothesis keeps its names and type; the body is dropped. Its type
    /// starts at the first top-level `:` of the body that is not a binder
    /// annotation, so `f := fun x : nat => x : nat -> nat` has type
    /// `nat -> nat`.
    pub fn parse(line: &str) -> Option<Self> {
        let bytes = line.as_bytes();
        let colon = (0..bytes.len())
            .find(|&i| bytes[i] == b':' && bytes.get(i + 1) != Some(&b'='))?;

        let (head, ty) = match line[..colon].find(":=") {
            Some(assign) => {
                let body = &line[assign + 2..];
                let sep = type_separator(body)?;
                (&line[..assign], &body[sep + 1..])
            }
            None => (&line[..colon], &line[colon + 1..]),
        };
        let names: Vec<String> = head
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();
        let ty = ty.trim();

        if names.is_empty() || ty.is_empty() {
            return None;
        }
        if names.iter().any(|n| n.contains(char::is_whitespace)) {
            return None;
        }

        Some(Self {
            names,
            ty: ty.to_string(),
        })
    }

    /// Whether this hypothesis declares `name`.
    pub fn declares(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Type text with runs of whitespace collapsed.
    pub fn normalized_type(&self) -> String {
        normalize_whitespace(&self.ty)
    }

    /// Whether two hypotheses have the same type up to whitespace.
    pub fn same_type(&self, other: &Hypothesis) -> bool {
        self.normalized_type() == other.normalized_type()
    }

    /// Render as a parenthesized binder, e.g. `(x y : nat)`.
    pub fn binder(&self) -> String {
        format!("({} : {})", self.names.join(" "), self.ty)
    }
}

impl fmt::Display for Hypothesis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.names.join(", "), self.ty)
    }
}

/// One open proof obligation: its local context and the statement to prove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Obligation {
    /// Local hypotheses, oldest first.
    pub hypotheses: Vec<Hypothesis>,
    /// Goal text.
    pub goal: String,
}

impl Obligation {
    /// Create an obligation with no hypotheses.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            hypotheses: Vec::new(),
            goal: goal.into(),
        }
    }

    /// Add a hypothesis.
    pub fn with_hypothesis(mut self, hypothesis: Hypothesis) -> Self {
        self.hypotheses.push(hypothesis);
        self
    }

    /// Add a hypothesis parsed from `names : type` text.
    ///
    /// Lines that do not parse are ignored.
    pub fn with_hyp(mut self, line: &str) -> Self {
        if let Some(h) = Hypothesis::parse(line) {
            self.hypotheses.push(h);
        }
        self
    }
}

/// Snapshot of the backend's proof state.
///
/// Each executed sentence replaces the whole snapshot; goals are never
/// mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofContext {
    /// Foreground goals, focused goal first.
    pub fg_goals: Vec<Obligation>,
    /// Goals hidden behind an open focus.
    #[serde(default)]
    pub bg_goals: Vec<Obligation>,
}

impl ProofContext {
    /// Create a context with only foreground goals.
    pub fn new(fg_goals: Vec<Obligation>) -> Self {
        Self {
            fg_goals,
            bg_goals: Vec::new(),
        }
    }

    /// Set the background goals.
    pub fn with_background(mut self, bg_goals: Vec<Obligation>) -> Self {
        self.bg_goals = bg_goals;
        self
    }

    /// The focused goal, if any.
    pub fn focused(&self) -> Option<&Obligation> {
        self.fg_goals.first()
    }

    /// Whether no goal remains anywhere.
    pub fn all_goals_empty(&self) -> bool {
        self.fg_goals.is_empty() && self.bg_goals.is_empty()
    }
}

/// Result of executing one sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// The sentence was accepted and the session advanced.
    Checked,
    /// The sentence failed; the session is unchanged.
    Rejected { message: String },
}

impl CommandOutcome {
    /// Create a rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Whether the sentence was accepted.
    pub fn is_checked(&self) -> bool {
        matches!(self, Self::Checked)
    }
}

/// Byte offset of the `:` separating a let-bound body from its type.
///
/// Colons nested in brackets, `::`, `:=` and binder annotations opened by
/// `fun`, `forall` or `exists` (closed by `=>` or `,`) are skipped.
fn type_separator(body: &str) -> Option<usize> {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut binders = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => depth = depth.saturating_sub(1),
            _ if depth > 0 => {}
            b',' => binders = binders.saturating_sub(1),
            b'=' if bytes.get(i + 1) == Some(&b'>') => {
                binders = binders.saturating_sub(1);
                i += 1;
            }
            b':' if matches!(bytes.get(i + 1), Some(b'=' | b':')) => i += 1,
            b':' if binders == 0 => return Some(i),
            b if b.is_ascii_alphabetic() => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'\''))
                {
                    i += 1;
                }
                if matches!(&body[start..i], "fun" | "forall" | "exists" | "exists2") {
                    binders += 1;
                }
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}
