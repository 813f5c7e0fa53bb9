//! Deterministic in-memory backend.
//!
//! `ScriptedBackend` replays goal transitions registered up front instead of
//! running Coq. It follows the same rules the real session does for the
//! sentences the engine issues itself: statements open a (possibly nested)
//! proof, proof-ending sentences close it, and rejected sentences leave the
//! state untouched.

use std::collections::HashMap;

use crate::error::Result;

use super::backend::ProofBackend;
use super::script::{is_proof_end, lemma_name_from_statement, sentence_body};
use super::types::{CommandOutcome, Obligation, ProofContext};

/// In-memory backend driven by registered transitions.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    context: Option<ProofContext>,
    /// Keyed by (focused goal text, sentence body); `None` matches any goal.
    transitions: HashMap<(Option<String>, String), Option<ProofContext>>,
    rejections: Vec<String>,
    types: HashMap<String, String>,
    /// Contexts suspended by nested statements.
    suspended: Vec<Option<ProofContext>>,
    executed: Vec<String>,
    rejected: Vec<String>,
}

impl ScriptedBackend {
    /// Create a backend outside proof mode.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start inside a proof with the given state.
    pub fn proving(context: ProofContext) -> Self {
        Self {
            context: Some(context),
            suspended: vec![None],
            ..Self::default()
        }
    }

    /// Register the state that follows `sentence`, whatever the current goal.
    pub fn on(mut self, sentence: &str, after: Option<ProofContext>) -> Self {
        self.transitions
            .insert((None, sentence_body(sentence)), after);
        self
    }

    /// Register the state that follows `sentence` when `goal` is focused.
    pub fn on_goal(mut self, goal: &str, sentence: &str, after: Option<ProofContext>) -> Self {
        self.transitions
            .insert((Some(goal.to_string()), sentence_body(sentence)), after);
        self
    }

    /// Reject every sentence starting with `prefix`.
    pub fn reject(mut self, prefix: impl Into<String>) -> Self {
        self.rejections.push(prefix.into());
        self
    }

    /// Answer `check_type(name)` with `ty`.
    pub fn with_type(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.types.insert(name.into(), ty.into());
        self
    }

    /// Accepted sentences, in execution order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Rejected sentences, in execution order.
    pub fn rejected(&self) -> &[String] {
        &self.rejected
    }

    /// Current state without going through the trait.
    pub fn context(&self) -> Option<&ProofContext> {
        self.context.as_ref()
    }

    fn lookup(&self, body: &str) -> Option<Option<ProofContext>> {
        let focused = self
            .context
            .as_ref()
            .and_then(|ctx| ctx.focused())
            .map(|o| o.goal.clone());
        if focused.is_some() {
            if let Some(after) = self.transitions.get(&(focused, body.to_string())) {
                return Some(after.clone());
            }
        }
        self.transitions.get(&(None, body.to_string())).cloned()
    }
}

impl ProofBackend for ScriptedBackend {
    fn run(&mut self, sentence: &str) -> Result<CommandOutcome> {
        let body = sentence_body(sentence);
        if body.is_empty() {
            return Ok(CommandOutcome::Checked);
        }
        if self.rejections.iter().any(|p| body.starts_with(p.as_str())) {
            self.rejected.push(body);
            return Ok(CommandOutcome::rejected("scripted rejection"));
        }

        let transition = self.lookup(&body);
        self.executed.push(body.clone());

        if lemma_name_from_statement(&body).is_some() && !body.contains(":=") {
            let opened = transition
                .flatten()
                .unwrap_or_else(|| ProofContext::new(vec![Obligation::new(body.clone())]));
            self.suspended.push(self.context.take());
            self.context = Some(opened);
        } else if is_proof_end(&body) {
            self.context = self.suspended.pop().flatten();
        } else if let Some(after) = transition {
            self.context = after;
        }

        Ok(CommandOutcome::Checked)
    }

    fn goals(&mut self) -> Result<Option<ProofContext>> {
        Ok(self.context.clone())
    }

    fn check_type(&mut self, term: &str) -> Result<Option<String>> {
        Ok(self.types.get(term.trim()).cloned())
    }
}
