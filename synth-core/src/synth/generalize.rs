//! Detection of case analysis on variables already in context.

use regex::Regex;
use std::sync::LazyLock;

use crate::coq::script::sentence_body;
use crate::coq::Hypothesis;

/// `induction n.`, `destruct l as [|x xs].`, `case b eqn:E.`
static CASE_SPLIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:induction|destruct|case|elim)\s+(?P<var>[A-Za-z_][\w']*)(?:\s+(?:as|eqn|using|in)\b[^.]*)?\s*\.$",
    )
    .expect("Invalid regex")
});

/// Records variables a case-splitting step consumes.
///
/// Coq removes the scrutinee from the context of every branch, so the
/// variable has to be quantified again in each sub-goal hypothesis.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeneralizationTracker;

impl GeneralizationTracker {
    /// The scrutinee of `command` with its type from `before_hyps`.
    ///
    /// Returns at most one hypothesis, taken from the first hypothesis that
    /// declares the scrutinee. Commands of any other shape yield nothing.
    pub fn track(command: &str, before_hyps: &[Hypothesis]) -> Vec<Hypothesis> {
        let body = sentence_body(command);
        let Some(var) = CASE_SPLIT
            .captures(&body)
            .and_then(|caps| caps.name("var"))
            .map(|m| m.as_str().to_string())
        else {
            return Vec::new();
        };

        before_hyps
            .iter()
            .find(|h| h.declares(&var))
            .map(|h| vec![Hypothesis::new([var.clone()], h.ty.clone())])
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hyps() -> Vec<Hypothesis> {
        vec![
            Hypothesis::new(["n", "m"], "nat"),
            Hypothesis::new(["l"], "list nat"),
            Hypothesis::new(["n"], "bool"),
        ]
    }

    #[test]
    fn test_induction_on_context_variable() {
        assert_eq!(
            GeneralizationTracker::track("induction n.", &hyps()),
            vec![Hypothesis::new(["n"], "nat")]
        );
    }

    #[test]
    fn test_destruct_with_intro_pattern() {
        assert_eq!(
            GeneralizationTracker::track("  destruct l as [|x xs].", &hyps()),
            vec![Hypothesis::new(["l"], "list nat")]
        );
    }

    #[test]
    fn test_unbound_variable_is_not_tracked() {
        assert!(GeneralizationTracker::track("induction k.", &hyps()).is_empty());
    }

    #[test]
    fn test_other_commands_are_not_tracked() {
        assert!(GeneralizationTracker::track("simpl.", &hyps()).is_empty());
        assert!(GeneralizationTracker::track("induction (f n).", &hyps()).is_empty());
        assert!(GeneralizationTracker::track("destruct n, m.", &hyps()).is_empty());
    }
}
