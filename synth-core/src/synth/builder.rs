//! Construction of synthetic lemma statements and proofs.

use crate::coq::script::{sentence_body, strip_terminator};
use crate::coq::{Hypothesis, Obligation};

use super::diff::diff;
use super::types::{SubgoalHypothesis, SynthLemma};

/// One executed tactic step, as seen by the builder.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    /// Index of the enclosing proof within the file.
    pub lemma_index: usize,
    /// Index of the sentence within the proof.
    pub step_index: usize,
    /// The tactic sentence.
    pub command: &'a str,
    /// Focused goal before the step.
    pub before: &'a Obligation,
    /// Goals the step produced.
    pub after_goals: &'a [Obligation],
}

/// Builds a `SynthLemma` from one step.
#[derive(Debug, Clone)]
pub struct LemmaBuilder {
    closer: String,
}

impl Default for LemmaBuilder {
    fn default() -> Self {
        Self::new("auto")
    }
}

impl LemmaBuilder {
    /// Create a builder falling back to `closer` after the sub-goal hypotheses.
    pub fn new(closer: impl Into<String>) -> Self {
        Self {
            closer: closer.into(),
        }
    }

    /// Build the lemma for `step`.
    ///
    /// `visible` holds the section-level hypotheses, which are never turned
    /// into parameters. `generalized` holds variables the step consumed; they
    /// are re-quantified in every sub-goal that mentions them.
    pub fn build(
        &self,
        step: &Step<'_>,
        visible: &[Hypothesis],
        generalized: &[Hypothesis],
    ) -> SynthLemma {
        let mut params = diff(visible, &step.before.hypotheses);
        params.reverse();

        let subgoals = step
            .after_goals
            .iter()
            .enumerate()
            .map(|(gidx, goal)| {
                let mut fresh = diff(&step.before.hypotheses, &goal.hypotheses);
                fresh.reverse();
                let new_hyps: Vec<Hypothesis> =
                    generalized.iter().cloned().chain(fresh).collect();
                SubgoalHypothesis::new(gidx, subgoal_body(&new_hyps, &goal.goal))
            })
            .collect::<Vec<_>>();

        let proof = self.proof_script(step.command, subgoals.len());

        SynthLemma {
            name: SynthLemma::name_for(step.lemma_index, step.step_index),
            params,
            subgoals,
            conclusion: step.before.goal.clone(),
            proof,
        }
    }

    /// The step re-issued, then each sub-goal hypothesis, then the closer.
    fn proof_script(&self, command: &str, subgoal_count: usize) -> String {
        let body = sentence_body(command);
        let tactic = strip_terminator(&body);
        if subgoal_count == 0 {
            return format!("{}; {}.", tactic, self.closer);
        }
        let mut branches: Vec<String> = (0..subgoal_count)
            .map(|i| format!("eapply subgoal{}; eassumption", i))
            .collect();
        branches.push(self.closer.clone());
        format!("{}; first [ {} ].", tactic, branches.join(" | "))
    }
}

/// Quantify the referenced new hypotheses over `goal`.
///
/// Hypotheses are visited newest first so that a variable only mentioned by
/// a later binder is still kept. Unreferenced names are dropped.
pub(crate) fn subgoal_body(new_hyps: &[Hypothesis], goal: &str) -> String {
    let mut prefixes: Vec<String> = Vec::new();

    for hyp in new_hyps.iter().rev() {
        let referenced: Vec<&str> = hyp
            .names
            .iter()
            .map(String::as_str)
            .filter(|name| mentions(goal, name) || prefixes.iter().any(|p| mentions(p, name)))
            .collect();
        if !referenced.is_empty() {
            prefixes.push(format!("forall ({} : {}),", referenced.join(" "), hyp.ty));
        }
    }

    prefixes.reverse();
    prefixes.push(goal.to_string());
    prefixes.join(" ")
}

/// Whether `name` occurs in `text` as a whole identifier.
pub fn mentions(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '\'';
    text.match_indices(name).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hyp(line: &str) -> Hypothesis {
        Hypothesis::parse(line).unwrap()
    }

    #[test]
    fn test_mentions_respects_identifier_boundaries() {
        assert!(mentions("n + 0 = n", "n"));
        assert!(mentions("f (n)", "n"));
        assert!(!mentions("n' + 0 = n'", "n"));
        assert!(!mentions("nat", "n"));
        assert!(!mentions("IHn", "n"));
        assert!(mentions("IHn", "IHn"));
    }

    #[test]
    fn test_induction_step() {
        let before = Obligation::new("n + 0 = n").with_hyp("n : nat");
        let after = vec![
            Obligation::new("0 + 0 = 0"),
            Obligation::new("S n + 0 = S n")
                .with_hyp("n : nat")
                .with_hyp("IHn : n + 0 = n"),
        ];
        let step = Step {
            lemma_index: 0,
            step_index: 3,
            command: "induction n.",
            before: &before,
            after_goals: &after,
        };
        let generalized = vec![hyp("n : nat")];

        let lemma = LemmaBuilder::default().build(&step, &[], &generalized);

        assert_eq!(lemma.name, "synth_lemma_0_3");
        assert_eq!(lemma.params, vec![hyp("n : nat")]);
        assert_eq!(lemma.subgoals[0].body, "0 + 0 = 0");
        // IHn is not mentioned by the goal, so it is not quantified.
        assert_eq!(lemma.subgoals[1].body, "forall (n : nat), S n + 0 = S n");
        assert_eq!(lemma.conclusion, "n + 0 = n");
        assert_eq!(
            lemma.proof,
            "induction n; first [ eapply subgoal0; eassumption | eapply subgoal1; eassumption | auto ]."
        );
    }

    #[test]
    fn test_visible_hypotheses_are_not_parameters() {
        let before = Obligation::new("P x")
            .with_hyp("A : Type")
            .with_hyp("x : A");
        let step = Step {
            lemma_index: 1,
            step_index: 0,
            command: "auto.",
            before: &before,
            after_goals: &[],
        };
        let lemma = LemmaBuilder::default().build(&step, &[hyp("A : Type")], &[]);
        assert_eq!(lemma.params, vec![hyp("x : A")]);
        assert!(lemma.subgoals.is_empty());
        assert_eq!(lemma.proof, "auto; auto.");
    }

    #[test]
    fn test_params_keep_context_order() {
        let before = Obligation::new("Q")
            .with_hyp("a : nat")
            .with_hyp("H : a = 0")
            .with_hyp("b : bool");
        let step = Step {
            lemma_index: 0,
            step_index: 0,
            command: "exact I.",
            before: &before,
            after_goals: &[],
        };
        let lemma = LemmaBuilder::default().build(&step, &[], &[]);
        assert_eq!(
            lemma.statement(),
            "Lemma synth_lemma_0_0 (a : nat) (H : a = 0) (b : bool) : Q."
        );
    }

    #[test]
    fn test_unreferenced_hypotheses_are_dropped() {
        let before = Obligation::new("forall x y : nat, x = x");
        let after = vec![Obligation::new("x = x")
            .with_hyp("x, y : nat")
            .with_hyp("junk : True")];
        let step = Step {
            lemma_index: 0,
            step_index: 1,
            command: "intros x y junk.",
            before: &before,
            after_goals: &after,
        };
        let lemma = LemmaBuilder::default().build(&step, &[], &[]);
        assert_eq!(lemma.subgoals[0].body, "forall (x : nat), x = x");
    }

    #[test]
    fn test_variable_referenced_only_by_later_binder_is_kept() {
        let before = Obligation::new("forall m, m > 0 -> Hm = Hm");
        let after = vec![Obligation::new("Hm = Hm")
            .with_hyp("m : nat")
            .with_hyp("Hm : m > 0")];
        let step = Step {
            lemma_index: 0,
            step_index: 2,
            command: "intros m Hm.",
            before: &before,
            after_goals: &after,
        };
        let lemma = LemmaBuilder::default().build(&step, &[], &[]);
        assert_eq!(
            lemma.subgoals[0].body,
            "forall (m : nat), forall (Hm : m > 0), Hm = Hm"
        );
    }

    #[test]
    fn test_comments_are_stripped_from_the_replayed_step() {
        let before = Obligation::new("True");
        let step = Step {
            lemma_index: 0,
            step_index: 0,
            command: "\n  (* close it *) exact I.",
            before: &before,
            after_goals: &[],
        };
        let lemma = LemmaBuilder::new("trivial").build(&step, &[], &[]);
        assert_eq!(lemma.proof, "exact I; trivial.");
    }
}
