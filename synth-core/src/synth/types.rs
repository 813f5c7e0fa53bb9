//! Types produced and consumed by lemma synthesis.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::coq::Hypothesis;

/// Default suffix appended to the input stem to name the output file.
pub const DEFAULT_OUTPUT_SUFFIX: &str = "-synthetic.v";

/// One named hypothesis standing for a sub-goal the step left open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubgoalHypothesis {
    /// Binder name, `subgoal<index>`.
    pub name: String,
    /// `forall` prefixes followed by the sub-goal text.
    pub body: String,
}

impl SubgoalHypothesis {
    /// Create a sub-goal hypothesis for position `index`.
    pub fn new(index: usize, body: impl Into<String>) -> Self {
        Self {
            name: format!("subgoal{}", index),
            body: body.into(),
        }
    }

    /// Render as a binder, e.g. `(subgoal0 : forall (m : nat), P m)`.
    pub fn binder(&self) -> String {
        format!("({} : {})", self.name, self.body)
    }
}

/// An auxiliary lemma capturing one tactic step.
///
/// The statement assumes every sub-goal the step produced and concludes the
/// goal the step was applied to. The proof replays the step and closes each
/// resulting goal with the matching sub-goal hypothesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthLemma {
    /// `synth_lemma_<lemma_index>_<step_index>`.
    pub name: String,
    /// Hypotheses of the original context quantified as parameters.
    pub params: Vec<Hypothesis>,
    /// One hypothesis per resulting sub-goal.
    pub subgoals: Vec<SubgoalHypothesis>,
    /// Goal text before the step.
    pub conclusion: String,
    /// Tactic sentence discharging the conclusion.
    pub proof: String,
}

impl SynthLemma {
    /// Deterministic lemma name for a step of a proof.
    pub fn name_for(lemma_index: usize, step_index: usize) -> String {
        format!("synth_lemma_{}_{}", lemma_index, step_index)
    }

    /// The `Lemma` sentence.
    pub fn statement(&self) -> String {
        let mut out = format!("Lemma {}", self.name);
        for param in &self.params {
            out.push(' ');
            out.push_str(&param.binder());
        }
        for subgoal in &self.subgoals {
            out.push(' ');
            out.push_str(&subgoal.binder());
        }
        out.push_str(" : ");
        out.push_str(&self.conclusion);
        out.push('.');
        out
    }

    /// The sentences to replay, in order: statement, proof, `Qed.`
    pub fn buffer(&self) -> ProofBuffer {
        let mut buffer = ProofBuffer::new();
        buffer.push(self.statement());
        buffer.push(self.proof.clone());
        buffer.push("Qed.");
        buffer
    }
}

/// Sentences of one synthesis attempt that have not been committed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofBuffer {
    commands: Vec<String>,
}

impl ProofBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sentence.
    pub fn push(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    /// The opening statement.
    pub fn statement(&self) -> Option<&str> {
        self.commands.first().map(String::as_str)
    }

    /// Sentences after the statement.
    pub fn script(&self) -> &[String] {
        self.commands.get(1..).unwrap_or_default()
    }

    /// All sentences.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Drop every buffered sentence.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

/// How a synthesis attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitOutcome {
    /// Statement and proof checked; the lemma was written.
    Success,
    /// Statement checked but the proof did not; the lemma was admitted.
    Degraded,
    /// Statement was rejected; nothing happened.
    Discarded,
}

impl std::fmt::Display for CommitOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Degraded => write!(f, "degraded"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

/// Configuration for synthesis over one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Appended to the input path minus its extension.
    pub output_suffix: String,
    /// Issue `Set Nested Proofs Allowed.` before processing.
    pub nested_proofs: bool,
    /// Tactic tried after every sub-goal hypothesis.
    pub closer: String,
    /// Sentence closing a lemma whose proof failed.
    pub degraded_closer: String,
    /// Write the statement of degraded lemmas, followed by the degraded closer.
    pub persist_degraded: bool,
    /// Lemmas to synthesize from; every proof in the file when unset.
    pub proof_jobs: Option<Vec<String>>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            output_suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
            nested_proofs: true,
            closer: "auto".to_string(),
            degraded_closer: "Admitted.".to_string(),
            persist_degraded: false,
            proof_jobs: None,
        }
    }
}

impl SynthConfig {
    /// Restrict synthesis to the named lemmas.
    pub fn with_proof_jobs<I, S>(mut self, jobs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.proof_jobs = Some(jobs.into_iter().map(Into::into).collect());
        self
    }

    /// Set whether degraded lemmas are written.
    pub fn with_persist_degraded(mut self, persist: bool) -> Self {
        self.persist_degraded = persist;
        self
    }

    /// Set whether nested proofs are enabled in the session.
    pub fn with_nested_proofs(mut self, enabled: bool) -> Self {
        self.nested_proofs = enabled;
        self
    }

    /// Set the fallback closing tactic.
    pub fn with_closer(mut self, closer: impl Into<String>) -> Self {
        self.closer = closer.into();
        self
    }

    /// Set the output suffix.
    pub fn with_output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.output_suffix = suffix.into();
        self
    }

    /// Output path for `input`: `foo/bar.v` becomes `foo/bar-synthetic.v`.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        let stem = input.with_extension("");
        PathBuf::from(format!("{}{}", stem.display(), self.output_suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> SynthLemma {
        SynthLemma {
            name: SynthLemma::name_for(2, 5),
            params: vec![Hypothesis::new(["n"], "nat")],
            subgoals: vec![
                SubgoalHypothesis::new(0, "P 0"),
                SubgoalHypothesis::new(1, "forall (n : nat), P (S n)"),
            ],
            conclusion: "P n".to_string(),
            proof: "induction n; first [ eapply subgoal0; eassumption | eapply subgoal1; eassumption | auto ].".to_string(),
        }
    }

    #[test]
    fn test_statement_rendering() {
        assert_eq!(
            sample().statement(),
            "Lemma synth_lemma_2_5 (n : nat) (subgoal0 : P 0) (subgoal1 : forall (n : nat), P (S n)) : P n."
        );
    }

    #[test]
    fn test_buffer_layout() {
        let buffer = sample().buffer();
        assert_eq!(buffer.len(), 3);
        assert!(buffer.statement().unwrap().starts_with("Lemma synth_lemma_2_5"));
        assert_eq!(buffer.script().last().map(String::as_str), Some("Qed."));
    }

    #[test]
    fn test_statement_without_binders() {
        let lemma = SynthLemma {
            name: SynthLemma::name_for(0, 0),
            params: Vec::new(),
            subgoals: Vec::new(),
            conclusion: "True".to_string(),
            proof: "exact I; auto.".to_string(),
        };
        assert_eq!(lemma.statement(), "Lemma synth_lemma_0_0 : True.");
    }

    #[test]
    fn test_output_path() {
        let config = SynthConfig::default();
        assert_eq!(
            config.output_path(Path::new("theories/Arith.v")),
            PathBuf::from("theories/Arith-synthetic.v")
        );
    }

    #[test]
    fn test_commit_outcome_display_and_serde() {
        assert_eq!(CommitOutcome::Degraded.to_string(), "degraded");
        assert_eq!(
            serde_json::to_string(&CommitOutcome::Discarded).unwrap(),
            "\"discarded\""
        );
    }
}
