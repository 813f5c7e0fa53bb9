//! Step-by-step traversal of one proof.

use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::coq::script::{has_evar, is_focus_marker, is_proof_end, is_proof_start, sentence_body};
use crate::coq::{CommandOutcome, Hypothesis, Obligation, ProofBackend, ProofContext};
use crate::error::Result;

use super::builder::{LemmaBuilder, Step};
use super::commit::commit;
use super::generalize::GeneralizationTracker;
use super::types::{CommitOutcome, SynthConfig};

/// Where the walker is in a proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkState {
    /// Still executing proof sentences.
    AdvancingProof,
    /// An original sentence was rejected; the rest of the proof is skipped.
    BrokenSectionSkip,
    /// The proof has no goals left.
    Done,
}

impl std::fmt::Display for WalkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AdvancingProof => write!(f, "advancing_proof"),
            Self::BrokenSectionSkip => write!(f, "broken_section_skip"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Outcome of one synthesis attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LemmaRecord {
    pub name: String,
    pub step_index: usize,
    pub outcome: CommitOutcome,
}

/// Summary of one walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkReport {
    /// State the walk ended in.
    pub state: WalkState,
    /// Proof sentences executed.
    pub steps: usize,
    /// Executed sentences no lemma was attempted for.
    pub skipped: usize,
    /// Every attempted lemma, in step order.
    pub lemmas: Vec<LemmaRecord>,
}

impl WalkReport {
    fn new() -> Self {
        Self {
            state: WalkState::AdvancingProof,
            steps: 0,
            skipped: 0,
            lemmas: Vec::new(),
        }
    }

    /// Number of attempts that ended with `outcome`.
    pub fn count(&self, outcome: CommitOutcome) -> usize {
        self.lemmas.iter().filter(|l| l.outcome == outcome).count()
    }
}

/// Walks one open proof, synthesizing a lemma for every qualifying step.
///
/// The backend must be positioned right after the proof's statement. The
/// walker leaves the proof open; the caller resets it afterwards.
pub struct ProofWalker<'a> {
    config: &'a SynthConfig,
    builder: LemmaBuilder,
    lemma_index: usize,
}

impl<'a> ProofWalker<'a> {
    /// Create a walker for the proof at `lemma_index` in its file.
    pub fn new(config: &'a SynthConfig, lemma_index: usize) -> Self {
        Self {
            config,
            builder: LemmaBuilder::new(config.closer.clone()),
            lemma_index,
        }
    }

    /// Execute `commands` in order until the proof runs out of goals.
    ///
    /// `visible` holds the hypotheses already in scope from enclosing
    /// sections. Committed lemmas are written to `out`.
    pub fn walk<B, W>(
        &self,
        backend: &mut B,
        commands: &[String],
        visible: &[Hypothesis],
        out: &mut W,
    ) -> Result<WalkReport>
    where
        B: ProofBackend + ?Sized,
        W: Write + ?Sized,
    {
        let mut report = WalkReport::new();

        for (step_index, command) in commands.iter().enumerate() {
            let body = sentence_body(command);
            if body.is_empty() {
                continue;
            }
            if is_proof_end(&body) {
                report.state = WalkState::Done;
                break;
            }
            let Some(before_ctx) = backend.goals()? else {
                report.state = WalkState::Done;
                break;
            };

            if is_focus_marker(&body) || is_proof_start(&body) {
                if !self.execute(backend, &body, &mut report)? {
                    break;
                }
                report.skipped += 1;
                if finished(backend)? {
                    report.state = WalkState::Done;
                    break;
                }
                continue;
            }

            let Some(before) = before_ctx.focused().cloned() else {
                tracing::debug!(step = step_index, "No focused goal; executing without synthesis");
                if !self.execute(backend, &body, &mut report)? {
                    break;
                }
                report.skipped += 1;
                continue;
            };

            if !self.execute(backend, &body, &mut report)? {
                break;
            }

            if has_evar(&before.goal) {
                tracing::debug!(step = step_index, "Goal has an existential; skipping");
                report.skipped += 1;
                if finished(backend)? {
                    report.state = WalkState::Done;
                    break;
                }
                continue;
            }

            let (terminate_after, after_goals) = match backend.goals()? {
                Some(after) if !after.all_goals_empty() => {
                    (false, produced_goals(&before_ctx, after))
                }
                _ => (true, Vec::new()),
            };

            if after_goals.iter().any(|g| has_evar(&g.goal)) {
                tracing::debug!(step = step_index, "Resulting goal has an existential; skipping");
                report.skipped += 1;
            } else {
                self.synthesize(
                    backend,
                    step_index,
                    &body,
                    &before,
                    &after_goals,
                    visible,
                    out,
                    &mut report,
                )?;
            }

            if terminate_after {
                report.state = WalkState::Done;
                break;
            }
        }

        Ok(report)
    }

    /// Run an original proof sentence. Returns `false` when it was rejected.
    fn execute<B>(&self, backend: &mut B, body: &str, report: &mut WalkReport) -> Result<bool>
    where
        B: ProofBackend + ?Sized,
    {
        match backend.run(body)? {
            CommandOutcome::Checked => {
                report.steps += 1;
                Ok(true)
            }
            CommandOutcome::Rejected { message } => {
                tracing::warn!(
                    lemma = self.lemma_index,
                    command = %body,
                    error = %message,
                    "Proof sentence rejected; skipping rest of proof"
                );
                report.state = WalkState::BrokenSectionSkip;
                Ok(false)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn synthesize<B, W>(
        &self,
        backend: &mut B,
        step_index: usize,
        command: &str,
        before: &Obligation,
        after_goals: &[Obligation],
        visible: &[Hypothesis],
        out: &mut W,
        report: &mut WalkReport,
    ) -> Result<()>
    where
        B: ProofBackend + ?Sized,
        W: Write + ?Sized,
    {
        let generalized = GeneralizationTracker::track(command, &before.hypotheses);
        let step = Step {
            lemma_index: self.lemma_index,
            step_index,
            command,
            before,
            after_goals,
        };
        let lemma = self.builder.build(&step, visible, &generalized);
        let mut buffer = lemma.buffer();
        let outcome = commit(&mut buffer, backend, out, self.config)?;

        tracing::info!(
            lemma = %lemma.name,
            outcome = %outcome,
            subgoals = lemma.subgoals.len(),
            "Synthetic lemma"
        );
        report.lemmas.push(LemmaRecord {
            name: lemma.name,
            step_index,
            outcome,
        });
        Ok(())
    }
}

/// Whether the proof has no goals left anywhere.
fn finished<B: ProofBackend + ?Sized>(backend: &mut B) -> Result<bool> {
    Ok(backend.goals()?.map_or(true, |ctx| ctx.all_goals_empty()))
}

/// Goals produced by a step on the focused goal.
///
/// Sibling goals the step did not touch stay at the end of the foreground
/// list; they are not part of the step's result.
fn produced_goals(before: &ProofContext, after: ProofContext) -> Vec<Obligation> {
    let siblings = before.fg_goals.get(1..).unwrap_or_default();
    let mut goals = after.fg_goals;
    if !siblings.is_empty() && goals.ends_with(siblings) {
        goals.truncate(goals.len() - siblings.len());
    }
    goals
}
