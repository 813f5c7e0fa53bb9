//! The proof-checking backend seam.

use crate::error::Result;

use super::types::{CommandOutcome, Obligation, ProofContext};

/// An interactive proof-checking session.
///
/// Sentences are executed one at a time against live, in-place state. A
/// rejected sentence must leave the session exactly as it was before the
/// call; the commit protocol relies on this to discard failed attempts.
pub trait ProofBackend {
    /// Execute one sentence.
    ///
    /// `Err` is reserved for transport failures; a sentence Coq refuses is
    /// `Ok(CommandOutcome::Rejected { .. })`.
    fn run(&mut self, sentence: &str) -> Result<CommandOutcome>;

    /// Current proof state, or `None` outside proof mode.
    fn goals(&mut self) -> Result<Option<ProofContext>>;

    /// Resolve a term to its elaborated type.
    fn check_type(&mut self, term: &str) -> Result<Option<String>>;

    /// The focused goal with its hypotheses.
    fn tactic_context(&mut self) -> Result<Option<Obligation>> {
        Ok(self.goals()?.and_then(|ctx| ctx.fg_goals.into_iter().next()))
    }

    /// Number of foreground goals.
    fn count_fg_goals(&mut self) -> Result<usize> {
        Ok(self.goals()?.map_or(0, |ctx| ctx.fg_goals.len()))
    }

    /// Whether a proof is open.
    fn in_proof(&mut self) -> Result<bool> {
        Ok(self.goals()?.is_some())
    }
}

impl<B: ProofBackend + ?Sized> ProofBackend for &mut B {
    fn run(&mut self, sentence: &str) -> Result<CommandOutcome> {
        (**self).run(sentence)
    }

    fn goals(&mut self) -> Result<Option<ProofContext>> {
        (**self).goals()
    }

    fn check_type(&mut self, term: &str) -> Result<Option<String>> {
        (**self).check_type(term)
    }
}
