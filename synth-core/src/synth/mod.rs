//! Synthetic sub-lemma extraction.
//!
//! For each tactic step of a proof, the engine computes what the step did
//! to the focused goal and states it as a standalone lemma: the goal before
//! the step is the conclusion, and every goal the step left behind becomes a
//! hypothesis. The lemma is replayed against the live session and only
//! written out once it checks.
//!
//! ## Components
//!
//! - **scope**: Section-level declarations already visible to every lemma
//! - **diff**: Hypotheses introduced between two proof states
//! - **generalize**: Variables consumed by `induction`/`destruct`
//! - **builder**: Statement and proof script of a synthetic lemma
//! - **commit**: Validate-or-discard replay against the backend
//! - **walker**: Per-proof driver tying the pieces together
//!
//! ## Example
//!
//! ```rust,ignore
//! use synth_core::synth::{ProofWalker, SynthConfig};
//!
//! let config = SynthConfig::default();
//! let report = ProofWalker::new(&config, 0).walk(&mut backend, &proof, &[], &mut out)?;
//! println!("{} lemmas", report.lemmas.len());
//! ```

pub mod builder;
pub mod commit;
pub mod diff;
pub mod generalize;
mod proptest;
pub mod scope;
pub mod types;
pub mod walker;

pub use builder::{mentions, LemmaBuilder, Step};
pub use commit::commit;
pub use diff::diff;
pub use generalize::GeneralizationTracker;
pub use scope::{ScopeFrame, ScopeTracker};
pub use types::{
    CommitOutcome, ProofBuffer, SubgoalHypothesis, SynthConfig, SynthLemma, DEFAULT_OUTPUT_SUFFIX,
};
pub use walker::{LemmaRecord, ProofWalker, WalkReport, WalkState};
