//! # synth-core
//!
//! Synthetic sub-lemma extraction for Coq proof scripts.
//!
//! Every tactic step of a proof turns one goal into zero or more new goals.
//! This crate replays a `.v` file against a live Coq session and, for each
//! step, states the transformation as a standalone lemma: the goal before
//! the step is the conclusion, the goals it produced are hypotheses, and the
//! proof is the step itself followed by a generic closer. Lemmas that check
//! are written to `<file>-synthetic.v` ahead of the proof they came from.
//!
//! ## Core Components
//!
//! - **coq**: Backend trait, SerAPI client, script and term utilities
//! - **synth**: Differencing, statement building, commit protocol, walker
//! - **driver**: Per-file loop writing the synthetic output file
//! - **report**: Parallel tactic-prediction accuracy report
//!
//! ## Example
//!
//! ```rust,ignore
//! use synth_core::{generate_synthetic_file, SertopBackend, SertopConfig, SynthConfig};
//!
//! let backend = SertopBackend::spawn(SertopConfig::with_prelude("~/proj"))?;
//! let summary = generate_synthetic_file("Lists.v".as_ref(), backend, &SynthConfig::default())?;
//! println!("wrote {}", summary.output.display());
//! ```

pub mod coq;
pub mod driver;
pub mod error;
pub mod report;
pub mod synth;

// Re-exports for convenience
pub use coq::{
    CommandOutcome, Hypothesis, Obligation, ProofBackend, ProofContext, ScriptedBackend,
    SertopBackend, SertopConfig, Sexpr,
};
pub use driver::{
    generate_synthetic_file, synthesize_script, FileSummary, ProofWalk, SynthSummary,
};
pub use error::{Error, Result};
pub use report::{
    run_report, CommandPredictor, FileReport, PredictionContext, Report, ReportConfig,
    ReportTotals, TacticPredictor,
};
pub use synth::{
    CommitOutcome, LemmaBuilder, ProofBuffer, ProofWalker, ScopeTracker, SynthConfig, SynthLemma,
    WalkReport, WalkState,
};
