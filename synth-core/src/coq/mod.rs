//! Coq proof-assistant integration.
//!
//! Everything the synthesis engine needs to talk to Coq lives here: the
//! backend trait, a SerAPI (`sertop`) client, an in-memory backend for
//! tests, sentence-level script utilities and kernel-term metrics.
//!
//! ## Components
//!
//! - **types**: Hypotheses, obligations, proof contexts and command outcomes
//! - **backend**: The `ProofBackend` trait every session implements
//! - **sertop**: SerAPI subprocess management
//! - **scripted**: Deterministic backend replaying registered transitions
//! - **script**: Sentence splitting and sentence classification
//! - **sexp**: S-expression reader and printer
//! - **term**: Size and identifier metrics over kernel terms

pub mod backend;
pub mod script;
pub mod scripted;
pub mod sertop;
pub mod sexp;
pub mod term;
pub mod types;

pub use backend::ProofBackend;
pub use scripted::ScriptedBackend;
pub use sertop::{parse_goal_listing, SertopBackend, SertopConfig};
pub use sexp::Sexpr;
pub use term::{gather_idents, ident_size, nested_size, TermShape};
pub use types::{CommandOutcome, Hypothesis, Obligation, ProofContext};
