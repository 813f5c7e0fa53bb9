//! Per-file driver writing `<stem>-synthetic.v`.
//!
//! The input is replayed sentence by sentence. Everything outside proofs is
//! copied to the output as is. For every selected proof the walker runs
//! first, writing its synthetic lemmas ahead of the proof; the proof is then
//! reset and replayed unchanged, so the output checks as a whole.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::coq::script::{
    lemma_name_from_statement, lemmas_in_script, sentence_body, split_sentences,
};
use crate::coq::{CommandOutcome, ProofBackend};
use crate::error::{Error, Result};
use crate::synth::{CommitOutcome, ProofWalker, ScopeTracker, SynthConfig, WalkReport};

const NESTED_PROOFS: &str = "Set Nested Proofs Allowed.";

/// Walk of one proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofWalk {
    pub lemma: String,
    pub report: WalkReport,
}

/// Counts over one script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthSummary {
    /// Proofs encountered, selected or not.
    pub proofs: usize,
    /// Proofs that were walked.
    pub walks: Vec<ProofWalk>,
}

impl SynthSummary {
    pub fn lemmas_walked(&self) -> usize {
        self.walks.len()
    }

    /// Synthetic lemmas that ended with `outcome`.
    pub fn count(&self, outcome: CommitOutcome) -> usize {
        self.walks.iter().map(|w| w.report.count(outcome)).sum()
    }

    /// Steps executed without a synthesis attempt.
    pub fn skipped_steps(&self) -> usize {
        self.walks.iter().map(|w| w.report.skipped).sum()
    }
}

/// Result of processing one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(flatten)]
    pub summary: SynthSummary,
}

/// Process `path` and write its synthetic counterpart next to it.
///
/// The input is read before the output file is truncated. `backend` is consumed and dropped on
/// every exit path, which tears the session down.
pub fn generate_synthetic_file<B: ProofBackend>(
    path: &Path,
    mut backend: B,
    config: &SynthConfig,
) -> Result<FileSummary> {
    let text = std::fs::read_to_string(path)?;
    let sentences = split_sentences(&text);
    let output = config.output_path(path);
    let mut out = BufWriter::new(File::create(&output)?);

    tracing::info!(
        file = %path.display(),
        output = %output.display(),
        sentences = sentences.len(),
        "Generating synthetic lemmas"
    );
    let summary = synthesize_script(&sentences, &mut backend, config, &mut out)?;
    out.flush()?;

    tracing::info!(
        file = %path.display(),
        walked = summary.lemmas_walked(),
        success = summary.count(CommitOutcome::Success),
        degraded = summary.count(CommitOutcome::Degraded),
        discarded = summary.count(CommitOutcome::Discarded),
        "Finished file"
    );

    Ok(FileSummary {
        input: path.to_path_buf(),
        output,
        summary,
    })
}

/// Replay `sentences`, writing the script with synthetic lemmas to `out`.
pub fn synthesize_script<B, W>(
    sentences: &[String],
    backend: &mut B,
    config: &SynthConfig,
    out: &mut W,
) -> Result<SynthSummary>
where
    B: ProofBackend + ?Sized,
    W: Write + ?Sized,
{
    let jobs: HashSet<String> = match &config.proof_jobs {
        Some(jobs) => jobs.iter().cloned().collect(),
        None => lemmas_in_script(sentences).into_iter().collect(),
    };

    if config.nested_proofs {
        run_checked(backend, NESTED_PROOFS)?;
    }

    let mut scope = ScopeTracker::new();
    let mut summary = SynthSummary::default();
    let mut pos = 0;

    while let Some(statement) =
        run_into_next_proof(backend, sentences, &mut pos, &mut scope, out)?
    {
        let lemma_index = summary.proofs;
        summary.proofs += 1;

        match lemma_name_from_statement(&statement) {
            Some(name) if jobs.contains(&name) => {
                tracing::info!(lemma = %name, index = lemma_index, "Walking proof");
                let visible = scope.visible_set();
                let report = ProofWalker::new(config, lemma_index).walk(
                    backend,
                    &sentences[pos..],
                    &visible,
                    out,
                )?;
                tracing::debug!(
                    lemma = %name,
                    state = %report.state,
                    lemmas = report.lemmas.len(),
                    "Walk finished"
                );

                run_checked(backend, &format!("Abort {}.", name))?;
                run_checked(backend, &sentence_body(&statement))?;
                summary.walks.push(ProofWalk { lemma: name, report });
            }
            name => {
                tracing::debug!(lemma = ?name, "Proof not selected");
            }
        }

        write!(out, "{}", statement)?;
        finish_proof(backend, sentences, &mut pos, out)?;
    }

    if scope.depth() > 0 {
        tracing::warn!(open = scope.depth(), "Sections still open at end of file");
    }
    Ok(summary)
}

/// Run sentences from `pos` until one opens a proof.
///
/// Every sentence except the one opening the proof is written to `out`.
/// Returns the opening sentence, or `None` when the script ends first.
pub fn run_into_next_proof<B, W>(
    backend: &mut B,
    sentences: &[String],
    pos: &mut usize,
    scope: &mut ScopeTracker,
    out: &mut W,
) -> Result<Option<String>>
where
    B: ProofBackend + ?Sized,
    W: Write + ?Sized,
{
    while let Some(sentence) = sentences.get(*pos) {
        *pos += 1;
        let body = sentence_body(sentence);
        if body.is_empty() {
            write!(out, "{}", sentence)?;
            continue;
        }
        run_checked(backend, &body)?;
        scope.observe(&body, backend)?;
        if backend.in_proof()? {
            return Ok(Some(sentence.clone()));
        }
        write!(out, "{}", sentence)?;
    }
    Ok(None)
}

/// Run and write sentences from `pos` until proof mode is left.
pub fn finish_proof<B, W>(
    backend: &mut B,
    sentences: &[String],
    pos: &mut usize,
    out: &mut W,
) -> Result<()>
where
    B: ProofBackend + ?Sized,
    W: Write + ?Sized,
{
    while let Some(sentence) = sentences.get(*pos) {
        *pos += 1;
        let body = sentence_body(sentence);
        if !body.is_empty() {
            run_checked(backend, &body)?;
        }
        write!(out, "{}", sentence)?;
        if !body.is_empty() && !backend.in_proof()? {
            return Ok(());
        }
    }
    tracing::warn!("Script ended inside a proof");
    Ok(())
}

fn run_checked<B: ProofBackend + ?Sized>(backend: &mut B, sentence: &str) -> Result<()> {
    match backend.run(sentence)? {
        CommandOutcome::Checked => Ok(()),
        CommandOutcome::Rejected { message } => Err(Error::backend(format!(
            "`{}` was rejected: {}",
            sentence, message
        ))),
    }
}
