//! Validate-and-commit for synthesized lemmas.

use std::io::Write;

use crate::coq::{CommandOutcome, ProofBackend};
use crate::error::{Error, Result};

use super::types::{CommitOutcome, ProofBuffer, SynthConfig};

/// Replay `buffer` against `backend` and write it to `out` if it checks.
///
/// - Statement rejected: nothing is written and the session is untouched
///   (`Discarded`).
/// - A later sentence rejected: the lemma is closed with the degraded closer
///   so the session leaves the half-open lemma (`Degraded`). Nothing is
///   written unless `persist_degraded` is set, in which case the statement
///   and the degraded closer are.
/// - Everything accepted: every buffered sentence is written (`Success`).
///
/// The buffer is empty afterwards in every case. `Err` means the backend
/// failed or refused to close the lemma; the session state is then unknown.
pub fn commit<B, W>(
    buffer: &mut ProofBuffer,
    backend: &mut B,
    out: &mut W,
    config: &SynthConfig,
) -> Result<CommitOutcome>
where
    B: ProofBackend + ?Sized,
    W: Write + ?Sized,
{
    let Some(statement) = buffer.statement().map(str::to_string) else {
        return Ok(CommitOutcome::Discarded);
    };

    if let CommandOutcome::Rejected { message } = backend.run(&statement)? {
        tracing::debug!(statement = %statement, error = %message, "Synthetic statement rejected");
        buffer.clear();
        return Ok(CommitOutcome::Discarded);
    }

    let script = buffer.script().to_vec();
    for command in &script {
        if let CommandOutcome::Rejected { message } = backend.run(command)? {
            tracing::debug!(command = %command, error = %message, "Synthetic proof failed");
            return degrade(buffer, &statement, backend, out, config);
        }
    }

    for command in buffer.commands() {
        write!(out, "\n{}", command)?;
    }
    buffer.clear();
    Ok(CommitOutcome::Success)
}

fn degrade<B, W>(
    buffer: &mut ProofBuffer,
    statement: &str,
    backend: &mut B,
    out: &mut W,
    config: &SynthConfig,
) -> Result<CommitOutcome>
where
    B: ProofBackend + ?Sized,
    W: Write + ?Sized,
{
    buffer.clear();
    if let CommandOutcome::Rejected { message } = backend.run(&config.degraded_closer)? {
        return Err(Error::backend(format!(
            "could not close degraded lemma with `{}`: {}",
            config.degraded_closer, message
        )));
    }
    if config.persist_degraded {
        write!(out, "\n{}\n{}", statement, config.degraded_closer)?;
    }
    Ok(CommitOutcome::Degraded)
}
