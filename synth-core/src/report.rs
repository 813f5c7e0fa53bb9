//! Tactic-prediction accuracy report over a set of files.
//!
//! Every file is replayed in its own backend session. Before each sentence
//! executed in proof mode, a predictor is asked for the next tactic given
//! the previous tactics, hypotheses and goal; exact matches are counted.
//! Files run in parallel on a bounded pool and their rows are reduced into
//! totals once every job has finished.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::coq::script::{normalize_whitespace, sentence_body, split_sentences};
use crate::coq::{CommandOutcome, Obligation, ProofBackend};
use crate::error::{Error, Result};

/// Default number of files processed at once.
pub const DEFAULT_THREADS: usize = 1;

/// Name of the report written to the output directory.
pub const REPORT_FILE: &str = "report.json";

/// Configuration for a report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Files processed concurrently.
    pub threads: usize,
    /// Directory receiving `report.json`.
    pub output_dir: PathBuf,
    /// Predictor command line, program first.
    pub predictor: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            threads: DEFAULT_THREADS,
            output_dir: PathBuf::from("report"),
            predictor: None,
        }
    }
}

impl ReportConfig {
    /// Set the worker count (at least one).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the predictor command line.
    pub fn with_predictor(mut self, command: impl Into<String>) -> Self {
        self.predictor = Some(command.into());
        self
    }
}

// ============================================================================
// Prediction
// ============================================================================

/// What a predictor sees before one tactic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionContext {
    /// Tactics already run in this proof, oldest first.
    pub prev_tactics: Vec<String>,
    /// Hypotheses of the focused goal, rendered `names : type`.
    pub hypotheses: Vec<String>,
    /// Focused goal text.
    pub goal: String,
}

impl PredictionContext {
    /// Build from the tactic history and the focused goal.
    pub fn new(prev_tactics: Vec<String>, focused: Option<&Obligation>) -> Self {
        let (hypotheses, goal) = match focused {
            Some(o) => (
                o.hypotheses.iter().map(ToString::to_string).collect(),
                o.goal.clone(),
            ),
            None => (Vec::new(), String::new()),
        };
        Self {
            prev_tactics,
            hypotheses,
            goal,
        }
    }

    /// Text handed to the predictor: tactics, `+++++`, hypotheses, `*****`, goal.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for tactic in &self.prev_tactics {
            out.push_str(tactic);
            out.push('\n');
        }
        out.push_str("+++++\n");
        for hyp in &self.hypotheses {
            out.push_str(hyp);
            out.push('\n');
        }
        out.push_str("*****\n");
        out.push_str(&self.goal);
        out.push('\n');
        out
    }
}

/// Something that proposes the next tactic.
pub trait TacticPredictor {
    /// Predict the next sentence, or `None` when there is no guess.
    fn predict(&mut self, context: &PredictionContext) -> Result<Option<String>>;
}

/// Runs an external program per query: context on stdin, prediction on the
/// first line of stdout.
#[derive(Debug, Clone)]
pub struct CommandPredictor {
    program: String,
    args: Vec<String>,
}

impl CommandPredictor {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a whitespace-separated command line.
    pub fn from_command_line(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("empty predictor command".to_string()))?;
        Ok(Self::new(program, parts))
    }
}

impl TacticPredictor for CommandPredictor {
    fn predict(&mut self, context: &PredictionContext) -> Result<Option<String>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::SubprocessComm(format!("failed to spawn {}: {}", self.program, e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(context.format().as_bytes()) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::SubprocessComm("predictor stdout unavailable".to_string()))?;
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line)?;

        let status = child.wait()?;
        if !status.success() {
            return Err(Error::SubprocessComm(format!(
                "{} exited with {}",
                self.program, status
            )));
        }

        let prediction = line.trim();
        Ok((!prediction.is_empty()).then(|| prediction.to_string()))
    }
}

// ============================================================================
// Rows and totals
// ============================================================================

/// Per-file row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file: PathBuf,
    /// Sentences executed in proof mode.
    pub tactics: usize,
    /// Sentences the predictor guessed exactly.
    pub correct: usize,
    /// Why the file could not be processed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    fn failed(file: PathBuf, error: impl Into<String>) -> Self {
        Self {
            file,
            tactics: 0,
            correct: 0,
            error: Some(error.into()),
        }
    }

    /// Percentage of tactics predicted, `None` when there were none.
    pub fn percent_correct(&self) -> Option<f64> {
        percent(self.correct, self.tactics)
    }
}

/// Sums over every row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportTotals {
    pub files: usize,
    pub failed_files: usize,
    pub tactics: usize,
    pub correct: usize,
}

impl ReportTotals {
    pub fn from_rows(rows: &[FileReport]) -> Self {
        rows.iter().fold(Self::default(), |mut acc, row| {
            acc.files += 1;
            acc.failed_files += usize::from(row.error.is_some());
            acc.tactics += row.tactics;
            acc.correct += row.correct;
            acc
        })
    }

    /// Overall percentage, `None` when no tactic was seen.
    pub fn accuracy(&self) -> Option<f64> {
        percent(self.correct, self.tactics)
    }
}

/// The report artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub accuracy: Option<f64>,
    pub totals: ReportTotals,
    pub files: Vec<FileReport>,
}

impl Report {
    pub fn new(files: Vec<FileReport>) -> Self {
        let totals = ReportTotals::from_rows(&files);
        Self {
            generated_at: Utc::now(),
            accuracy: totals.accuracy(),
            totals,
            files,
        }
    }

    /// Write `report.json` into `dir`, creating it if needed.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(REPORT_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

fn percent(correct: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| correct as f64 / total as f64 * 100.0)
}

// ============================================================================
// Running
// ============================================================================

/// Replay `files` on a pool of `config.threads` workers and write the report.
///
/// Each job builds its own backend and predictor from the factories. A file
/// that fails becomes a row with an error; it does not stop the others.
pub async fn run_report<B, P, FB, FP>(
    files: Vec<PathBuf>,
    backend_factory: FB,
    predictor_factory: FP,
    config: &ReportConfig,
) -> Result<Report>
where
    B: ProofBackend + 'static,
    P: TacticPredictor + 'static,
    FB: Fn(&Path) -> Result<B> + Send + Sync + 'static,
    FP: Fn() -> Result<P> + Send + Sync + 'static,
{
    let total = files.len();
    let semaphore = Arc::new(Semaphore::new(config.threads.max(1)));
    let backend_factory = Arc::new(backend_factory);
    let predictor_factory = Arc::new(predictor_factory);

    let mut jobs = JoinSet::new();
    for (index, file) in files.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let backend_factory = Arc::clone(&backend_factory);
        let predictor_factory = Arc::clone(&predictor_factory);

        jobs.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (index, FileReport::failed(file, e.to_string())),
            };
            tracing::info!(file = %file.display(), job = index + 1, total, "Processing file");

            let path = file.clone();
            let row = tokio::task::spawn_blocking(move || {
                report_file(&path, &*backend_factory, &*predictor_factory)
            })
            .await
            .unwrap_or_else(|e| FileReport::failed(file, format!("worker panicked: {}", e)));
            (index, row)
        });
    }

    let mut rows = Vec::with_capacity(total);
    while let Some(joined) = jobs.join_next().await {
        rows.push(joined.map_err(|e| Error::Internal(format!("report job failed: {}", e)))?);
    }
    rows.sort_by_key(|(index, _)| *index);

    let report = Report::new(rows.into_iter().map(|(_, row)| row).collect());
    let path = report.write_to(&config.output_dir)?;
    tracing::info!(
        path = %path.display(),
        tactics = report.totals.tactics,
        correct = report.totals.correct,
        "Report written"
    );
    Ok(report)
}

/// Replay one file, turning every failure into an error row.
fn report_file<B, P, FB, FP>(
    path: &Path,
    backend_factory: &FB,
    predictor_factory: &FP,
) -> FileReport
where
    B: ProofBackend,
    P: TacticPredictor,
    FB: Fn(&Path) -> Result<B>,
    FP: Fn() -> Result<P>,
{
    let result = (|| {
        let text = std::fs::read_to_string(path)?;
        let mut backend = backend_factory(path)?;
        let mut predictor = predictor_factory()?;
        replay(&split_sentences(&text), &mut backend, &mut predictor)
    })();

    match result {
        Ok((tactics, correct)) => FileReport {
            file: path.to_path_buf(),
            tactics,
            correct,
            error: None,
        },
        Err(e) => {
            tracing::warn!(file = %path.display(), error = %e, "File failed");
            FileReport::failed(path.to_path_buf(), e.to_string())
        }
    }
}

/// Returns `(tactics, correct)`.
fn replay<B, P>(sentences: &[String], backend: &mut B, predictor: &mut P) -> Result<(usize, usize)>
where
    B: ProofBackend + ?Sized,
    P: TacticPredictor + ?Sized,
{
    let mut prev_tactics: Vec<String> = Vec::new();
    let mut tactics = 0;
    let mut correct = 0;

    for sentence in sentences {
        let body = sentence_body(sentence);
        if body.is_empty() {
            continue;
        }

        match backend.goals()? {
            Some(ctx) => {
                tactics += 1;
                let context = PredictionContext::new(prev_tactics.clone(), ctx.focused());
                if let Some(prediction) = predictor.predict(&context)? {
                    if normalize_whitespace(&prediction) == normalize_whitespace(&body) {
                        correct += 1;
                    }
                }
                prev_tactics.push(body.clone());
            }
            None => prev_tactics.clear(),
        }

        if let CommandOutcome::Rejected { message } = backend.run(&body)? {
            return Err(Error::backend(format!("`{}` was rejected: {}", body, message)));
        }
    }

    Ok((tactics, correct))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coq::ScriptedBackend;
    use tempfile::tempdir;

    const PROOF: &str = "Lemma t : True.\nProof.\nexact I.\nQed.\n";

    struct Fixed(&'static str);

    impl TacticPredictor for Fixed {
        fn predict(&mut self, _context: &PredictionContext) -> Result<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    #[test]
    fn test_context_format() {
        let goal = Obligation::new("n + 0 = n").with_hyp("n : nat");
        let ctx = PredictionContext::new(vec!["intros n.".to_string()], Some(&goal));
        assert_eq!(ctx.format(), "intros n.\n+++++\nn : nat\n*****\nn + 0 = n\n");
    }

    #[test]
    fn test_replay_counts_proof_sentences() {
        let mut backend = ScriptedBackend::new();
        let (tactics, correct) =
            replay(&split_sentences(PROOF), &mut backend, &mut Fixed("exact  I.")).unwrap();
        // Proof., exact I. and Qed. run in proof mode.
        assert_eq!(tactics, 3);
        assert_eq!(correct, 1);
    }

    #[test]
    fn test_totals_and_accuracy() {
        let rows = vec![
            FileReport {
                file: "a.v".into(),
                tactics: 4,
                correct: 1,
                error: None,
            },
            FileReport::failed("b.v".into(), "boom"),
        ];
        let totals = ReportTotals::from_rows(&rows);
        assert_eq!(totals.files, 2);
        assert_eq!(totals.failed_files, 1);
        assert_eq!(totals.accuracy(), Some(25.0));
        assert_eq!(ReportTotals::default().accuracy(), None);
        assert_eq!(rows[1].percent_correct(), None);
    }

    #[test]
    fn test_empty_predictor_command_is_config_error() {
        assert!(matches!(
            CommandPredictor::from_command_line("   "),
            Err(Error::Config(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_predictor_reads_first_line() {
        let mut predictor = CommandPredictor::from_command_line("cat").unwrap();
        let ctx = PredictionContext {
            prev_tactics: vec!["intros n.".to_string()],
            ..Default::default()
        };
        assert_eq!(predictor.predict(&ctx).unwrap(), Some("intros n.".to_string()));
    }

    #[tokio::test]
    async fn test_run_report_reduces_rows_after_join() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.v");
        let b = dir.path().join("b.v");
        std::fs::write(&a, PROOF).unwrap();
        std::fs::write(&b, PROOF).unwrap();
        let missing = dir.path().join("missing.v");
        let out_dir = dir.path().join("report");

        let config = ReportConfig::default()
            .with_threads(2)
            .with_output_dir(&out_dir);
        let report = run_report(
            vec![a.clone(), missing.clone(), b.clone()],
            |_: &Path| Ok(ScriptedBackend::new()),
            || Ok(Fixed("exact I.")),
            &config,
        )
        .await
        .unwrap();

        let files: Vec<_> = report.files.iter().map(|r| r.file.clone()).collect();
        assert_eq!(files, vec![a, missing, b]);
        assert_eq!(report.totals.tactics, 6);
        assert_eq!(report.totals.correct, 2);
        assert_eq!(report.totals.failed_files, 1);
        assert!(report.files[1].error.is_some());

        let written: Report =
            serde_json::from_str(&std::fs::read_to_string(out_dir.join(REPORT_FILE)).unwrap())
                .unwrap();
        assert_eq!(written.totals, report.totals);
    }
}
