//! SerAPI (`sertop`) subprocess management.
//!
//! This module provides the Rust interface to SerAPI, spawning `sertop` and
//! exchanging tagged S-expressions over stdin/stdout. One `SertopBackend`
//! lives for exactly one input file; dropping it tears the process down.
//!
//! See: https://github.com/ejgallego/coq-serapi

use crate::error::{Error, Result};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use super::backend::ProofBackend;
use super::script::{normalize_whitespace, sentence_body};
use super::sexp::Sexpr;
use super::types::{CommandOutcome, Hypothesis, Obligation, ProofContext};

/// Configuration for the `sertop` subprocess.
#[derive(Debug, Clone)]
pub struct SertopConfig {
    /// Path to the `sertop` executable.
    /// If None, `sertop` is looked up in PATH.
    pub sertop_path: Option<PathBuf>,

    /// Directory the session runs in (holds `_CoqProject` and compiled
    /// dependencies). `~` is expanded.
    pub prelude: Option<String>,

    /// Extra arguments passed to `sertop`.
    pub args: Vec<String>,

    /// Timeout for one request round-trip in milliseconds.
    pub timeout_ms: u64,

    /// Whether to log every request and answer.
    pub verbose: bool,
}

impl Default for SertopConfig {
    fn default() -> Self {
        Self {
            sertop_path: None,
            prelude: None,
            args: vec!["--implicit".to_string()],
            timeout_ms: 30_000,
            verbose: false,
        }
    }
}

impl SertopConfig {
    /// Create a new config running in a prelude directory.
    pub fn with_prelude(prelude: impl Into<String>) -> Self {
        Self {
            prelude: Some(prelude.into()),
            ..Default::default()
        }
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set verbose mode.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Add a `sertop` argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Resolve the prelude directory, expanding `~`.
    pub fn prelude_dir(&self) -> Option<PathBuf> {
        self.prelude
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

/// Handle to a running `sertop` subprocess.
pub struct SertopBackend {
    /// Child process handle.
    child: Child,
    /// Stdin writer; `None` once shut down.
    stdin: Option<ChildStdin>,
    /// Lines read from stdout by the reader thread.
    lines: Receiver<std::io::Result<String>>,
    /// Set once a request timed out; the process is killed on shutdown.
    timed_out: bool,
    /// Configuration.
    config: SertopConfig,
    /// Next request tag.
    next_tag: u64,
    /// State ids of executed sentences, oldest first.
    states: Vec<i64>,
}

/// Answers collected for one tagged request.
struct Exchange {
    answers: Vec<Sexpr>,
    feedback: Vec<Sexpr>,
}

impl Exchange {
    /// The first `CoqExn` answer, rendered as an error message.
    fn exception(&self) -> Option<String> {
        self.answers.iter().find_map(|a| {
            let exn = a.find_headed("CoqExn")?;
            let message = exn
                .keyed_strings("str")
                .last()
                .map(|s| normalize_whitespace(s))
                .unwrap_or_else(|| exn.to_string());
            Some(message)
        })
    }
}

impl SertopBackend {
    /// Spawn a new `sertop` subprocess.
    pub fn spawn(config: SertopConfig) -> Result<Self> {
        let mut cmd = Self::build_command(&config)?;

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd.spawn().map_err(|e| {
            Error::SubprocessComm(format!("Failed to spawn sertop subprocess: {}", e))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            Error::SubprocessComm("Failed to get stdin handle for sertop".to_string())
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::SubprocessComm("Failed to get stdout handle for sertop".to_string())
        })?;

        tracing::debug!(pid = child.id(), "sertop started");

        Ok(Self {
            child,
            stdin: Some(stdin),
            lines: spawn_reader(stdout),
            timed_out: false,
            config,
            next_tag: 0,
            states: Vec::new(),
        })
    }

    /// Build the command to spawn `sertop`.
    fn build_command(config: &SertopConfig) -> Result<Command> {
        let program = match config.sertop_path {
            Some(ref path) => path.clone(),
            None => which::which("sertop").map_err(|e| {
                Error::Config(format!("sertop not found in PATH: {}", e))
            })?,
        };

        let mut cmd = Command::new(program);
        cmd.args(&config.args);
        if let Some(dir) = config.prelude_dir() {
            cmd.current_dir(dir);
        }
        Ok(cmd)
    }

    /// Send a request and collect answers until `Completed`.
    fn request(&mut self, body: Sexpr) -> Result<Exchange> {
        let tag = format!("t{}", self.next_tag);
        self.next_tag += 1;
        let request = Sexpr::list([Sexpr::atom(tag.clone()), body]).to_string();

        if self.config.verbose {
            tracing::debug!("sertop request: {}", request);
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::SubprocessComm("sertop has been shut down".to_string()))?;
        writeln!(stdin, "{}", request).map_err(|e| {
            Error::SubprocessComm(format!("Failed to send request to sertop: {}", e))
        })?;
        stdin.flush().map_err(|e| {
            Error::SubprocessComm(format!("Failed to flush sertop stdin: {}", e))
        })?;

        let deadline = Instant::now() + Duration::from_millis(self.config.timeout_ms);
        let mut exchange = Exchange {
            answers: Vec::new(),
            feedback: Vec::new(),
        };

        loop {
            let line = next_line(&self.lines, deadline, self.config.timeout_ms);
            if matches!(line, Err(Error::Timeout { .. })) {
                self.timed_out = true;
            }
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if self.config.verbose {
                tracing::debug!("sertop answer: {}", line);
            }

            let message = Sexpr::parse(line)?;
            if message.head() == Some("Feedback") {
                exchange.feedback.push(message);
                continue;
            }
            if message.head() != Some("Answer") {
                continue;
            }

            let items = message.as_list().unwrap_or_default();
            let (Some(answer_tag), Some(payload)) = (items.get(1), items.get(2)) else {
                continue;
            };
            if answer_tag.as_text() != Some(tag.as_str()) {
                continue;
            }
            if payload.is_atom("Completed") {
                return Ok(exchange);
            }
            if !payload.is_atom("Ack") {
                exchange.answers.push(payload.clone());
            }
        }
    }

    /// Add a sentence, returning its state id or the rejection message.
    fn add(&mut self, sentence: &str) -> Result<std::result::Result<i64, String>> {
        let exchange = self.request(Sexpr::list([
            Sexpr::atom("Add"),
            Sexpr::list([]),
            Sexpr::string(sentence),
        ]))?;

        if let Some(message) = exchange.exception() {
            return Ok(Err(message));
        }

        let sid = exchange
            .answers
            .iter()
            .filter_map(|a| a.find_headed("Added"))
            .filter_map(|added| added.as_list()?.get(1)?.as_int())
            .last()
            .ok_or_else(|| Error::backend(format!("sertop did not add `{}`", sentence)))?;
        Ok(Ok(sid))
    }

    /// Cancel a state and everything after it.
    fn cancel(&mut self, sid: i64) -> Result<()> {
        let exchange = self.request(Sexpr::list([
            Sexpr::atom("Cancel"),
            Sexpr::list([Sexpr::Int(sid)]),
        ]))?;
        if let Some(message) = exchange.exception() {
            return Err(Error::backend(format!("Cancel {} failed: {}", sid, message)));
        }
        Ok(())
    }

    /// Check if the subprocess is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Number of sentences currently executed in the session.
    pub fn depth(&self) -> usize {
        self.states.len()
    }

    /// Shutdown the `sertop` subprocess.
    pub fn shutdown(&mut self) -> Result<()> {
        // Closing stdin makes sertop exit, unless it is stuck
        drop(self.stdin.take());
        if self.timed_out {
            let _ = self.child.kill();
        }
        let _ = self.child.wait();
        Ok(())
    }
}

impl ProofBackend for SertopBackend {
    fn run(&mut self, sentence: &str) -> Result<CommandOutcome> {
        let body = sentence_body(sentence);
        if body.is_empty() {
            return Ok(CommandOutcome::Checked);
        }

        let sid = match self.add(&body)? {
            Ok(sid) => sid,
            Err(message) => return Ok(CommandOutcome::Rejected { message }),
        };

        let exchange = self.request(Sexpr::list([Sexpr::atom("Exec"), Sexpr::Int(sid)]))?;
        if let Some(message) = exchange.exception() {
            self.cancel(sid)?;
            return Ok(CommandOutcome::Rejected { message });
        }

        self.states.push(sid);
        Ok(CommandOutcome::Checked)
    }

    fn goals(&mut self) -> Result<Option<ProofContext>> {
        let exchange = self.request(Sexpr::parse("(Query ((pp ((pp_format PpStr)))) Goals)")?)?;
        if let Some(message) = exchange.exception() {
            return Err(Error::backend(format!("Goals query failed: {}", message)));
        }

        for answer in &exchange.answers {
            let Some(objects) = answer.find_headed("ObjList") else {
                continue;
            };
            let listing = objects.keyed_strings("CoqString");
            return Ok(listing.first().map(|text| parse_goal_listing(text)));
        }
        Ok(None)
    }

    fn check_type(&mut self, term: &str) -> Result<Option<String>> {
        let vernac = format!("Check {}.", term.trim());
        let exchange = self.request(Sexpr::list([
            Sexpr::atom("Query"),
            Sexpr::list([]),
            Sexpr::list([Sexpr::atom("Vernac"), Sexpr::string(vernac)]),
        ]))?;

        if exchange.exception().is_some() {
            return Ok(None);
        }

        // The Check output is "term\n     : type"
        for message in &exchange.feedback {
            for text in message.keyed_strings("str") {
                if let Some(colon_pos) = text.find(':') {
                    let ty = normalize_whitespace(&text[colon_pos + 1..]);
                    if !ty.is_empty() {
                        return Ok(Some(ty));
                    }
                }
            }
        }
        Ok(None)
    }
}

impl Drop for SertopBackend {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Read stdout on its own thread so a silent `sertop` cannot block a
/// request past its deadline. The channel disconnects at end of stream.
fn spawn_reader(stdout: ChildStdout) -> Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut reader = BufReader::new(stdout);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    });
    rx
}

/// Next stdout line, waiting at most until `deadline`.
fn next_line(
    lines: &Receiver<std::io::Result<String>>,
    deadline: Instant,
    timeout_ms: u64,
) -> Result<String> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    match lines.recv_timeout(remaining) {
        Ok(Ok(line)) => Ok(line),
        Ok(Err(e)) => Err(Error::SubprocessComm(format!(
            "Failed to read from sertop: {}",
            e
        ))),
        Err(RecvTimeoutError::Timeout) => Err(Error::timeout(timeout_ms)),
        Err(RecvTimeoutError::Disconnected) => Err(Error::SubprocessComm(
            "sertop subprocess closed unexpectedly".to_string(),
        )),
    }
}

/// Parse SerAPI's `PpStr` goal listing.
///
/// Each goal is a block of hypothesis lines, a `====` separator and the
/// conclusion; blocks are separated by blank lines. Continuation lines of a
/// hypothesis or conclusion are indented. Goals introduced by a
/// `subgoal N is:` header are listed without hypotheses.
///
/// Once a focused block is finished Coq lists the remaining goals after an
/// "unfocused goals" notice; those land in `bg_goals`.
pub fn parse_goal_listing(text: &str) -> ProofContext {
    let mut fg_goals = Vec::new();
    let mut bg_goals = Vec::new();
    let mut unfocused = false;
    let mut hyp_lines: Vec<String> = Vec::new();
    let mut conclusion: Option<String> = None;

    let flush = |hyp_lines: &mut Vec<String>,
                 conclusion: &mut Option<String>,
                 goals: &mut Vec<Obligation>| {
        if let Some(goal) = conclusion.take() {
            let hypotheses: Vec<Hypothesis> =
                hyp_lines.iter().filter_map(|l| Hypothesis::parse(l)).collect();
            goals.push(Obligation {
                hypotheses,
                goal: normalize_whitespace(&goal),
            });
        }
        hyp_lines.clear();
    };

    for line in text.lines() {
        let trimmed = line.trim();
        let goals = if unfocused { &mut bg_goals } else { &mut fg_goals };

        if trimmed.is_empty() {
            if conclusion.as_deref().is_some_and(|g| !g.is_empty()) {
                flush(&mut hyp_lines, &mut conclusion, goals);
            }
            continue;
        }
        if let Some(notice) = listing_notice(trimmed) {
            flush(&mut hyp_lines, &mut conclusion, goals);
            if notice == Notice::Unfocused {
                unfocused = true;
            }
            continue;
        }
        if is_listing_header(trimmed) {
            flush(&mut hyp_lines, &mut conclusion, goals);
            if trimmed.ends_with("is:") {
                conclusion = Some(String::new());
            }
            continue;
        }
        if trimmed.len() >= 4 && trimmed.chars().all(|c| c == '=') {
            conclusion = Some(String::new());
            continue;
        }

        match conclusion {
            Some(ref mut goal) => {
                if !goal.is_empty() {
                    goal.push(' ');
                }
                goal.push_str(trimmed);
            }
            None => {
                let continues = Hypothesis::parse(trimmed).is_none();
                match hyp_lines.last_mut() {
                    Some(last) if continues => {
                        last.push(' ');
                        last.push_str(trimmed);
                    }
                    _ => hyp_lines.push(trimmed.to_string()),
                }
            }
        }
    }
    let goals = if unfocused { &mut bg_goals } else { &mut fg_goals };
    flush(&mut hyp_lines, &mut conclusion, goals);

    ProofContext::new(fg_goals).with_background(bg_goals)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notice {
    /// Goals listed after this line are unfocused.
    Unfocused,
    Other,
}

/// Status lines Coq prints around a goal listing.
fn listing_notice(line: &str) -> Option<Notice> {
    if line.contains("unfocused goals") {
        return Some(Notice::Unfocused);
    }
    const OTHER: [&str; 5] = [
        "No more goals",
        "No more subgoals",
        "Focus next goal",
        "There are shelved goals",
        "All the remaining goals are on the shelf",
    ];
    OTHER
        .iter()
        .any(|prefix| line.starts_with(prefix))
        .then_some(Notice::Other)
}

/// `2 goals`, `1 subgoal`, `goal 2 (ID 12) is:`, `subgoal 2 is:`
fn is_listing_header(line: &str) -> bool {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some(n), Some(w)) if n.chars().all(|c| c.is_ascii_digit()) => {
            matches!(w, "goal" | "goals" | "subgoal" | "subgoals")
        }
        (Some("goal" | "subgoal"), Some(_)) => line.ends_with("is:"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sertop_config_default() {
        let config = SertopConfig::default();
        assert!(config.sertop_path.is_none());
        assert_eq!(config.args, vec!["--implicit".to_string()]);
        assert_eq!(config.timeout_ms, 30_000);
    }

    #[test]
    fn test_sertop_config_with_prelude() {
        let config = SertopConfig::with_prelude("/path/to/project");
        assert_eq!(config.prelude_dir(), Some(PathBuf::from("/path/to/project")));
    }

    #[test]
    fn test_parse_goal_listing_two_goals() {
        let text = "2 goals\n\n  n : nat\n  IHn : n + 0 = n\n  ============================\n  S n + 0 = S n\n\n  m, k : nat\n  H : m = k\n  ============================\n  k = m\n";
        let ctx = parse_goal_listing(text);
        assert_eq!(ctx.fg_goals.len(), 2);
        assert_eq!(ctx.fg_goals[0].goal, "S n + 0 = S n");
        assert_eq!(ctx.fg_goals[0].hypotheses.len(), 2);
        assert_eq!(ctx.fg_goals[1].hypotheses[0].names, vec!["m", "k"]);
        assert_eq!(ctx.fg_goals[1].goal, "k = m");
    }

    #[test]
    fn test_parse_goal_listing_continuation_lines() {
        let text = "H : forall x : nat,\n    x = x\n============================\nforall y,\n  y = y";
        let ctx = parse_goal_listing(text);
        assert_eq!(ctx.fg_goals.len(), 1);
        assert_eq!(ctx.fg_goals[0].hypotheses[0].ty, "forall x : nat, x = x");
        assert_eq!(ctx.fg_goals[0].goal, "forall y, y = y");
    }

    #[test]
    fn test_parse_goal_listing_unfocused_goals_go_to_background() {
        let text = "This subproof is complete, but there are some unfocused goals.\n\ngoal 1 is:\n B\n";
        let ctx = parse_goal_listing(text);
        assert!(ctx.fg_goals.is_empty());
        assert_eq!(ctx.bg_goals.len(), 1);
        assert_eq!(ctx.bg_goals[0].goal, "B");
        assert!(!ctx.all_goals_empty());
    }

    #[test]
    fn test_parse_goal_listing_focus_hint_and_several_unfocused() {
        let text = "This subproof is complete, but there are some unfocused goals.\nFocus next goal with bullet -.\n\n2 goals\n\ngoal 1 (ID 14) is:\n B\n\ngoal 2 (ID 15) is:\n C /\\ D\n";
        let ctx = parse_goal_listing(text);
        assert!(ctx.fg_goals.is_empty());
        let goals: Vec<&str> = ctx.bg_goals.iter().map(|g| g.goal.as_str()).collect();
        assert_eq!(goals, vec!["B", "C /\\ D"]);
    }

    #[test]
    fn test_parse_goal_listing_no_more_goals() {
        let ctx = parse_goal_listing("No more goals.");
        assert!(ctx.all_goals_empty());
    }

    #[test]
    fn test_parse_goal_listing_subgoal_headers() {
        let text = "x : nat\n============================\nx = x\n\nsubgoal 2 is:\n True\n";
        let ctx = parse_goal_listing(text);
        assert_eq!(ctx.fg_goals.len(), 2);
        assert!(ctx.fg_goals[1].hypotheses.is_empty());
        assert_eq!(ctx.fg_goals[1].goal, "True");
    }

    #[test]
    fn test_next_line_times_out_while_sertop_is_silent() {
        let (tx, rx) = mpsc::channel::<std::io::Result<String>>();

        let deadline = Instant::now() + Duration::from_millis(20);
        let err = next_line(&rx, deadline, 20).unwrap_err();
        assert!(matches!(err, Error::Timeout { duration_ms: 20 }));

        tx.send(Ok("(Answer t0 Ack)\n".to_string())).unwrap();
        let deadline = Instant::now() + Duration::from_millis(1_000);
        assert_eq!(next_line(&rx, deadline, 1_000).unwrap(), "(Answer t0 Ack)\n");

        drop(tx);
        let err = next_line(&rx, deadline, 1_000).unwrap_err();
        assert!(matches!(err, Error::SubprocessComm(_)));
    }

    // Integration tests require SerAPI installed
    #[test]
    #[ignore = "requires sertop installed"]
    fn test_sertop_runs_a_proof() {
        let mut coq = SertopBackend::spawn(SertopConfig::default()).unwrap();
        assert!(coq.run("Lemma t : forall n : nat, n = n.").unwrap().is_checked());
        assert_eq!(coq.count_fg_goals().unwrap(), 1);
        assert!(!coq.run("bogus_tactic.").unwrap().is_checked());
        assert!(coq.run("intros n.").unwrap().is_checked());
        let ctx = coq.tactic_context().unwrap().unwrap();
        assert_eq!(ctx.goal, "n = n");
        assert!(coq.run("reflexivity.").unwrap().is_checked());
        assert!(coq.run("Qed.").unwrap().is_checked());
        assert!(!coq.in_proof().unwrap());
    }

    #[test]
    #[ignore = "requires sertop installed"]
    fn test_sertop_check_type() {
        let mut coq = SertopBackend::spawn(SertopConfig::default()).unwrap();
        assert_eq!(coq.check_type("O").unwrap(), Some("nat".to_string()));
    }
}
