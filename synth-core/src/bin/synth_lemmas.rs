use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use synth_core::coq::{SertopBackend, SertopConfig};
use synth_core::driver::generate_synthetic_file;
use synth_core::report::{run_report, CommandPredictor, ReportConfig, DEFAULT_THREADS};
use synth_core::synth::{CommitOutcome, SynthConfig};

#[derive(Parser)]
#[clap(
    name = "synth-lemmas",
    about = "Extract synthetic sub-lemmas from Coq proof scripts",
    version = env!("CARGO_PKG_VERSION")
)]
struct Args {
    /// Raise log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write `<file>-synthetic.v` next to every input file.
    Synth {
        /// Coq source files to process.
        #[clap(required = true)]
        files: Vec<PathBuf>,

        /// Directory containing the project's `_CoqProject`.
        #[clap(long)]
        prelude: Option<String>,

        /// Only walk the named proof. May be repeated.
        #[clap(long = "proof", conflicts_with = "proofs_file")]
        proofs: Vec<String>,

        /// File listing proof names to walk, one per line.
        #[clap(long)]
        proofs_file: Option<PathBuf>,

        /// Write `Admitted` statements for lemmas whose proof failed.
        #[clap(long)]
        persist_degraded: bool,
    },

    /// Replay files against a tactic predictor and write `report.json`.
    Report {
        /// Coq source files to replay.
        #[clap(required = true)]
        files: Vec<PathBuf>,

        /// Predictor command; receives the proof context on stdin.
        #[clap(long)]
        predictor: String,

        /// Number of files processed concurrently.
        #[clap(short = 'j', long, default_value_t = DEFAULT_THREADS)]
        threads: usize,

        /// Directory the report is written to.
        #[clap(short, long, default_value = "report")]
        output: PathBuf,

        /// Directory containing the project's `_CoqProject`.
        #[clap(long)]
        prelude: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).without_time())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let ok = match args.command {
        Command::Synth {
            files,
            prelude,
            proofs,
            proofs_file,
            persist_degraded,
        } => {
            let jobs = match proof_jobs(proofs, proofs_file.as_deref()) {
                Ok(jobs) => jobs,
                Err(e) => {
                    println!("Error reading proof list: {}", e);
                    std::process::exit(1);
                }
            };
            let mut config = SynthConfig::default().with_persist_degraded(persist_degraded);
            if let Some(jobs) = jobs {
                config = config.with_proof_jobs(jobs);
            }
            synth(&files, prelude, &config)
        }
        Command::Report {
            files,
            predictor,
            threads,
            output,
            prelude,
        } => {
            let config = ReportConfig::default()
                .with_threads(threads)
                .with_output_dir(output)
                .with_predictor(predictor);
            report(files, prelude, &config).await
        }
    };

    if !ok {
        std::process::exit(1);
    }
}

fn sertop_config(prelude: Option<String>) -> SertopConfig {
    match prelude {
        Some(dir) => SertopConfig::with_prelude(dir),
        None => SertopConfig::default(),
    }
}

/// Explicit proof names from the command line or a file, if any were given.
fn proof_jobs(
    proofs: Vec<String>,
    proofs_file: Option<&Path>,
) -> std::io::Result<Option<Vec<String>>> {
    if let Some(path) = proofs_file {
        let text = std::fs::read_to_string(path)?;
        let names = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        return Ok(Some(names));
    }
    Ok((!proofs.is_empty()).then_some(proofs))
}

fn synth(files: &[PathBuf], prelude: Option<String>, config: &SynthConfig) -> bool {
    let mut failed = 0;
    for file in files {
        let result = SertopBackend::spawn(sertop_config(prelude.clone()))
            .and_then(|backend| generate_synthetic_file(file, backend, config));
        match result {
            Ok(summary) => {
                println!(
                    "{}: {} proofs walked, {} lemmas written, {} degraded, {} discarded -> {}",
                    file.display(),
                    summary.summary.lemmas_walked(),
                    summary.summary.count(CommitOutcome::Success),
                    summary.summary.count(CommitOutcome::Degraded),
                    summary.summary.count(CommitOutcome::Discarded),
                    summary.output.display()
                );
            }
            Err(e) => {
                failed += 1;
                tracing::error!(file = %file.display(), error = %e, "File failed");
                println!("{}: failed: {}", file.display(), e);
            }
        }
    }
    if failed > 0 {
        println!("{} of {} files failed", failed, files.len());
    }
    failed == 0
}

async fn report(files: Vec<PathBuf>, prelude: Option<String>, config: &ReportConfig) -> bool {
    let Some(command) = config.predictor.clone() else {
        println!("No predictor command given");
        return false;
    };
    if let Err(e) = CommandPredictor::from_command_line(&command) {
        println!("Invalid predictor command: {}", e);
        return false;
    }

    let sertop = sertop_config(prelude);
    let result = run_report(
        files,
        move |_path: &Path| SertopBackend::spawn(sertop.clone()),
        move || CommandPredictor::from_command_line(&command),
        config,
    )
    .await;

    match result {
        Ok(report) => {
            for row in &report.files {
                if let Some(error) = &row.error {
                    println!("{}: failed: {}", row.file.display(), error);
                }
            }
            match report.accuracy {
                Some(accuracy) => println!(
                    "{} of {} tactics predicted ({:.1}%)",
                    report.totals.correct,
                    report.totals.tactics,
                    accuracy
                ),
                None => println!("No tactics replayed"),
            }
            report.totals.failed_files == 0
        }
        Err(e) => {
            println!("Report failed: {}", e);
            false
        }
    }
}
