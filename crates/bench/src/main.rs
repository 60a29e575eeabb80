//! `xssbench` CLI: run hostile HTML vectors through sanitizer adapters
//! inside real headless browsers and report what executed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};

use xssbench_bench::{
    print_summary, run_bench, write_artifacts, BenchError, BrowserRunnerFactory, RunConfig,
};
use xssbench_harness::{Engine, Outcome};
use xssbench_sanitizers::{available_sanitizers, get_sanitizer, Policy, SanitizerAdapter};
use xssbench_vectors::load_vectors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BrowserChoice {
    Chromium,
    Firefox,
    Webkit,
    All,
}

/// Run XSS execution vectors in a real browser against one or more sanitizers.
#[derive(Parser, Debug)]
#[command(name = "xssbench", version, about)]
struct Cli {
    /// One or more vector JSON files (default: vectors/*.json)
    #[arg(long, num_args = 1..)]
    vectors: Option<Vec<PathBuf>>,

    /// Subset of sanitizer adapter ids to run (default: all built-ins)
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    sanitizers: Option<Vec<String>>,

    /// Browser engine to run in (default: all available)
    #[arg(long, value_enum, default_value = "all")]
    browser: BrowserChoice,

    /// Parallel workers, each owning its own browser per engine
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Per-case wait budget override in milliseconds (default: adaptive)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Write the run artifact(s) to a file or directory
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// List available sanitizer adapters and exit
    #[arg(long)]
    list_sanitizers: bool,

    /// Stop at the first xss outcome (debugging aid; exits 1)
    #[arg(long)]
    fail_fast: bool,

    /// Print progress every N cases (0 disables)
    #[arg(long, default_value_t = 25)]
    progress_every: u64,

    /// Disable progress output
    #[arg(long)]
    no_progress: bool,
}

fn default_vector_files() -> Result<Vec<PathBuf>, BenchError> {
    let dir = PathBuf::from("vectors");
    if !dir.is_dir() {
        return Err(BenchError::NoVectors);
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(BenchError::NoVectors);
    }
    Ok(files)
}

fn resolve_engines(choice: BrowserChoice) -> Result<Vec<Engine>, BenchError> {
    match choice {
        BrowserChoice::All => {
            let available: Vec<Engine> = Engine::ALL
                .into_iter()
                .filter(|engine| {
                    let ok = engine.is_available();
                    if !ok {
                        tracing::warn!(engine = engine.as_str(), "engine not available, skipping");
                    }
                    ok
                })
                .collect();
            if available.is_empty() {
                return Err(BenchError::NoEngines(
                    "none of chromium/firefox/webkit were found".into(),
                ));
            }
            Ok(available)
        }
        specific => {
            let engine = match specific {
                BrowserChoice::Chromium => Engine::Chromium,
                BrowserChoice::Firefox => Engine::Firefox,
                BrowserChoice::Webkit => Engine::Webkit,
                BrowserChoice::All => unreachable!("handled above"),
            };
            if !engine.is_available() {
                return Err(BenchError::NoEngines(format!(
                    "requested engine {engine} was not found; set {} to a binary",
                    engine.env_override()
                )));
            }
            Ok(vec![engine])
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, BenchError> {
    if cli.list_sanitizers {
        for sanitizer in available_sanitizers() {
            println!("{}: {}", sanitizer.id(), sanitizer.description());
        }
        return Ok(ExitCode::SUCCESS);
    }

    let vector_files = match &cli.vectors {
        Some(paths) => paths.clone(),
        None => default_vector_files()?,
    };
    let vectors = load_vectors(&vector_files)?;

    // Corpus invariants are checked before any case runs; measurement
    // integrity beats partial data.
    Policy::default().validate_expected_tags(&vectors)?;

    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = match &cli.sanitizers {
        None => available_sanitizers(),
        Some(names) => names
            .iter()
            .map(|name| get_sanitizer(name))
            .collect::<Result<_, _>>()?,
    };

    let engines = resolve_engines(cli.browser)?;

    let config = RunConfig {
        workers: cli.workers,
        timeout_ms: cli.timeout_ms,
        fail_fast: cli.fail_fast,
        progress_every: if cli.no_progress { 0 } else { cli.progress_every },
    };

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &engines,
        config,
        Arc::new(BrowserRunnerFactory),
    )
    .await?;

    let mut stdout = std::io::stdout().lock();
    print_summary(&mut stdout, &artifacts)?;

    if let Some(path) = &cli.json_out {
        write_artifacts(path, &artifacts)?;
    }

    let hit_xss = artifacts
        .iter()
        .flat_map(|a| a.cases.iter())
        .any(|c| c.outcome == Outcome::Xss);
    if cli.fail_fast && hit_xss {
        return Ok(ExitCode::from(1));
    }

    // Exit 0 whenever the harness ran to completion, whatever the counts.
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("xssbench: {err}");
            ExitCode::from(2)
        }
    }
}
