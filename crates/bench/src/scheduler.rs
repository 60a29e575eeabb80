//! The worker pool over (vector × sanitizer × engine) cases.
//!
//! Cases are dispensed from a shared FIFO queue; workers pull until it
//! drains. Cross-worker state is just the queue and the append-only result
//! list, each behind a lock held only for the enqueue/dequeue/append. No
//! lock ever spans a browser round-trip, so outcomes stay independent of
//! how cases interleave across workers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use xssbench_fidelity::check_fidelity;
use xssbench_harness::{classification_details, classify, Engine, Outcome, PreparedCase, Signals};
use xssbench_sanitizers::{AdapterStatus, Policy, SanitizerAdapter};
use xssbench_vectors::Vector;

use crate::error::BenchError;
use crate::report::{CaseResult, RunArtifact};
use crate::runner::{CaseRunner, RunnerFactory};

/// Hard wall clock for one case, covering the whole lifecycle. On expiry
/// the worker navigates away and records whatever signals were collected.
const CASE_WALL_CLOCK: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub workers: usize,
    /// Per-case post-load wait override; `None` selects the adaptive budget.
    pub timeout_ms: Option<u64>,
    pub fail_fast: bool,
    /// Progress line every N cases on stderr; 0 disables.
    pub progress_every: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout_ms: None,
            fail_fast: false,
            progress_every: 0,
        }
    }
}

struct QueuedCase {
    vector: Arc<Vector>,
    sanitizer: Arc<dyn SanitizerAdapter>,
    engine: Engine,
    attempt: u8,
}

struct Shared {
    queue: Mutex<VecDeque<QueuedCase>>,
    results: Mutex<Vec<CaseResult>>,
    versions: Mutex<HashMap<Engine, String>>,
    stop: AtomicBool,
    done: AtomicU64,
    xss_so_far: AtomicU64,
    errors_so_far: AtomicU64,
    total: u64,
    started: Instant,
    config: RunConfig,
    policy: Policy,
}

impl Shared {
    fn push_result(&self, result: CaseResult) {
        if self.config.fail_fast && result.outcome == Outcome::Xss {
            tracing::warn!(
                sanitizer = %result.sanitizer,
                vector = %result.vector_id,
                "fail-fast: first xss hit"
            );
            self.stop.store(true, Ordering::SeqCst);
        }
        self.report_progress(&result);
        self.results.lock().push(result);
    }

    fn report_progress(&self, result: &CaseResult) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        match result.outcome {
            Outcome::Xss => {
                self.xss_so_far.fetch_add(1, Ordering::SeqCst);
            }
            Outcome::Error => {
                self.errors_so_far.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        let every = self.config.progress_every;
        if every == 0 {
            return;
        }
        if done == 1 || done == self.total || done % every == 0 {
            eprintln!(
                "[{done}/{total}] {elapsed:.1}s  xss={xss}  errors={errors}  {sanitizer} / {engine} / {vector} ({context})",
                total = self.total,
                elapsed = self.started.elapsed().as_secs_f64(),
                xss = self.xss_so_far.load(Ordering::SeqCst),
                errors = self.errors_so_far.load(Ordering::SeqCst),
                sanitizer = result.sanitizer,
                engine = result.engine,
                vector = result.vector_id,
                context = result.context,
            );
        }
    }
}

/// What case preparation produced: either a result that needs no browser,
/// or a prepared case plus its (pure, pre-computed) fidelity verdict.
enum Presanitized {
    Immediate(Box<CaseResult>),
    Run {
        prepared: PreparedCase,
        lossy: bool,
        lossy_details: Option<String>,
    },
}

fn base_result(case: &QueuedCase) -> CaseResult {
    CaseResult {
        sanitizer: case.sanitizer.id().to_string(),
        engine: case.engine.to_string(),
        vector_id: case.vector.id.clone(),
        context: case.vector.context,
        run_context: case.vector.context,
        outcome: Outcome::Pass,
        lossy: false,
        lossy_details: None,
        details: String::new(),
        sanitized_html: String::new(),
        signals: None,
        duration_ms: 0,
    }
}

fn presanitize(policy: &Policy, case: &QueuedCase) -> Presanitized {
    let vector = &case.vector;

    if !case.sanitizer.supports_context(vector.context) {
        let mut result = base_result(case);
        result.outcome = Outcome::Skip;
        result.details = format!(
            "Skipped: {} does not support context {}",
            case.sanitizer.id(),
            vector.context
        );
        result.signals = Some(Signals::quiet(AdapterStatus::UnsupportedConfig));
        return Presanitized::Immediate(Box::new(result));
    }

    let (input, run_context) = vector.sanitizer_input();
    let policy = policy.with_extra_tags(&vector.sanitizer_allow_tags);
    let output = case.sanitizer.sanitize(&input, &policy);

    match output.status {
        AdapterStatus::UnsupportedConfig => {
            let mut result = base_result(case);
            result.outcome = Outcome::Skip;
            result.details = format!(
                "Skipped: {}",
                output.message.as_deref().unwrap_or("unsupported sanitizer configuration")
            );
            result.signals = Some(Signals::quiet(AdapterStatus::UnsupportedConfig));
            Presanitized::Immediate(Box::new(result))
        }
        AdapterStatus::AdapterError => {
            let mut result = base_result(case);
            result.outcome = Outcome::Error;
            result.details = format!(
                "Sanitizer error: {}",
                output.message.as_deref().unwrap_or("unknown adapter failure")
            );
            result.signals = Some(Signals::quiet(AdapterStatus::AdapterError));
            Presanitized::Immediate(Box::new(result))
        }
        AdapterStatus::Ok => {
            let fidelity = check_fidelity(&output.html, vector.expected_tags.as_deref());
            Presanitized::Run {
                prepared: PreparedCase {
                    vector_id: vector.id.clone(),
                    context: vector.context,
                    run_context,
                    payload_html: vector.payload_html.clone(),
                    sanitized_html: output.html,
                },
                lossy: fidelity.lossy,
                lossy_details: fidelity.details,
            }
        }
    }
}

/// Run the full matrix and aggregate one artifact per engine.
pub async fn run_bench(
    vectors: &[Vector],
    sanitizers: &[Arc<dyn SanitizerAdapter>],
    engines: &[Engine],
    config: RunConfig,
    factory: Arc<dyn RunnerFactory>,
) -> Result<Vec<RunArtifact>, BenchError> {
    let started_at = chrono::Utc::now().to_rfc3339();

    let shared_vectors: Vec<Arc<Vector>> = vectors.iter().cloned().map(Arc::new).collect();
    let mut queue = VecDeque::new();
    for engine in engines {
        for sanitizer in sanitizers {
            for vector in &shared_vectors {
                queue.push_back(QueuedCase {
                    vector: vector.clone(),
                    sanitizer: sanitizer.clone(),
                    engine: *engine,
                    attempt: 0,
                });
            }
        }
    }

    let total = queue.len() as u64;
    let worker_count = config.workers.clamp(1, total.max(1) as usize);

    let shared = Arc::new(Shared {
        queue: Mutex::new(queue),
        results: Mutex::new(Vec::with_capacity(total as usize)),
        versions: Mutex::new(HashMap::new()),
        stop: AtomicBool::new(false),
        done: AtomicU64::new(0),
        xss_so_far: AtomicU64::new(0),
        errors_so_far: AtomicU64::new(0),
        total,
        started: Instant::now(),
        config,
        policy: Policy::default(),
    });

    tracing::info!(total, workers = worker_count, "starting benchmark run");

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let shared = shared.clone();
        let factory = factory.clone();
        handles.push(tokio::spawn(worker_loop(worker_id, shared, factory)));
    }
    for handle in handles {
        // A worker panic is an infrastructure failure, not a case outcome.
        handle
            .await
            .map_err(|err| BenchError::NoEngines(format!("worker panicked: {err}")))?;
    }

    let finished_at = chrono::Utc::now().to_rfc3339();
    let results = std::mem::take(&mut *shared.results.lock());
    let versions = shared.versions.lock().clone();

    let mut artifacts = Vec::with_capacity(engines.len());
    for engine in engines {
        let cases: Vec<CaseResult> = results
            .iter()
            .filter(|r| r.engine == engine.to_string())
            .cloned()
            .collect();
        artifacts.push(RunArtifact::from_cases(
            *engine,
            versions.get(engine).cloned().unwrap_or_else(|| "unknown".into()),
            started_at.clone(),
            finished_at.clone(),
            cases,
        ));
    }
    Ok(artifacts)
}

async fn worker_loop(worker_id: usize, shared: Arc<Shared>, factory: Arc<dyn RunnerFactory>) {
    let mut runners: HashMap<Engine, Box<dyn CaseRunner>> = HashMap::new();

    loop {
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }
        let Some(case) = shared.queue.lock().pop_front() else {
            break;
        };

        let started = Instant::now();
        let run = match presanitize(&shared.policy, &case) {
            Presanitized::Immediate(result) => {
                shared.push_result(*result);
                continue;
            }
            Presanitized::Run { prepared, lossy, lossy_details } => (prepared, lossy, lossy_details),
        };
        let (prepared, lossy, lossy_details) = run;

        if !runners.contains_key(&case.engine) {
            match factory.create(case.engine).await {
                Ok(runner) => {
                    shared
                        .versions
                        .lock()
                        .entry(case.engine)
                        .or_insert_with(|| runner.engine_version());
                    runners.insert(case.engine, runner);
                }
                Err(err) => {
                    tracing::error!(worker_id, engine = %case.engine, %err, "browser unavailable");
                    let mut result = base_result(&case);
                    result.run_context = prepared.run_context;
                    result.outcome = Outcome::Error;
                    result.details = format!("Harness error: {err}");
                    result.sanitized_html = prepared.sanitized_html;
                    result.lossy = lossy;
                    result.lossy_details = lossy_details;
                    result.duration_ms = started.elapsed().as_millis() as u64;
                    shared.push_result(result);
                    continue;
                }
            }
        }
        let Some(runner) = runners.get_mut(&case.engine) else {
            continue;
        };

        let run_outcome = tokio::time::timeout(
            CASE_WALL_CLOCK,
            runner.run(&prepared, shared.config.timeout_ms),
        )
        .await;

        let signals = match run_outcome {
            Ok(Ok(signals)) => signals,
            // The wall clock expired mid-case: truncate signal collection
            // and classify from what was observed.
            Err(_) => runner.abort().await,
            Ok(Err(err)) if err.is_crash() => {
                tracing::warn!(worker_id, engine = %case.engine, vector = %case.vector.id, "browser context crashed");
                runners.remove(&case.engine);
                if case.attempt == 0 {
                    shared.queue.lock().push_back(QueuedCase {
                        attempt: 1,
                        ..case
                    });
                } else {
                    let mut result = base_result(&case);
                    result.run_context = prepared.run_context;
                    result.outcome = Outcome::Error;
                    result.details = "Harness error: browser context crashed twice".to_string();
                    result.sanitized_html = prepared.sanitized_html;
                    result.lossy = lossy;
                    result.lossy_details = lossy_details;
                    result.duration_ms = started.elapsed().as_millis() as u64;
                    shared.push_result(result);
                }
                continue;
            }
            Ok(Err(err)) => {
                let mut result = base_result(&case);
                result.run_context = prepared.run_context;
                result.outcome = Outcome::Error;
                result.details = format!("Harness error: {err}");
                result.sanitized_html = prepared.sanitized_html;
                result.lossy = lossy;
                result.lossy_details = lossy_details;
                result.duration_ms = started.elapsed().as_millis() as u64;
                shared.push_result(result);
                // Discard page state so the failure cannot leak forward.
                if runner.recycle().await.is_err() {
                    runners.remove(&case.engine);
                }
                continue;
            }
        };

        let outcome = classify(&signals);
        let details = classification_details(&signals);
        let mut result = base_result(&case);
        result.run_context = prepared.run_context;
        result.outcome = outcome;
        result.details = details;
        result.sanitized_html = prepared.sanitized_html;
        result.lossy = lossy;
        result.lossy_details = lossy_details;
        result.signals = Some(signals);
        result.duration_ms = started.elapsed().as_millis() as u64;
        shared.push_result(result);
    }
}
