//! Case results, per-run aggregation and the serializable run artifact.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use xssbench_harness::{Engine, Outcome, Signals};
use xssbench_vectors::PayloadContext;

use crate::error::BenchError;

/// The terminal record for one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub sanitizer: String,
    pub engine: String,
    pub vector_id: String,
    pub context: PayloadContext,
    pub run_context: PayloadContext,
    pub outcome: Outcome,
    pub lossy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lossy_details: Option<String>,
    pub details: String,
    pub sanitized_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
    pub duration_ms: u64,
}

/// Per-sanitizer outcome tallies. `lossy` counts the orthogonal flag, so a
/// case can contribute to both `xss` and `lossy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub pass: u64,
    pub xss: u64,
    pub external: u64,
    pub skip: u64,
    pub error: u64,
    pub lossy: u64,
}

impl Tally {
    pub fn add(&mut self, result: &CaseResult) {
        match result.outcome {
            Outcome::Pass => self.pass += 1,
            Outcome::Xss => self.xss += 1,
            Outcome::External => self.external += 1,
            Outcome::Skip => self.skip += 1,
            Outcome::Error => self.error += 1,
        }
        if result.lossy {
            self.lossy += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.pass + self.xss + self.external + self.skip + self.error
    }
}

/// The serializable artifact for one engine's share of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifact {
    pub schema: String,
    pub engine: String,
    pub engine_version: String,
    pub started_at: String,
    pub finished_at: String,
    pub totals_by_sanitizer: BTreeMap<String, Tally>,
    pub cases: Vec<CaseResult>,
}

pub const ARTIFACT_SCHEMA: &str = "xssbench.run.v1";

impl RunArtifact {
    pub fn from_cases(
        engine: Engine,
        engine_version: String,
        started_at: String,
        finished_at: String,
        cases: Vec<CaseResult>,
    ) -> Self {
        let mut totals_by_sanitizer: BTreeMap<String, Tally> = BTreeMap::new();
        for case in &cases {
            totals_by_sanitizer
                .entry(case.sanitizer.clone())
                .or_default()
                .add(case);
        }
        Self {
            schema: ARTIFACT_SCHEMA.to_string(),
            engine: engine.to_string(),
            engine_version,
            started_at,
            finished_at,
            totals_by_sanitizer,
            cases,
        }
    }
}

/// Write artifacts to `--json-out`: a directory gets one file per engine,
/// a file path gets a single object (or an array for multi-engine runs).
pub fn write_artifacts(path: &Path, artifacts: &[RunArtifact]) -> Result<(), BenchError> {
    let treat_as_dir = path.extension().is_none() || path.is_dir();
    if treat_as_dir {
        std::fs::create_dir_all(path)?;
        for artifact in artifacts {
            let file = path.join(format!("xssbench-{}.json", artifact.engine));
            let mut text = serde_json::to_string_pretty(artifact)?;
            text.push('\n');
            std::fs::write(&file, text)?;
            tracing::info!(path = %file.display(), "wrote run artifact");
        }
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut text = match artifacts {
        [single] => serde_json::to_string_pretty(single)?,
        many => serde_json::to_string_pretty(many)?,
    };
    text.push('\n');
    std::fs::write(path, text)?;
    tracing::info!(path = %path.display(), "wrote run artifact");
    Ok(())
}

fn truncated(value: &str, limit: usize) -> String {
    let rendered = format!("{value:?}");
    if rendered.len() <= limit {
        return rendered;
    }
    let max = limit.saturating_sub(3);
    let cut = rendered
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= max)
        .last()
        .unwrap_or(0);
    format!("{}...", &rendered[..cut])
}

/// Print the human-readable run summary: notable cases first, then the
/// sanitizer × engine table.
pub fn print_summary<W: Write>(out: &mut W, artifacts: &[RunArtifact]) -> std::io::Result<()> {
    let all_cases: Vec<&CaseResult> = artifacts.iter().flat_map(|a| a.cases.iter()).collect();

    let sections: [(&str, Box<dyn Fn(&CaseResult) -> bool>); 3] = [
        ("XSS:", Box::new(|c: &CaseResult| c.outcome == Outcome::Xss)),
        ("Errors:", Box::new(|c: &CaseResult| c.outcome == Outcome::Error)),
        ("Lossy (expected tags stripped):", Box::new(|c: &CaseResult| c.lossy)),
    ];

    let mut printed_any = false;
    for (title, select) in &sections {
        let selected: Vec<&CaseResult> = all_cases.iter().copied().filter(|c| select(c)).collect();
        if selected.is_empty() {
            continue;
        }
        if printed_any {
            writeln!(out)?;
        }
        printed_any = true;
        writeln!(out, "{title}")?;
        for case in selected {
            writeln!(
                out,
                "- {} / {} / {} ({}): {}",
                case.sanitizer, case.engine, case.vector_id, case.context, case.details
            )?;
            if let Some(lossy_details) = &case.lossy_details {
                writeln!(out, "  lossy: {lossy_details}")?;
            }
            writeln!(out, "  sanitized_html={}", truncated(&case.sanitized_html, 400))?;
        }
    }
    if printed_any {
        writeln!(out)?;
    }

    let header = format!(
        "{:<22}  {:<8}  {:>6}  {:>8}  {:>6}  {:>6}  {:>7}  {:>6}  {:>5}",
        "sanitizer", "engine", "xss", "external", "lossy", "errors", "skipped", "pass", "total"
    );
    writeln!(out, "{header}")?;
    writeln!(out, "{}", "-".repeat(header.len()))?;
    for artifact in artifacts {
        for (sanitizer, tally) in &artifact.totals_by_sanitizer {
            writeln!(
                out,
                "{:<22}  {:<8}  {:>6}  {:>8}  {:>6}  {:>6}  {:>7}  {:>6}  {:>5}",
                sanitizer,
                artifact.engine,
                tally.xss,
                tally.external,
                tally.lossy,
                tally.error,
                tally.skip,
                tally.pass,
                tally.total()
            )?;
        }
    }
    Ok(())
}
