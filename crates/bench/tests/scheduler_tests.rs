//! Scheduler behavior against scripted runners: no browser required.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use xssbench_bench::{run_bench, CaseRunner, RunConfig, RunnerFactory};
use xssbench_harness::{Engine, HarnessError, Outcome, PreparedCase, Signals};
use xssbench_sanitizers::{
    AdapterStatus, Policy, SanitizedOutput, SanitizerAdapter,
};
use xssbench_vectors::{PayloadContext, TagSpec, Vector};

type Script = Arc<dyn Fn(&PreparedCase) -> Signals + Send + Sync>;

struct ScriptedRunner {
    script: Script,
    calls: Arc<Mutex<Vec<PreparedCase>>>,
}

#[async_trait]
impl CaseRunner for ScriptedRunner {
    fn engine_version(&self) -> String {
        "FakeBrowser/1.0".into()
    }

    async fn run(
        &mut self,
        case: &PreparedCase,
        _timeout_ms: Option<u64>,
    ) -> Result<Signals, HarnessError> {
        self.calls.lock().push(case.clone());
        Ok((self.script)(case))
    }

    async fn abort(&mut self) -> Signals {
        Signals::quiet(AdapterStatus::Ok)
    }

    async fn recycle(&mut self) -> Result<(), HarnessError> {
        Ok(())
    }
}

struct ScriptedFactory {
    script: Script,
    calls: Arc<Mutex<Vec<PreparedCase>>>,
}

impl ScriptedFactory {
    fn new(script: impl Fn(&PreparedCase) -> Signals + Send + Sync + 'static) -> Self {
        Self {
            script: Arc::new(script),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn quiet() -> Self {
        Self::new(|_| Signals::quiet(AdapterStatus::Ok))
    }
}

#[async_trait]
impl RunnerFactory for ScriptedFactory {
    async fn create(&self, _engine: Engine) -> Result<Box<dyn CaseRunner>, HarnessError> {
        Ok(Box::new(ScriptedRunner {
            script: self.script.clone(),
            calls: self.calls.clone(),
        }))
    }
}

struct FnSanitizer {
    name: &'static str,
    contexts: Vec<PayloadContext>,
    transform: Box<dyn Fn(&str) -> String + Send + Sync>,
    inputs: Arc<Mutex<Vec<String>>>,
}

impl std::fmt::Debug for FnSanitizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSanitizer").field("name", &self.name).finish()
    }
}

impl FnSanitizer {
    fn identity(name: &'static str) -> Self {
        Self::with(name, PayloadContext::ALL.to_vec(), |html| html.to_string())
    }

    fn with(
        name: &'static str,
        contexts: Vec<PayloadContext>,
        transform: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            contexts,
            transform: Box::new(transform),
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl SanitizerAdapter for FnSanitizer {
    fn id(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "test sanitizer"
    }

    fn supported_contexts(&self) -> &[PayloadContext] {
        &self.contexts
    }

    fn sanitize(&self, html: &str, _policy: &Policy) -> SanitizedOutput {
        self.inputs.lock().push(html.to_string());
        SanitizedOutput::ok((self.transform)(html))
    }
}

fn html_vector(id: &str, payload: &str, expected: &[&str]) -> Vector {
    Vector {
        id: id.into(),
        description: String::new(),
        payload_html: payload.into(),
        context: PayloadContext::Html,
        expected_tags: Some(expected.iter().map(|s| TagSpec::parse(s).unwrap()).collect()),
        sanitizer_allow_tags: Vec::new(),
    }
}

fn xss_signals() -> Signals {
    let mut signals = Signals::quiet(AdapterStatus::Ok);
    signals.dialog_fired = true;
    signals.dialog_details = Some("alert:1".into());
    signals
}

#[tokio::test]
async fn counts_executed_cases() {
    let vectors = vec![
        html_vector("v1", "<img src=x onerror=1>", &["img[src]"]),
        html_vector("v2", "<b>ok</b>", &["b"]),
    ];
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(FnSanitizer::identity("noop"))];
    let factory = Arc::new(ScriptedFactory::new(|case| {
        if case.sanitized_html.contains("onerror") {
            xss_signals()
        } else {
            Signals::quiet(AdapterStatus::Ok)
        }
    }));

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    let artifact = &artifacts[0];
    assert_eq!(artifact.cases.len(), 2);
    assert_eq!(artifact.engine_version, "FakeBrowser/1.0");
    let tally = &artifact.totals_by_sanitizer["noop"];
    assert_eq!(tally.xss, 1);
    assert_eq!(tally.pass, 1);
    assert_eq!(tally.error, 0);
    assert_eq!(tally.lossy, 0);
    let xss: Vec<&str> = artifact
        .cases
        .iter()
        .filter(|c| c.outcome == Outcome::Xss)
        .map(|c| c.vector_id.as_str())
        .collect();
    assert_eq!(xss, vec!["v1"]);
}

#[tokio::test]
async fn external_script_takes_precedence_over_external_signal() {
    let vectors = vec![html_vector(
        "v1",
        r#"<script src="https://example.com/x.js"></script>"#,
        &[],
    )];
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(FnSanitizer::identity("noop"))];
    let factory = Arc::new(ScriptedFactory::new(|_| {
        let mut signals = Signals::quiet(AdapterStatus::Ok);
        signals.external_script_attempted = true;
        signals.external_script_url = Some("https://example.com/x.js".into());
        signals.non_script_external_attempt = true;
        signals.non_script_url = Some("image:https://example.com/x.png".into());
        signals
    }));

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    assert_eq!(artifacts[0].cases[0].outcome, Outcome::Xss);
}

#[tokio::test]
async fn skips_unsupported_contexts_without_invoking_the_sanitizer() {
    let vectors = vec![
        Vector {
            id: "v1".into(),
            description: String::new(),
            payload_html: "alert(1)".into(),
            context: PayloadContext::Js,
            expected_tags: None,
            sanitizer_allow_tags: Vec::new(),
        },
        html_vector("v2", "<b>ok</b>", &["b"]),
    ];
    let html_only = FnSanitizer::with(
        "htmlonly",
        vec![
            PayloadContext::Html,
            PayloadContext::HtmlHead,
            PayloadContext::HtmlOuter,
            PayloadContext::OnerrorAttr,
        ],
        |html| html.to_string(),
    );
    let inputs = html_only.inputs.clone();
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(html_only)];
    let factory = Arc::new(ScriptedFactory::quiet());

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    let by_id: std::collections::HashMap<&str, Outcome> = artifacts[0]
        .cases
        .iter()
        .map(|c| (c.vector_id.as_str(), c.outcome))
        .collect();
    assert_eq!(by_id["v1"], Outcome::Skip);
    assert_eq!(by_id["v2"], Outcome::Pass);
    // The js case never reached the adapter.
    assert_eq!(*inputs.lock(), vec!["<b>ok</b>".to_string()]);
}

#[tokio::test]
async fn href_payload_reaches_supporting_sanitizer_raw() {
    let vectors = vec![Vector {
        id: "v1".into(),
        description: String::new(),
        payload_html: "javascript:alert(1)".into(),
        context: PayloadContext::Href,
        expected_tags: None,
        sanitizer_allow_tags: Vec::new(),
    }];
    let sanitizer = FnSanitizer::with(
        "href-capable",
        vec![PayloadContext::Html, PayloadContext::Href],
        |_| "#".to_string(),
    );
    let inputs = sanitizer.inputs.clone();
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(sanitizer)];
    let factory = Arc::new(ScriptedFactory::quiet());
    let calls = factory.calls.clone();

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    assert_eq!(artifacts[0].cases[0].outcome, Outcome::Pass);
    assert_eq!(*inputs.lock(), vec!["javascript:alert(1)".to_string()]);
    let calls = calls.lock();
    assert_eq!(calls[0].run_context, PayloadContext::Href);
    assert_eq!(calls[0].sanitized_html, "#");
}

#[tokio::test]
async fn href_without_support_is_skipped_before_sanitizing() {
    let vectors = vec![Vector {
        id: "v1".into(),
        description: String::new(),
        payload_html: "javascript:alert(1)".into(),
        context: PayloadContext::Href,
        expected_tags: None,
        sanitizer_allow_tags: Vec::new(),
    }];
    let sanitizer = FnSanitizer::with("htmlonly", vec![PayloadContext::Html], |_| {
        r##"<a href="#">x</a>"##.to_string()
    });
    let inputs = sanitizer.inputs.clone();
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(sanitizer)];
    let factory = Arc::new(ScriptedFactory::quiet());
    let calls = factory.calls.clone();

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    assert_eq!(artifacts[0].cases[0].outcome, Outcome::Skip);
    assert!(inputs.lock().is_empty());
    assert!(calls.lock().is_empty());
}

#[tokio::test]
async fn onerror_attr_payload_is_wrapped_and_runs_as_html() {
    let vectors = vec![Vector {
        id: "v1".into(),
        description: String::new(),
        payload_html: "alert(1)".into(),
        context: PayloadContext::OnerrorAttr,
        expected_tags: Some(vec![TagSpec::parse("img[src]").unwrap()]),
        sanitizer_allow_tags: Vec::new(),
    }];
    let sanitizer = FnSanitizer::identity("noop");
    let inputs = sanitizer.inputs.clone();
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(sanitizer)];
    let factory = Arc::new(ScriptedFactory::quiet());
    let calls = factory.calls.clone();

    run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    assert_eq!(
        *inputs.lock(),
        vec![r#"<img src="nonexistent://x" onerror="alert(1)">"#.to_string()]
    );
    assert_eq!(calls.lock()[0].run_context, PayloadContext::Html);
}

#[tokio::test]
async fn js_payload_is_not_wrapped_before_sanitizing() {
    let vectors = vec![Vector {
        id: "v1".into(),
        description: String::new(),
        payload_html: "alert(1)".into(),
        context: PayloadContext::Js,
        expected_tags: None,
        sanitizer_allow_tags: Vec::new(),
    }];
    let sanitizer = FnSanitizer::identity("noop");
    let inputs = sanitizer.inputs.clone();
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(sanitizer)];
    let factory = Arc::new(ScriptedFactory::quiet());
    let calls = factory.calls.clone();

    run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    assert_eq!(*inputs.lock(), vec!["alert(1)".to_string()]);
    assert_eq!(calls.lock()[0].run_context, PayloadContext::Js);
}

#[tokio::test]
async fn fail_fast_stops_after_first_xss() {
    let vectors = vec![
        html_vector("v1", "<img src=x onerror=1>", &["img[src]"]),
        html_vector("v2", "<b>ok</b>", &["b"]),
    ];
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(FnSanitizer::identity("noop"))];
    let factory = Arc::new(ScriptedFactory::new(|_| xss_signals()));
    let calls = factory.calls.clone();

    let config = RunConfig {
        fail_fast: true,
        ..RunConfig::default()
    };
    let artifacts = run_bench(&vectors, &sanitizers, &[Engine::Chromium], config, factory)
        .await
        .unwrap();

    assert_eq!(artifacts[0].cases.len(), 1);
    assert_eq!(artifacts[0].cases[0].outcome, Outcome::Xss);
    assert_eq!(calls.lock().len(), 1);
}

#[tokio::test]
async fn missing_expected_tags_mark_lossy_but_case_still_runs() {
    let vectors = vec![html_vector("v1", "<b>keep</b>", &["b"])];
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(FnSanitizer::with(
        "stripper",
        PayloadContext::ALL.to_vec(),
        |_| "keep".to_string(),
    ))];
    let factory = Arc::new(ScriptedFactory::quiet());
    let calls = factory.calls.clone();

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    let case = &artifacts[0].cases[0];
    assert_eq!(case.outcome, Outcome::Pass);
    assert!(case.lossy);
    assert!(case.lossy_details.as_deref().unwrap().contains("Missing expected tags"));
    assert_eq!(calls.lock().len(), 1);
    assert_eq!(artifacts[0].totals_by_sanitizer["stripper"].lossy, 1);
}

#[tokio::test]
async fn empty_expected_tags_means_no_tags_allowed() {
    let vectors = vec![html_vector("v1", "<b>keep</b>", &[])];
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(FnSanitizer::with(
        "keeper",
        PayloadContext::ALL.to_vec(),
        |_| "<b>still here</b>".to_string(),
    ))];
    let factory = Arc::new(ScriptedFactory::quiet());

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    let case = &artifacts[0].cases[0];
    assert_eq!(case.outcome, Outcome::Pass);
    assert!(case.lossy);
    assert!(case.lossy_details.as_deref().unwrap().contains("Expected no tags"));
}

#[tokio::test]
async fn lossy_and_xss_can_co_occur() {
    let vectors = vec![html_vector("v1", "<b>expected</b>", &["b"])];
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(FnSanitizer::with(
        "mangler",
        PayloadContext::ALL.to_vec(),
        |_| "<img src=x onerror=1>".to_string(),
    ))];
    let factory = Arc::new(ScriptedFactory::new(|case| {
        if case.sanitized_html.contains("onerror") {
            xss_signals()
        } else {
            Signals::quiet(AdapterStatus::Ok)
        }
    }));

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    let case = &artifacts[0].cases[0];
    assert_eq!(case.outcome, Outcome::Xss);
    assert!(case.lossy);
    let tally = &artifacts[0].totals_by_sanitizer["mangler"];
    assert_eq!(tally.xss, 1);
    assert_eq!(tally.lossy, 1);
}

#[tokio::test]
async fn absent_expected_tags_skip_fidelity_entirely() {
    let vectors = vec![Vector {
        id: "v1".into(),
        description: String::new(),
        payload_html: "<b>ok</b>".into(),
        context: PayloadContext::Html,
        expected_tags: None,
        sanitizer_allow_tags: Vec::new(),
    }];
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(FnSanitizer::with(
        "stripper",
        PayloadContext::ALL.to_vec(),
        |_| String::new(),
    ))];
    let factory = Arc::new(ScriptedFactory::quiet());

    let artifacts = run_bench(
        &vectors,
        &sanitizers,
        &[Engine::Chromium],
        RunConfig::default(),
        factory,
    )
    .await
    .unwrap();

    let case = &artifacts[0].cases[0];
    assert!(!case.lossy);
    assert!(case.lossy_details.is_none());
}

#[tokio::test]
async fn results_are_independent_of_worker_count() {
    let vectors: Vec<Vector> = (0..12)
        .map(|i| {
            if i % 3 == 0 {
                html_vector(&format!("v{i}"), "<img src=x onerror=1>", &["img[src]"])
            } else {
                html_vector(&format!("v{i}"), "<b>ok</b>", &["b"])
            }
        })
        .collect();
    let sanitizers: Vec<Arc<dyn SanitizerAdapter>> = vec![Arc::new(FnSanitizer::identity("noop"))];

    let mut tallies = Vec::new();
    for workers in [1, 4] {
        let factory = Arc::new(ScriptedFactory::new(|case| {
            if case.sanitized_html.contains("onerror") {
                xss_signals()
            } else {
                Signals::quiet(AdapterStatus::Ok)
            }
        }));
        let config = RunConfig {
            workers,
            ..RunConfig::default()
        };
        let artifacts = run_bench(&vectors, &sanitizers, &[Engine::Chromium], config, factory)
            .await
            .unwrap();
        tallies.push(artifacts[0].totals_by_sanitizer["noop"]);
    }
    assert_eq!(tallies[0], tallies[1]);
}
