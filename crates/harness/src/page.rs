//! Per-vector page lifecycle on one browser page.
//!
//! A `PageController` owns one page (one DevTools session) in one browser
//! process and runs cases against it sequentially. Pages are reused: reset
//! relies on the prelude's timer purge plus navigation discarding all DOM/JS
//! state, and the page is recreated outright every `REFRESH_EVERY` cases or
//! after an `error` outcome so nothing can carry over silently.
//!
//! Protocol events are consumed by a dispatcher task that answers paused
//! network requests and dialogs autonomously; the controller itself only
//! issues commands and reads the shared signal state. That split is what
//! lets `Page.navigate` resolve while the guard is still deciding the fate
//! of the document request it triggered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use base64::Engine as _;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use xssbench_sanitizers::AdapterStatus;
use xssbench_vectors::PayloadContext;

use crate::browser::BrowserProcess;
use crate::cdp::{CdpClient, CdpEvent};
use crate::classify::{filter_navigations, is_dangerous_url};
use crate::engine::Engine;
use crate::error::HarnessError;
use crate::signals::{DangerousUrlHit, Signals};
use crate::template::{render_document, BASE_URL};

pub const PRELUDE_JS: &str = include_str!("../js/prelude.js");
const DETECT_DANGEROUS_URLS_JS: &str = include_str!("../js/detect_dangerous_urls.js");
const TRIGGER_EVENTS_JS: &str = include_str!("../js/trigger_events.js");
const REQUEST_GESTURES_JS: &str = include_str!("../js/request_gestures.js");

const CLEANUP_EXPR: &str =
    "(() => { try { window.__xssbench && window.__xssbench.cleanup && window.__xssbench.cleanup(); } catch (e) {} })()";
const HOOK_EXPR: &str =
    "(window.__xssbench && window.__xssbench.executed) ? String(window.__xssbench.details || 'executed') : ''";

/// Navigation settle budget; a timeout truncates signal collection, it is
/// not an error.
const NAV_TIMEOUT: Duration = Duration::from_millis(5000);
const POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Recreate the page after this many cases even if nothing went wrong.
const REFRESH_EVERY: u32 = 50;

static ASYNC_TOKENS: &[&str] = &[
    "settimeout",
    "setinterval",
    "requestanimationframe",
    "promiseresolve",
    "new promise",
    "async ",
    "await ",
];

static EVENT_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bon(load|error)\s*=").unwrap());

/// Post-load wait budget for one case, in milliseconds.
///
/// Most vectors are synchronous and detected through the hook without any
/// waiting; only payloads that smell asynchronous get a real budget.
pub fn auto_timeout_ms(payload_html: &str, sanitized_html: &str) -> u64 {
    let blob = format!("{payload_html}\n{sanitized_html}").to_lowercase();

    if ASYNC_TOKENS.iter().any(|token| blob.contains(token)) {
        return 250;
    }
    if blob.contains("http-equiv") && blob.contains("refresh") {
        return 400;
    }
    if EVENT_ATTR_RE.is_match(&blob) {
        return 25;
    }
    0
}

/// One sanitized case, ready to render and run.
#[derive(Debug, Clone)]
pub struct PreparedCase {
    pub vector_id: String,
    /// The vector's declared context.
    pub context: PayloadContext,
    /// The context the composed document actually uses (`onerror_attr`
    /// wraps into `html` before sanitization).
    pub run_context: PayloadContext,
    pub payload_html: String,
    pub sanitized_html: String,
}

#[derive(Default)]
struct PageState {
    current_html: String,
    external_script_requests: Vec<String>,
    external_network_requests: Vec<(String, String)>,
    navigation_requests: Vec<String>,
    dialog_events: Vec<String>,
    base_navigation_count: u32,
    load_fired: bool,
}

impl PageState {
    fn reset(&mut self, html: String) {
        self.current_html = html;
        self.external_script_requests.clear();
        self.external_network_requests.clear();
        self.navigation_requests.clear();
        self.dialog_events.clear();
        self.base_navigation_count = 0;
        self.load_fired = false;
    }
}

fn is_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn is_same_origin(candidate: &str) -> bool {
    let (Ok(base), Ok(url)) = (url::Url::parse(BASE_URL), url::Url::parse(candidate)) else {
        return false;
    };
    url.scheme() == base.scheme()
        && url.host_str() == base.host_str()
        && url.port_or_known_default() == base.port_or_known_default()
}

/// Owns one page in one browser process and runs cases against it.
pub struct PageController {
    browser: BrowserProcess,
    target_id: String,
    session_id: String,
    state: Arc<Mutex<PageState>>,
    crashed: Arc<AtomicBool>,
    cases_since_refresh: u32,
}

impl PageController {
    pub async fn new(engine: Engine) -> Result<Self, HarnessError> {
        let (browser, events) = BrowserProcess::launch(engine).await?;
        let state = Arc::new(Mutex::new(PageState::default()));
        let crashed = Arc::new(AtomicBool::new(false));

        tokio::spawn(dispatch_events(
            events,
            browser.client.clone(),
            state.clone(),
            crashed.clone(),
        ));

        let (target_id, session_id) = open_page(&browser.client).await?;
        setup_session(&browser.client, &session_id).await?;

        Ok(Self {
            browser,
            target_id,
            session_id,
            state,
            crashed,
            cases_since_refresh: 0,
        })
    }

    pub fn engine(&self) -> Engine {
        self.browser.engine
    }

    pub fn engine_version(&self) -> &str {
        &self.browser.version
    }

    /// Whether the page should be recreated before the next case.
    pub fn needs_refresh(&self) -> bool {
        self.cases_since_refresh >= REFRESH_EVERY
    }

    /// Close and reopen the page (fresh target + session, prelude and guard
    /// re-armed). Used on the periodic refresh and after `error` outcomes.
    pub async fn recycle_page(&mut self) -> Result<(), HarnessError> {
        let _ = self
            .browser
            .client
            .call(None, "Target.closeTarget", json!({ "targetId": self.target_id }))
            .await;
        let (target_id, session_id) = open_page(&self.browser.client).await?;
        setup_session(&self.browser.client, &session_id).await?;
        self.target_id = target_id;
        self.session_id = session_id;
        self.cases_since_refresh = 0;
        Ok(())
    }

    /// Run one case through the full lifecycle and collect its signals.
    pub async fn run_case(
        &mut self,
        case: &PreparedCase,
        timeout_ms: Option<u64>,
    ) -> Result<Signals, HarnessError> {
        if self.crashed.load(Ordering::SeqCst) || self.browser.client.is_closed() {
            return Err(HarnessError::ContextCrash);
        }
        self.cases_since_refresh += 1;

        // Reset: purge timers the previous case may have scheduled, then
        // clear last-case signals and stage the new document.
        let _ = self.eval(CLEANUP_EXPR).await;
        self.state
            .lock()
            .reset(render_document(&case.sanitized_html, case.run_context));

        // Navigate; the guard fulfills the document request. A navigation
        // error here usually means the payload tore the load down, which is
        // itself signal.
        match self
            .call(
                "Page.navigate",
                json!({ "url": BASE_URL }),
            )
            .await
        {
            Err(err) if err.is_crash() => return Err(HarnessError::ContextCrash),
            Err(err) => tracing::debug!(vector = %case.vector_id, %err, "navigate did not settle"),
            Ok(_) => {}
        }
        self.wait_for_load().await;

        // Base-URL navigations recorded during the initial load belong to
        // the previous document's in-flight reloads, not this case.
        {
            let mut st = self.state.lock();
            st.navigation_requests.retain(|u| u != BASE_URL);
            if st.base_navigation_count < 1 {
                st.base_navigation_count = 1;
            }
        }

        // P1 before the event storm: a pure DOM inspection.
        let mut hits = self.detect_dangerous_urls().await;

        let mut expected_href_target = None;
        if !self.has_hard_signal(&hits) {
            if case.run_context == PayloadContext::Href {
                // Resolve the link target first so a plain navigation to it
                // is not misread as execution, then click for real.
                expected_href_target = self.resolved_link_target().await;
                self.click_selector("#xssbench-link").await;
            } else {
                self.run_event_probe().await;
                self.click_javascript_links().await;
                self.run_gesture_probe().await;
            }
        }

        // P1 again: the event storm may have written new attributes.
        if hits.is_empty() {
            hits = self.detect_dangerous_urls().await;
        }

        // Adaptive wait for deferred execution and late fetches.
        let wait_ms = timeout_ms
            .unwrap_or_else(|| auto_timeout_ms(&case.payload_html, &case.sanitized_html));
        let deadline = tokio::time::Instant::now() + Duration::from_millis(wait_ms);
        while !self.has_hard_signal(&hits) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Ok(self.collect_signals(hits, expected_href_target).await)
    }

    /// Collect whatever was observed so far, navigating away from the
    /// payload first. Used when the per-case wall clock expires mid-run.
    pub async fn abort_case(&mut self) -> Signals {
        let _ = self
            .call("Page.navigate", json!({ "url": "about:blank" }))
            .await;
        self.collect_signals(Vec::new(), None).await
    }

    fn call_client(&self) -> &CdpClient {
        &self.browser.client
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, HarnessError> {
        self.call_client()
            .call(Some(&self.session_id), method, params)
            .await
    }

    async fn eval(&self, expression: &str) -> Result<Value, HarnessError> {
        let result = self
            .call(
                "Runtime.evaluate",
                json!({ "expression": expression, "returnByValue": true }),
            )
            .await?;
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn wait_for_load(&self) {
        let deadline = tokio::time::Instant::now() + NAV_TIMEOUT;
        while !self.state.lock().load_fired && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    fn has_hard_signal(&self, hits: &[DangerousUrlHit]) -> bool {
        if !hits.is_empty() {
            return true;
        }
        let st = self.state.lock();
        !st.external_script_requests.is_empty() || !st.dialog_events.is_empty()
    }

    async fn read_hook(&self) -> Option<String> {
        match self.eval(HOOK_EXPR).await {
            Ok(Value::String(details)) if !details.is_empty() => Some(details),
            _ => None,
        }
    }

    async fn detect_dangerous_urls(&self) -> Vec<DangerousUrlHit> {
        match self.eval(DETECT_DANGEROUS_URLS_JS).await {
            Ok(value) => serde_json::from_value(value).unwrap_or_default(),
            Err(error) => {
                tracing::debug!(%error, "dangerous-url probe failed");
                Vec::new()
            }
        }
    }

    async fn run_event_probe(&self) {
        if let Err(error) = self.eval(TRIGGER_EVENTS_JS).await {
            // A destroyed context means the payload navigated mid-storm;
            // the navigation itself is already recorded by the guard.
            tracing::debug!(%error, "event probe did not complete");
        }
    }

    async fn run_gesture_probe(&self) {
        if let Err(error) = self.eval(REQUEST_GESTURES_JS).await {
            tracing::debug!(%error, "gesture probe did not complete");
        }
    }

    async fn resolved_link_target(&self) -> Option<String> {
        let expr = "(() => { const a = document.getElementById('xssbench-link'); return a ? String(a.href || '') : ''; })()";
        match self.eval(expr).await {
            Ok(Value::String(target)) if !target.is_empty() => Some(target),
            _ => None,
        }
    }

    /// Click an element with a trusted input event (some `javascript:`
    /// activations require a real gesture, not a synthetic `click()`).
    async fn click_selector(&self, selector: &str) {
        let expr = format!(
            "(() => {{ const el = document.querySelector('{selector}'); if (!el) return null; \
             el.scrollIntoView({{ block: 'center' }}); const r = el.getBoundingClientRect(); \
             return {{ x: r.x + r.width / 2, y: r.y + r.height / 2 }}; }})()"
        );
        let Ok(value) = self.eval(&expr).await else { return };
        let (Some(x), Some(y)) = (
            value.get("x").and_then(Value::as_f64),
            value.get("y").and_then(Value::as_f64),
        ) else {
            return;
        };
        self.trusted_click(x, y).await;
    }

    async fn trusted_click(&self, x: f64, y: f64) {
        for kind in ["mousePressed", "mouseReleased"] {
            let _ = self
                .call(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": kind,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "buttons": 1,
                        "clickCount": 1,
                    }),
                )
                .await;
        }
    }

    /// Give every surviving `javascript:` link a trusted click. Hidden
    /// links get a synthetic click inside the page instead.
    async fn click_javascript_links(&self) {
        let expr = r#"(() => {
            const out = [];
            for (const el of document.querySelectorAll("a[href], area[href]")) {
                let href = "";
                try { href = String(el.href || el.getAttribute("href") || ""); } catch (e) {}
                const v = href.replace(/\u0000/g, "").trim().toLowerCase();
                if (!v.startsWith("javascript:")) continue;
                const r = el.getBoundingClientRect();
                if (r.width > 0 && r.height > 0) {
                    out.push({ x: r.x + r.width / 2, y: r.y + r.height / 2 });
                } else {
                    try { el.click(); } catch (e) {}
                }
            }
            return out;
        })()"#;
        let Ok(value) = self.eval(expr).await else { return };
        let Some(points) = value.as_array() else { return };
        for point in points {
            let (Some(x), Some(y)) = (
                point.get("x").and_then(Value::as_f64),
                point.get("y").and_then(Value::as_f64),
            ) else {
                continue;
            };
            self.trusted_click(x, y).await;
        }
    }

    async fn collect_signals(
        &self,
        hits: Vec<DangerousUrlHit>,
        expected_href_target: Option<String>,
    ) -> Signals {
        let hook = self.read_hook().await;

        let (script_requests, network_requests, navigations, dialog_events) = {
            let st = self.state.lock();
            (
                st.external_script_requests.clone(),
                st.external_network_requests.clone(),
                st.navigation_requests.clone(),
                st.dialog_events.clone(),
            )
        };

        let filtered_navs = filter_navigations(&navigations, expected_href_target.as_deref());
        let dangerous_navigation_url = filtered_navs.iter().find(|u| is_dangerous_url(u)).cloned();

        let dialog_fired = hook.is_some() || !dialog_events.is_empty();
        let dialog_details = hook.or_else(|| dialog_events.first().cloned());

        let external_script_url = script_requests.first().cloned();

        // Blocked non-script fetches first; failing that, a blocked
        // navigation to an external document is still an external attempt.
        let non_script_url = network_requests
            .first()
            .map(|(resource_type, url)| format!("{resource_type}:{url}"))
            .or_else(|| {
                filtered_navs
                    .iter()
                    .find(|u| is_http(u) && !is_same_origin(u))
                    .map(|u| format!("document:{u}"))
            });

        Signals {
            adapter_status: AdapterStatus::Ok,
            dialog_fired,
            dialog_details,
            external_script_attempted: external_script_url.is_some(),
            external_script_url,
            non_script_external_attempt: non_script_url.is_some(),
            non_script_url,
            dangerous_url_hits: hits,
            navigation_occurred: !filtered_navs.is_empty(),
            dangerous_navigation_url,
        }
    }
}

async fn open_page(client: &CdpClient) -> Result<(String, String), HarnessError> {
    let created = client
        .call(None, "Target.createTarget", json!({ "url": "about:blank" }))
        .await?;
    let target_id = created
        .get("targetId")
        .and_then(Value::as_str)
        .ok_or_else(|| HarnessError::Protocol {
            method: "Target.createTarget".into(),
            message: "missing targetId".into(),
        })?
        .to_string();

    let attached = client
        .call(
            None,
            "Target.attachToTarget",
            json!({ "targetId": target_id, "flatten": true }),
        )
        .await?;
    let session_id = attached
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| HarnessError::Protocol {
            method: "Target.attachToTarget".into(),
            message: "missing sessionId".into(),
        })?
        .to_string();

    Ok((target_id, session_id))
}

/// Arm one session: page + runtime domains, the prelude as an init script
/// (reaches every frame, srcdoc subdocuments included), and the network
/// guard. The guard must be enabled before the first navigation so early
/// resources like `<script src>` in the initial HTML are caught.
async fn setup_session(client: &CdpClient, session_id: &str) -> Result<(), HarnessError> {
    let session = Some(session_id);
    client.call(session, "Page.enable", json!({})).await?;
    client.call(session, "Runtime.enable", json!({})).await?;
    client
        .call(
            session,
            "Page.addScriptToEvaluateOnNewDocument",
            json!({ "source": PRELUDE_JS }),
        )
        .await?;
    client
        .call(
            session,
            "Fetch.enable",
            json!({ "patterns": [{ "urlPattern": "*" }] }),
        )
        .await?;
    Ok(())
}

/// Consume protocol events for one browser connection: answer paused
/// requests and dialogs, record navigations, flag crashes.
async fn dispatch_events(
    mut events: mpsc::UnboundedReceiver<CdpEvent>,
    client: CdpClient,
    state: Arc<Mutex<PageState>>,
    crashed: Arc<AtomicBool>,
) {
    while let Some(event) = events.recv().await {
        let session = event.session_id.as_deref();
        match event.method.as_str() {
            "Fetch.requestPaused" => {
                handle_request_paused(&client, &state, session, &event.params).await;
            }
            "Page.javascriptDialogOpening" => {
                let dialog_type = event.params.get("type").and_then(Value::as_str).unwrap_or("");
                let message = event.params.get("message").and_then(Value::as_str).unwrap_or("");
                state
                    .lock()
                    .dialog_events
                    .push(format!("dialog:{dialog_type}:{message}"));
                // Always answer dialogs; an unanswered one deadlocks the page.
                let params = if dialog_type == "prompt" {
                    json!({ "accept": true, "promptText": "" })
                } else {
                    json!({ "accept": true })
                };
                let _ = client
                    .call(session, "Page.handleJavaScriptDialog", params)
                    .await;
            }
            "Page.frameNavigated" => {
                let url = event
                    .params
                    .get("frame")
                    .and_then(|f| f.get("url"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                record_navigation(&state, url);
            }
            "Page.loadEventFired" | "Page.domContentEventFired" => {
                state.lock().load_fired = true;
            }
            "Inspector.targetCrashed" | "Target.targetCrashed" => {
                tracing::warn!("browser target crashed");
                crashed.store(true, Ordering::SeqCst);
            }
            _ => {}
        }
    }
    // The event stream only ends when the connection does.
    crashed.store(true, Ordering::SeqCst);
}

fn record_navigation(state: &Arc<Mutex<PageState>>, url: &str) {
    if url.is_empty() {
        return;
    }
    let mut st = state.lock();
    if url.starts_with(&format!("{BASE_URL}#")) {
        return;
    }
    if url == BASE_URL {
        // The first base navigation is the harness's own load; repeats are
        // payload-induced reloads.
        st.base_navigation_count += 1;
        if st.base_navigation_count > 1 {
            st.navigation_requests.push(url.to_string());
        }
        return;
    }
    st.navigation_requests.push(url.to_string());
}

/// The network guard: the synthetic document is served, everything else is
/// blocked before any socket connects and recorded by kind.
async fn handle_request_paused(
    client: &CdpClient,
    state: &Arc<Mutex<PageState>>,
    session: Option<&str>,
    params: &Value,
) {
    let request_id = params
        .get("requestId")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let url = params
        .get("request")
        .and_then(|r| r.get("url"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let resource_type = params
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or("Other")
        .to_string();

    let document_body = {
        let mut st = state.lock();
        if resource_type == "Document" && url == BASE_URL {
            Some(st.current_html.clone())
        } else {
            if resource_type == "Document" {
                // Payload-induced navigation; recorded, never followed.
                st.navigation_requests.push(url.clone());
            } else if resource_type == "Script" && is_http(&url) {
                st.external_script_requests.push(url.clone());
            } else if is_http(&url) && !is_same_origin(&url) {
                st.external_network_requests
                    .push((resource_type.to_ascii_lowercase(), url.clone()));
            }
            None
        }
    };

    match document_body {
        Some(body) => {
            let encoded = base64::engine::general_purpose::STANDARD.encode(body);
            let _ = client
                .call(
                    session,
                    "Fetch.fulfillRequest",
                    json!({
                        "requestId": request_id,
                        "responseCode": 200,
                        "responseHeaders": [
                            { "name": "Content-Type", "value": "text/html; charset=utf-8" }
                        ],
                        "body": encoded,
                    }),
                )
                .await;
        }
        None => {
            let _ = client
                .call(
                    session,
                    "Fetch.failRequest",
                    json!({ "requestId": request_id, "errorReason": "BlockedByClient" }),
                )
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn async_payloads_get_a_real_wait_budget() {
        assert_eq!(auto_timeout_ms("setTimeout(alert, 50)", ""), 250);
        assert_eq!(auto_timeout_ms("", "new Promise(r => r())"), 250);
        assert_eq!(auto_timeout_ms("await fetch('/x')", ""), 250);
    }

    #[test]
    fn meta_refresh_gets_the_longest_budget() {
        assert_eq!(
            auto_timeout_ms(r#"<meta http-equiv="refresh" content="0; url=/x">"#, ""),
            400
        );
    }

    #[test]
    fn event_attribute_payloads_get_a_beat() {
        assert_eq!(auto_timeout_ms("<img src=x onerror=alert(1)>", ""), 25);
        assert_eq!(auto_timeout_ms("<body onload = alert(1)>", ""), 25);
    }

    #[test]
    fn synchronous_payloads_do_not_wait() {
        assert_eq!(auto_timeout_ms("<script>alert(1)</script>", ""), 0);
        assert_eq!(auto_timeout_ms("<b>hi</b>", "<b>hi</b>"), 0);
    }

    #[test]
    fn same_origin_matches_scheme_and_host() {
        assert!(is_same_origin("http://xssbench.local/"));
        assert!(is_same_origin("http://xssbench.local/favicon.ico"));
        assert!(!is_same_origin("https://xssbench.local/"));
        assert!(!is_same_origin("http://evil.example/"));
        assert!(!is_same_origin("javascript:alert(1)"));
    }

    #[test]
    fn base_navigation_counting_ignores_first_load() {
        let state = Arc::new(Mutex::new(PageState::default()));
        record_navigation(&state, BASE_URL);
        assert!(state.lock().navigation_requests.is_empty());
        record_navigation(&state, BASE_URL);
        assert_eq!(state.lock().navigation_requests, vec![BASE_URL.to_string()]);
    }

    #[test]
    fn hash_navigations_on_base_are_ignored() {
        let state = Arc::new(Mutex::new(PageState::default()));
        record_navigation(&state, &format!("{BASE_URL}#xssbench"));
        assert!(state.lock().navigation_requests.is_empty());
        assert_eq!(state.lock().base_navigation_count, 0);
    }

    #[test]
    fn foreign_navigations_are_recorded() {
        let state = Arc::new(Mutex::new(PageState::default()));
        record_navigation(&state, "https://evil.example/next");
        record_navigation(&state, "about:srcdoc");
        let st = state.lock();
        // Recording is raw; ignorable URLs are filtered at classification.
        assert_eq!(st.navigation_requests.len(), 2);
    }
}
