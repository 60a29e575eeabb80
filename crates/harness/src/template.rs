//! Injection templates: compose the synthetic document for one case.
//!
//! Every template serves from a stable synthetic origin so scheme-relative
//! URLs (`//evil/x.js`) resolve to something the network guard can classify,
//! and carries a `<base href>` for the same reason. The prelude is not
//! inlined here: it is installed as a browser init script so it reaches
//! every frame (srcdoc subdocuments included) before any page script, and
//! inlining it again would double-wrap the timer functions.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use xssbench_vectors::PayloadContext;

/// Synthetic origin the guard fulfills the composed document at.
pub const BASE_URL: &str = "http://xssbench.local/";

const PAYLOAD_SLOT: &str = "__XSSBENCH_PAYLOAD__";

const HTML_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
  </head>
  <body>
    <div id="root">__XSSBENCH_PAYLOAD__</div>
  </body>
</html>
"#;

const HTML_HEAD_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
    __XSSBENCH_PAYLOAD__
  </head>
  <body>
    <div id="root"></div>
  </body>
</html>
"#;

/// Leak primitives are placement-sensitive; rendering the payload in both
/// head and body avoids per-vector special-casing. The parser ignores or
/// relocates whichever copy is invalid. The styled decoys give CSS-driven
/// leaks something to select.
const HTML_HEAD_AND_BODY_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
    __XSSBENCH_PAYLOAD__
  </head>
  <body>
    <div id="root">__XSSBENCH_PAYLOAD__</div>
    <s id="xssbench-css-target">x</s>
    <big id="xssbench-css-target2">x</big>
  </body>
</html>
"#;

const HTML_OUTER_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
  </head>
  __XSSBENCH_PAYLOAD__
</html>
"#;

const HREF_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
  </head>
  <body>
    <a id="xssbench-link" href="__XSSBENCH_PAYLOAD__">x</a>
  </body>
</html>
"#;

const JS_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
  </head>
  <body>
    <script>__XSSBENCH_PAYLOAD__</script>
  </body>
</html>
"#;

const JS_ARG_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
  </head>
  <body>
    <script>setTimeout(function () {}, __XSSBENCH_PAYLOAD__);</script>
  </body>
</html>
"#;

const JS_STRING_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
  </head>
  <body>
    <script>var __xssbench_str = '__XSSBENCH_PAYLOAD__';</script>
  </body>
</html>
"#;

const JS_STRING_DOUBLE_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
  </head>
  <body>
    <script>var __xssbench_str = "__XSSBENCH_PAYLOAD__";</script>
  </body>
</html>
"#;

const ONERROR_ATTR_TEMPLATE: &str = r#"<!doctype html>
<html>
  <head>
    <meta charset="utf-8">
    <base href="http://xssbench.local/">
  </head>
  <body>
    <img id="xssbench-img" src="nonexistent://x" onerror="__XSSBENCH_PAYLOAD__">
  </body>
</html>
"#;

static META_REFRESH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)(<meta\b[^>]*\bhttp-equiv\s*=\s*['"]?refresh['"]?[^>]*\bcontent\s*=\s*['"])([^'"]*)(['"])"#,
    )
    .unwrap()
});

static REFRESH_CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(\d+)?\s*(?:;\s*)?(?:url\s*=\s*(.+?))?\s*$").unwrap()
});

static FIRST_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*([A-Za-z][A-Za-z0-9:-]*)").unwrap());

/// Rewrite meta-refresh delays to zero inside already-sanitized HTML.
///
/// The navigation is still observed like normal; this only stops a 10s
/// refresh from forcing a 10s wait budget.
pub fn speed_up_meta_refresh(html: &str) -> String {
    let lower = html.to_ascii_lowercase();
    if !lower.contains("http-equiv") || !lower.contains("refresh") {
        return html.to_string();
    }

    META_REFRESH_RE
        .replace_all(html, |caps: &Captures<'_>| {
            let content = &caps[2];
            match REFRESH_CONTENT_RE.captures(content) {
                None => caps[0].to_string(),
                Some(parsed) => {
                    let url = parsed
                        .get(2)
                        .map(|m| m.as_str().trim().trim_matches(['"', '\'']))
                        .unwrap_or("");
                    let new_content = if url.is_empty() {
                        "0".to_string()
                    } else {
                        format!("0; url={url}")
                    };
                    format!("{}{}{}", &caps[1], new_content, &caps[3])
                }
            }
        })
        .into_owned()
}

/// Heuristic placement for leak primitives: outer template for payloads
/// whose first tag replaces the document scaffolding, dual-slot otherwise.
fn leak_template(sanitized_html: &str) -> &'static str {
    let first_tag = FIRST_TAG_RE
        .captures(sanitized_html)
        .map(|caps| caps[1].to_ascii_lowercase());
    match first_tag.as_deref() {
        Some("html") | Some("body") | Some("frameset") => HTML_OUTER_TEMPLATE,
        _ => HTML_HEAD_AND_BODY_TEMPLATE,
    }
}

/// Compose the document for one case from its sanitized payload.
pub fn render_document(sanitized_html: &str, context: PayloadContext) -> String {
    let template = match context {
        PayloadContext::Html => HTML_TEMPLATE,
        PayloadContext::HtmlHead => HTML_HEAD_TEMPLATE,
        PayloadContext::HtmlOuter => HTML_OUTER_TEMPLATE,
        PayloadContext::HttpLeak | PayloadContext::HttpLeakStyle => leak_template(sanitized_html),
        PayloadContext::Href => HREF_TEMPLATE,
        PayloadContext::OnerrorAttr => ONERROR_ATTR_TEMPLATE,
        PayloadContext::Js => JS_TEMPLATE,
        PayloadContext::JsArg => JS_ARG_TEMPLATE,
        PayloadContext::JsString => JS_STRING_TEMPLATE,
        PayloadContext::JsStringDouble => JS_STRING_DOUBLE_TEMPLATE,
    };

    speed_up_meta_refresh(&template.replace(PAYLOAD_SLOT, sanitized_html))
}
