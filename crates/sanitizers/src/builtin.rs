//! Built-in sanitizer adapters.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use xssbench_vectors::PayloadContext;

use crate::adapter::{SanitizedOutput, SanitizerAdapter};
use crate::error::SanitizeError;
use crate::policy::Policy;

/// Contexts an HTML-rewriting sanitizer can meaningfully be tested in.
/// JS-string/JS-code and raw URL values are out of scope for them.
const HTML_CONTEXTS: &[PayloadContext] = &[
    PayloadContext::Html,
    PayloadContext::HtmlHead,
    PayloadContext::HtmlOuter,
    PayloadContext::HttpLeak,
    PayloadContext::HttpLeakStyle,
];

/// The identity sanitizer: the harness-correctness baseline.
#[derive(Debug)]
pub struct Noop;

impl SanitizerAdapter for Noop {
    fn id(&self) -> &str {
        "noop"
    }

    fn description(&self) -> &str {
        "Baseline: returns HTML unchanged"
    }

    fn supported_contexts(&self) -> &[PayloadContext] {
        &PayloadContext::ALL
    }

    fn sanitize(&self, html: &str, _policy: &Policy) -> SanitizedOutput {
        SanitizedOutput::ok(html.to_string())
    }
}

/// Allowlist sanitizer backed by `ammonia`.
#[derive(Debug)]
pub struct Ammonia;

impl Ammonia {
    fn clean(html: &str, policy: &Policy) -> SanitizedOutput {
        // ammonia manages `rel` on links itself and rejects configurations
        // that also allowlist it as a plain attribute.
        let attr_sets = [
            &policy.global_attrs,
            &policy.a_attrs,
            &policy.img_attrs,
            &policy.table_cell_attrs,
        ];
        if attr_sets.iter().any(|set| set.iter().any(|a| a == "rel")) {
            return SanitizedOutput::unsupported_config(
                "ammonia cannot allowlist 'rel'; it is managed via link_rel",
            );
        }

        let tags: HashSet<&str> = policy.allowed_tags.iter().map(String::as_str).collect();
        let generic: HashSet<&str> = policy.global_attrs.iter().map(String::as_str).collect();
        let mut tag_attrs: HashMap<&str, HashSet<&str>> = HashMap::new();
        tag_attrs.insert("a", policy.a_attrs.iter().map(String::as_str).collect());
        tag_attrs.insert("img", policy.img_attrs.iter().map(String::as_str).collect());
        let cell: HashSet<&str> = policy.table_cell_attrs.iter().map(String::as_str).collect();
        tag_attrs.insert("th", cell.clone());
        tag_attrs.insert("td", cell);
        let schemes: HashSet<&str> = policy.url_schemes.iter().map(String::as_str).collect();

        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut builder = ammonia::Builder::default();
            builder
                .tags(tags)
                .generic_attributes(generic)
                .tag_attributes(tag_attrs)
                .url_schemes(schemes)
                .link_rel(None);
            builder.clean(html).to_string()
        }));

        match result {
            Ok(clean) => SanitizedOutput::ok(clean),
            Err(panic) => SanitizedOutput::adapter_error(format!(
                "ammonia panicked: {}",
                panic_message(&panic)
            )),
        }
    }
}

impl SanitizerAdapter for Ammonia {
    fn id(&self) -> &str {
        "ammonia"
    }

    fn description(&self) -> &str {
        "ammonia Builder with the shared allowlist (keep common markup; strip dangerous)"
    }

    fn supported_contexts(&self) -> &[PayloadContext] {
        HTML_CONTEXTS
    }

    fn sanitize(&self, html: &str, policy: &Policy) -> SanitizedOutput {
        Self::clean(html, policy)
    }
}

/// Strict stub: strips every element, keeps text content.
#[derive(Debug)]
pub struct Strip;

impl SanitizerAdapter for Strip {
    fn id(&self) -> &str {
        "strip"
    }

    fn description(&self) -> &str {
        "Strict stub: removes all elements, keeps text"
    }

    fn supported_contexts(&self) -> &[PayloadContext] {
        HTML_CONTEXTS
    }

    fn sanitize(&self, html: &str, _policy: &Policy) -> SanitizedOutput {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut builder = ammonia::Builder::default();
            builder.tags(HashSet::new()).generic_attributes(HashSet::new());
            builder.clean(html).to_string()
        }));
        match result {
            Ok(clean) => SanitizedOutput::ok(clean),
            Err(panic) => SanitizedOutput::adapter_error(format!(
                "strip sanitizer panicked: {}",
                panic_message(&panic)
            )),
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// All adapters importable in this build, `noop` first.
pub fn available_sanitizers() -> Vec<Arc<dyn SanitizerAdapter>> {
    vec![Arc::new(Noop), Arc::new(Ammonia), Arc::new(Strip)]
}

/// Look up an adapter by id.
pub fn get_sanitizer(name: &str) -> Result<Arc<dyn SanitizerAdapter>, SanitizeError> {
    let all = available_sanitizers();
    all.iter()
        .find(|s| s.id() == name)
        .cloned()
        .ok_or_else(|| SanitizeError::UnknownSanitizer {
            name: name.to_string(),
            available: all.iter().map(|s| s.id().to_string()).collect::<Vec<_>>().join(", "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::AdapterStatus;

    #[test]
    fn noop_returns_input_unchanged() {
        let out = Noop.sanitize("<script>alert(1)</script>", &Policy::default());
        assert_eq!(out.status, AdapterStatus::Ok);
        assert_eq!(out.html, "<script>alert(1)</script>");
    }

    #[test]
    fn noop_supports_every_context() {
        for ctx in PayloadContext::ALL {
            assert!(Noop.supports_context(ctx));
        }
    }

    #[test]
    fn ammonia_strips_script_but_keeps_structure() {
        let out = Ammonia.sanitize("<p>hi</p><script>alert(1)</script>", &Policy::default());
        assert_eq!(out.status, AdapterStatus::Ok);
        assert!(out.html.contains("<p>hi</p>"));
        assert!(!out.html.contains("script"));
        assert!(!out.html.contains("alert"));
    }

    #[test]
    fn ammonia_strips_event_handlers_and_js_urls() {
        let policy = Policy::default();
        let out = Ammonia.sanitize(r#"<img src=x onerror=alert(1)>"#, &policy);
        assert!(!out.html.contains("onerror"));

        let out = Ammonia.sanitize(r#"<a href="javascript:alert(1)">x</a>"#, &policy);
        assert!(!out.html.contains("javascript:"));
    }

    #[test]
    fn ammonia_keeps_allowlisted_attributes() {
        let out = Ammonia.sanitize(r#"<a href="https://example.com/" title="t">x</a>"#, &Policy::default());
        assert!(out.html.contains("href="));
        assert!(out.html.contains("title="));
    }

    #[test]
    fn ammonia_rejects_rel_policy_as_unsupported() {
        let mut policy = Policy::default();
        policy.a_attrs.push("rel".into());
        let out = Ammonia.sanitize("<a rel=x>y</a>", &policy);
        assert_eq!(out.status, AdapterStatus::UnsupportedConfig);
    }

    #[test]
    fn ammonia_does_not_support_js_contexts() {
        assert!(!Ammonia.supports_context(PayloadContext::Js));
        assert!(!Ammonia.supports_context(PayloadContext::Href));
        assert!(Ammonia.supports_context(PayloadContext::Html));
        assert!(Ammonia.supports_context(PayloadContext::HttpLeak));
    }

    #[test]
    fn strip_removes_all_elements_but_keeps_text() {
        let out = Strip.sanitize("<b>keep</b><script>alert(1)</script>", &Policy::default());
        assert_eq!(out.status, AdapterStatus::Ok);
        assert!(out.html.contains("keep"));
        assert!(!out.html.contains('<'));
        assert!(!out.html.contains("alert"));
    }

    #[test]
    fn registry_finds_all_builtins() {
        let ids: Vec<String> = available_sanitizers().iter().map(|s| s.id().to_string()).collect();
        assert_eq!(ids, vec!["noop", "ammonia", "strip"]);
        assert!(get_sanitizer("noop").is_ok());
        let err = get_sanitizer("bleach").unwrap_err();
        assert!(err.to_string().contains("available"), "{err}");
    }
}
