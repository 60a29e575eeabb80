//! Typed representation of vectors, payload contexts and tag contracts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The syntactic slot a payload is injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadContext {
    /// Fragment inside `<div id="root">`.
    Html,
    /// Fragment inside `<head>`, after the prelude.
    HtmlHead,
    /// Fragment as a direct child of `<html>`, after `<head>`.
    HtmlOuter,
    /// Network-leak primitive rendered in both head and body slots.
    HttpLeak,
    /// CSS-driven leak primitive; same placement as `http_leak`.
    HttpLeakStyle,
    /// URL value of `<a href="...">`, clicked by the harness.
    Href,
    /// Script body of an `onerror` attribute.
    OnerrorAttr,
    /// Raw script body inside `<script>`.
    Js,
    /// Second argument of `setTimeout(fn, ...)`.
    JsArg,
    /// Single-quoted JS string literal.
    JsString,
    /// Double-quoted JS string literal.
    JsStringDouble,
}

impl PayloadContext {
    /// All contexts, in canonical order.
    pub const ALL: [PayloadContext; 11] = [
        PayloadContext::Html,
        PayloadContext::HtmlHead,
        PayloadContext::HtmlOuter,
        PayloadContext::HttpLeak,
        PayloadContext::HttpLeakStyle,
        PayloadContext::Href,
        PayloadContext::OnerrorAttr,
        PayloadContext::Js,
        PayloadContext::JsArg,
        PayloadContext::JsString,
        PayloadContext::JsStringDouble,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadContext::Html => "html",
            PayloadContext::HtmlHead => "html_head",
            PayloadContext::HtmlOuter => "html_outer",
            PayloadContext::HttpLeak => "http_leak",
            PayloadContext::HttpLeakStyle => "http_leak_style",
            PayloadContext::Href => "href",
            PayloadContext::OnerrorAttr => "onerror_attr",
            PayloadContext::Js => "js",
            PayloadContext::JsArg => "js_arg",
            PayloadContext::JsString => "js_string",
            PayloadContext::JsStringDouble => "js_string_double",
        }
    }

    /// Contexts whose vectors must carry an `expected_tags` contract.
    pub fn requires_expected_tags(&self) -> bool {
        matches!(
            self,
            PayloadContext::Html
                | PayloadContext::HtmlHead
                | PayloadContext::HtmlOuter
                | PayloadContext::OnerrorAttr
        )
    }

    /// Contexts where `expected_tags` is meaningless and therefore forbidden.
    pub fn forbids_expected_tags(&self) -> bool {
        !self.requires_expected_tags()
    }

    pub fn is_http_leak(&self) -> bool {
        matches!(self, PayloadContext::HttpLeak | PayloadContext::HttpLeakStyle)
    }
}

impl fmt::Display for PayloadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PayloadContext {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PayloadContext::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                let allowed: Vec<&str> = PayloadContext::ALL.iter().map(|c| c.as_str()).collect();
                format!("invalid payload_context {s:?}; allowed: {}", allowed.join(", "))
            })
    }
}

/// One entry of an `expected_tags` contract: a tag name plus the attribute
/// names the surviving element must still carry.
///
/// Text form is either a bare name (`"p"`) or a name with a bracketed
/// attribute list (`"a[href, style]"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSpec {
    pub name: String,
    pub required_attrs: Vec<String>,
}

impl TagSpec {
    pub fn bare(name: &str) -> Self {
        Self { name: name.to_ascii_lowercase(), required_attrs: Vec::new() }
    }

    /// Parse the text form. Attribute names are lowercased and order is kept.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let (name, attrs) = match spec.find('[') {
            None => (spec, Vec::new()),
            Some(open) => {
                if !spec.ends_with(']') {
                    return Err(format!("expected_tags entry {spec:?} has an unclosed bracket"));
                }
                let inner = &spec[open + 1..spec.len() - 1];
                if inner.trim().is_empty() {
                    return Err(format!(
                        "expected_tags entry {spec:?} must not use empty brackets; use a bare tag name"
                    ));
                }
                let attrs: Vec<String> = inner
                    .split(',')
                    .map(|a| a.trim().to_ascii_lowercase())
                    .collect();
                if attrs.iter().any(|a| a.is_empty()) {
                    return Err(format!("expected_tags entry {spec:?} has an empty attribute name"));
                }
                (&spec[..open], attrs)
            }
        };

        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(format!("expected_tags entry {spec:?} is missing a tag name"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ':')
        {
            return Err(format!("expected_tags entry {spec:?} has an invalid tag name"));
        }

        Ok(Self { name, required_attrs: attrs })
    }
}

impl fmt::Display for TagSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.required_attrs.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}[{}]", self.name, self.required_attrs.join(", "))
        }
    }
}

/// One adversarial payload plus its contract, immutable after load.
///
/// A source vector listing several contexts is expanded into one `Vector`
/// per context at load time.
#[derive(Debug, Clone)]
pub struct Vector {
    pub id: String,
    pub description: String,
    pub payload_html: String,
    pub context: PayloadContext,
    /// `None` means fidelity is not computed for this vector, either because
    /// the context forbids it or because the file opted out.
    pub expected_tags: Option<Vec<TagSpec>>,
    /// Extra tags the sanitizer policy should allow for this vector.
    /// Only valid for `http_leak` / `http_leak_style` contexts.
    pub sanitizer_allow_tags: Vec<String>,
}

impl Vector {
    /// The string handed to the sanitizer and the context the rendered
    /// document actually uses.
    ///
    /// `onerror_attr` payloads are wrapped into their carrier element before
    /// sanitization, so HTML sanitizers see markup rather than bare script;
    /// the wrapped case then runs under the `html` template. `href` payloads
    /// are passed through as the raw URL value.
    pub fn sanitizer_input(&self) -> (String, PayloadContext) {
        match self.context {
            PayloadContext::OnerrorAttr => (
                format!("<img src=\"nonexistent://x\" onerror=\"{}\">", self.payload_html),
                PayloadContext::Html,
            ),
            _ => (self.payload_html.clone(), self.context),
        }
    }
}

/// The serializable identity of one concrete case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseInput {
    pub vector_id: String,
    pub context: PayloadContext,
    pub sanitizer: String,
    pub engine: String,
}
