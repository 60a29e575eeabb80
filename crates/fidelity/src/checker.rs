//! Fragment parsing and `expected_tags` matching.

use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;

use xssbench_vectors::TagSpec;

/// One surviving element occurrence, in depth-first pre-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementOccurrence {
    pub name: String,
    pub attrs: Vec<String>,
}

impl ElementOccurrence {
    fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a == name)
    }
}

/// Verdict for one sanitized fragment against one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FidelityReport {
    pub lossy: bool,
    /// Human-readable mismatch description, present iff `lossy`.
    pub details: Option<String>,
}

impl FidelityReport {
    fn intact() -> Self {
        Self { lossy: false, details: None }
    }

    fn lossy(details: String) -> Self {
        Self { lossy: true, details: Some(details) }
    }
}

/// Parse a sanitized fragment and collect its element occurrences in
/// depth-first pre-order.
///
/// The fragment is wrapped in a minimal document and parsed with html5ever,
/// then the `<body>` subtree is walked. Head-targeted elements (`meta`,
/// `link`, `style`, ...) survive a body-context parse, so one parse covers
/// every fragment context.
pub fn surviving_elements(fragment: &str) -> Vec<ElementOccurrence> {
    let wrapped = format!("<!DOCTYPE html><html><body>{fragment}</body></html>");
    let document = kuchiki::parse_html().one(wrapped.as_str());

    let mut out = Vec::new();
    match find_first_element(&document, "body") {
        Some(body) => collect_elements(&body, &mut out),
        // html5ever always synthesizes a body for document parses; if the
        // tree is somehow degenerate, fall back to the whole document.
        None => collect_elements(&document, &mut out),
    }
    out
}

fn find_first_element(node: &NodeRef, name: &str) -> Option<NodeRef> {
    for child in node.children() {
        if let Some(el) = child.as_element() {
            if el.name.local.as_ref().eq_ignore_ascii_case(name) {
                return Some(child.clone());
            }
        }
        if let Some(found) = find_first_element(&child, name) {
            return Some(found);
        }
    }
    None
}

fn collect_elements(root: &NodeRef, out: &mut Vec<ElementOccurrence>) {
    for child in root.children() {
        if let Some(el) = child.as_element() {
            let attrs = el
                .attributes
                .borrow()
                .map
                .keys()
                .map(|k| k.local.as_ref().to_ascii_lowercase())
                .collect();
            out.push(ElementOccurrence {
                name: el.name.local.as_ref().to_ascii_lowercase(),
                attrs,
            });
        }
        collect_elements(&child, out);
    }
}

/// Decide whether sanitized output satisfies the vector's contract.
///
/// - `expected == None`: fidelity is not computed; never lossy.
/// - empty contract: the fragment must contain zero elements (text is fine).
/// - otherwise: surviving elements pair 1:1 in order with the contract; tag
///   names compare case-insensitively and attribute-annotated specs require
///   every listed attribute to be present (values are not checked).
pub fn check_fidelity(sanitized_html: &str, expected: Option<&[TagSpec]>) -> FidelityReport {
    let Some(expected) = expected else {
        return FidelityReport::intact();
    };

    let survivors = surviving_elements(sanitized_html);

    if expected.is_empty() {
        if survivors.is_empty() {
            return FidelityReport::intact();
        }
        let names: Vec<&str> = survivors.iter().take(20).map(|e| e.name.as_str()).collect();
        return FidelityReport::lossy(format!(
            "Expected no tags after sanitization, but found: {}",
            names.join(", ")
        ));
    }

    if survivors.len() < expected.len() {
        let missing: Vec<String> = expected[survivors.len()..]
            .iter()
            .map(TagSpec::to_string)
            .collect();
        return FidelityReport::lossy(format!(
            "Missing expected tags after sanitization: {}",
            missing.join(", ")
        ));
    }

    if survivors.len() > expected.len() {
        let unexpected: Vec<&str> = survivors[expected.len()..]
            .iter()
            .take(20)
            .map(|e| e.name.as_str())
            .collect();
        return FidelityReport::lossy(format!(
            "Sanitized output has unexpected extra tags: {}",
            unexpected.join(", ")
        ));
    }

    for (i, (spec, el)) in expected.iter().zip(survivors.iter()).enumerate() {
        if el.name != spec.name {
            return FidelityReport::lossy(format!(
                "Element #{idx} is <{got}>, expected {spec}",
                idx = i + 1,
                got = el.name,
            ));
        }
        for attr in &spec.required_attrs {
            if !el.has_attr(attr) {
                return FidelityReport::lossy(format!(
                    "Element #{idx} <{name}> lost required attribute {attr:?} (expected {spec})",
                    idx = i + 1,
                    name = el.name,
                ));
            }
        }
    }

    FidelityReport::intact()
}
