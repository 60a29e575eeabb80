//! The shared sanitization policy.
//!
//! One allowlist is used by every adapter so that results compare like for
//! like: preserve common structure and semantics (including div/span and
//! tables) while stripping scripting primitives, event handlers and unsafe
//! URLs. The same table backs the load-time `expected_tags` sanity check,
//! keeping vector contracts honest against what adapters are even allowed
//! to keep.

use std::collections::HashSet;

use xssbench_vectors::Vector;

use crate::error::SanitizeError;

const ALLOWED_TAGS: &[&str] = &[
    // Text / structure
    "p", "br", "div", "span", "blockquote", "pre", "code", "hr",
    // Emphasis
    "strong", "em", "b", "i", "u", "s", "sub", "sup",
    // Lists
    "ul", "ol", "li",
    // Headings
    "h1", "h2", "h3", "h4", "h5", "h6",
    // Links & media
    "a", "img",
    // Tables
    "table", "thead", "tbody", "tfoot", "tr", "th", "td",
];

const GLOBAL_ATTRS: &[&str] = &["class", "id", "title", "lang", "dir", "style"];
const A_ATTRS: &[&str] = &["href", "title"];
const IMG_ATTRS: &[&str] = &["src", "alt", "title", "width", "height", "loading"];
const TABLE_CELL_ATTRS: &[&str] = &["colspan", "rowspan"];
const URL_SCHEMES: &[&str] = &["http", "https", "mailto", "tel"];

/// Shared allowlist handed to every adapter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub allowed_tags: Vec<String>,
    pub global_attrs: Vec<String>,
    pub a_attrs: Vec<String>,
    pub img_attrs: Vec<String>,
    pub table_cell_attrs: Vec<String>,
    pub url_schemes: Vec<String>,
}

impl Default for Policy {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            allowed_tags: owned(ALLOWED_TAGS),
            global_attrs: owned(GLOBAL_ATTRS),
            a_attrs: owned(A_ATTRS),
            img_attrs: owned(IMG_ATTRS),
            table_cell_attrs: owned(TABLE_CELL_ATTRS),
            url_schemes: owned(URL_SCHEMES),
        }
    }
}

impl Policy {
    /// The allowlisted attributes for a given tag.
    ///
    /// Used both for adapter configuration and for interpreting
    /// `expected_tags` attribute requirements.
    pub fn allowed_attributes_for_tag(&self, tag: &str) -> HashSet<&str> {
        let tag = tag.trim().to_ascii_lowercase();
        let mut attrs: HashSet<&str> = self.global_attrs.iter().map(String::as_str).collect();
        match tag.as_str() {
            "a" => attrs.extend(self.a_attrs.iter().map(String::as_str)),
            "img" => attrs.extend(self.img_attrs.iter().map(String::as_str)),
            "th" | "td" => attrs.extend(self.table_cell_attrs.iter().map(String::as_str)),
            _ => {}
        }
        attrs
    }

    /// A copy of this policy with extra allowed tags (per-vector extension
    /// for `http_leak` vectors).
    pub fn with_extra_tags(&self, extra: &[String]) -> Policy {
        if extra.is_empty() {
            return self.clone();
        }
        let mut policy = self.clone();
        for tag in extra {
            let tag = tag.to_ascii_lowercase();
            if !policy.allowed_tags.contains(&tag) {
                policy.allowed_tags.push(tag);
            }
        }
        policy
    }

    /// Corpus invariant: every attribute referenced by any `expected_tags`
    /// entry must be in the shared allowlist for its tag. Runs once at load
    /// time; a violation aborts before any case executes.
    pub fn validate_expected_tags(&self, vectors: &[Vector]) -> Result<(), SanitizeError> {
        for vector in vectors {
            let Some(specs) = &vector.expected_tags else { continue };
            for spec in specs {
                let allowed = self.allowed_attributes_for_tag(&spec.name);
                for attr in &spec.required_attrs {
                    if !allowed.contains(attr.as_str()) {
                        return Err(SanitizeError::ContractAttributeNotAllowed {
                            vector_id: vector.id.clone(),
                            tag: spec.name.clone(),
                            attr: attr.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xssbench_vectors::{PayloadContext, TagSpec};

    fn vector_with_contract(specs: &[&str]) -> Vector {
        Vector {
            id: "v1".into(),
            description: String::new(),
            payload_html: String::new(),
            context: PayloadContext::Html,
            expected_tags: Some(specs.iter().map(|s| TagSpec::parse(s).unwrap()).collect()),
            sanitizer_allow_tags: Vec::new(),
        }
    }

    #[test]
    fn per_tag_attrs_extend_globals() {
        let policy = Policy::default();
        let a = policy.allowed_attributes_for_tag("a");
        assert!(a.contains("href"));
        assert!(a.contains("class"));
        let img = policy.allowed_attributes_for_tag("IMG");
        assert!(img.contains("src"));
        assert!(!img.contains("href"));
        let p = policy.allowed_attributes_for_tag("p");
        assert!(p.contains("style"));
        assert!(!p.contains("src"));
    }

    #[test]
    fn contract_attrs_inside_allowlist_pass() {
        let policy = Policy::default();
        let vectors = vec![vector_with_contract(&["a[href, title]", "img[src]", "td[colspan]"])];
        policy.validate_expected_tags(&vectors).unwrap();
    }

    #[test]
    fn contract_attr_outside_allowlist_is_fatal() {
        let policy = Policy::default();
        let vectors = vec![vector_with_contract(&["img[onerror]"])];
        let err = policy.validate_expected_tags(&vectors).unwrap_err();
        assert!(err.to_string().contains("onerror"), "{err}");
    }

    #[test]
    fn extra_tags_extend_without_duplicating() {
        let policy = Policy::default();
        let extended = policy.with_extra_tags(&["video".into(), "img".into()]);
        assert!(extended.allowed_tags.contains(&"video".to_string()));
        let img_count = extended.allowed_tags.iter().filter(|t| *t == "img").count();
        assert_eq!(img_count, 1);
    }
}
