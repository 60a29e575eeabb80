//! Vector-file loading and schema validation.
//!
//! Two shapes are accepted per file:
//! - v1: `{"schema": "xssbench.vectorfile.v1", "options": {...}, "meta":
//!   {...}, "vectors": [...]}`; `meta` is recorded but otherwise opaque.
//! - legacy: a bare JSON list of vector objects.
//!
//! Validation here is deliberately strict: schema problems abort the run
//! before any case executes, because a partially-loaded corpus would skew
//! every downstream measurement.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::error::VectorError;
use crate::model::{PayloadContext, TagSpec, Vector};

#[derive(Deserialize)]
struct RawVector {
    id: String,
    description: String,
    payload_html: String,
    #[serde(default)]
    payload_context: Option<RawContexts>,
    #[serde(default)]
    expected_tags: Option<Vec<String>>,
    #[serde(default)]
    sanitizer_allow_tags: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawContexts {
    One(String),
    Many(Vec<String>),
}

/// Load and validate vectors from a set of files.
///
/// Duplicate `(id, context)` pairs across all loaded files are an error.
pub fn load_vectors<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Vector>, VectorError> {
    let mut vectors = Vec::new();
    let mut seen: HashSet<(String, PayloadContext)> = HashSet::new();

    for path in paths {
        let path = path.as_ref();
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| VectorError::Io {
            path: display.clone(),
            source,
        })?;
        load_into(&text, &display, &mut vectors, &mut seen)?;
    }

    tracing::debug!(count = vectors.len(), "loaded vectors");
    Ok(vectors)
}

/// Load vectors from an in-memory JSON document (used by tests and by
/// callers that compile vector packs themselves).
pub fn load_vectors_from_str(text: &str, origin: &str) -> Result<Vec<Vector>, VectorError> {
    let mut vectors = Vec::new();
    let mut seen = HashSet::new();
    load_into(text, origin, &mut vectors, &mut seen)?;
    Ok(vectors)
}

fn load_into(
    text: &str,
    path: &str,
    vectors: &mut Vec<Vector>,
    seen: &mut HashSet<(String, PayloadContext)>,
) -> Result<(), VectorError> {
    let value: Value = serde_json::from_str(text).map_err(|source| VectorError::Json {
        path: path.to_string(),
        source,
    })?;

    let (items, ignore_expected_tags) = match value {
        Value::Array(items) => (items, false),
        Value::Object(mut obj) => {
            let ignore = obj
                .get("options")
                .and_then(|o| o.get("expected_tags"))
                .and_then(Value::as_str)
                == Some("ignore");
            let Some(Value::Array(items)) = obj.remove("vectors") else {
                return Err(VectorError::Schema {
                    path: path.to_string(),
                    message: "vector file object must contain a 'vectors' array".into(),
                });
            };
            (items, ignore)
        }
        _ => {
            return Err(VectorError::Schema {
                path: path.to_string(),
                message: "vector file must be a JSON list, or an object with 'vectors'".into(),
            })
        }
    };

    for item in items {
        let raw: RawVector =
            serde_json::from_value(item).map_err(|source| VectorError::Json {
                path: path.to_string(),
                source,
            })?;

        let contexts: Vec<String> = match &raw.payload_context {
            None => vec!["html".to_string()],
            Some(RawContexts::One(ctx)) => vec![ctx.clone()],
            Some(RawContexts::Many(list)) => {
                if list.is_empty() {
                    return Err(VectorError::Schema {
                        path: path.to_string(),
                        message: format!(
                            "payload_context list must be non-empty (vector {})",
                            raw.id
                        ),
                    });
                }
                list.clone()
            }
        };

        for ctx in contexts {
            let context: PayloadContext =
                ctx.parse().map_err(|message| VectorError::Schema {
                    path: path.to_string(),
                    message,
                })?;

            if !seen.insert((raw.id.clone(), context)) {
                return Err(VectorError::DuplicateIdContext {
                    id: raw.id.clone(),
                    context: context.to_string(),
                });
            }

            let expected_tags =
                resolve_expected_tags(&raw, context, ignore_expected_tags)?;

            let sanitizer_allow_tags = match &raw.sanitizer_allow_tags {
                None => Vec::new(),
                Some(tags) => {
                    if !context.is_http_leak() {
                        return Err(VectorError::Invariant {
                            id: raw.id.clone(),
                            message: format!(
                                "sanitizer_allow_tags is only valid for http_leak contexts, not {context}"
                            ),
                        });
                    }
                    tags.iter().map(|t| t.to_ascii_lowercase()).collect()
                }
            };

            vectors.push(Vector {
                id: raw.id.clone(),
                description: raw.description.clone(),
                payload_html: raw.payload_html.clone(),
                context,
                expected_tags,
                sanitizer_allow_tags,
            });
        }
    }

    Ok(())
}

fn resolve_expected_tags(
    raw: &RawVector,
    context: PayloadContext,
    ignore: bool,
) -> Result<Option<Vec<TagSpec>>, VectorError> {
    if context.forbids_expected_tags() {
        if raw.expected_tags.is_some() {
            return Err(VectorError::Invariant {
                id: raw.id.clone(),
                message: format!("expected_tags is not allowed for context {context}"),
            });
        }
        return Ok(None);
    }

    if ignore {
        return Ok(None);
    }

    let Some(specs) = &raw.expected_tags else {
        return Err(VectorError::Invariant {
            id: raw.id.clone(),
            message: format!("expected_tags is required for context {context}"),
        });
    };

    let mut parsed = Vec::with_capacity(specs.len());
    for spec in specs {
        parsed.push(TagSpec::parse(spec).map_err(|message| VectorError::Invariant {
            id: raw.id.clone(),
            message,
        })?);
    }
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_file(vectors_json: &str) -> String {
        format!(
            r#"{{
                "schema": "xssbench.vectorfile.v1",
                "meta": {{
                    "tool": "xssbench",
                    "license": {{"spdx": "MIT", "file": "vectors/LICENSE.txt"}}
                }},
                "vectors": {vectors_json}
            }}"#
        )
    }

    #[test]
    fn accepts_meta_wrapper() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "<img src=x onerror=alert(1)>",
                 "payload_context": "html", "expected_tags": []}]"#,
        );
        let vectors = load_vectors_from_str(&text, "test").unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].id, "v1");
        assert_eq!(vectors[0].expected_tags, Some(Vec::new()));
    }

    #[test]
    fn accepts_legacy_bare_list() {
        let text = r#"[{"id": "v1", "description": "d", "payload_html": "<b>x</b>",
                        "expected_tags": ["b"]}]"#;
        let vectors = load_vectors_from_str(text, "test").unwrap();
        assert_eq!(vectors[0].context, PayloadContext::Html);
        assert_eq!(vectors[0].expected_tags, Some(vec![TagSpec::bare("b")]));
    }

    #[test]
    fn ignores_unknown_meta_keys() {
        let text = r#"{
            "schema": "xssbench.vectorfile.v1",
            "meta": {"some_unknown_flag": true},
            "vectors": [{"id": "v1", "description": "d", "payload_html": "<b>x</b>",
                         "expected_tags": ["b"]}]
        }"#;
        assert_eq!(load_vectors_from_str(text, "test").unwrap().len(), 1);
    }

    #[test]
    fn expands_context_lists_into_one_vector_per_context() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "alert(1)",
                 "payload_context": ["js", "js_arg"]}]"#,
        );
        let vectors = load_vectors_from_str(&text, "test").unwrap();
        let contexts: Vec<_> = vectors.iter().map(|v| v.context).collect();
        assert_eq!(contexts, vec![PayloadContext::Js, PayloadContext::JsArg]);
    }

    #[test]
    fn rejects_duplicate_id_context() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "alert(1)", "payload_context": "js"},
                {"id": "v1", "description": "d", "payload_html": "alert(2)", "payload_context": "js"}]"#,
        );
        let err = load_vectors_from_str(&text, "test").unwrap_err();
        assert!(matches!(err, VectorError::DuplicateIdContext { .. }), "{err}");
    }

    #[test]
    fn same_id_in_different_contexts_is_fine() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "alert(1)", "payload_context": "js"},
                {"id": "v1", "description": "d", "payload_html": "alert(1)", "payload_context": "js_arg"}]"#,
        );
        assert_eq!(load_vectors_from_str(&text, "test").unwrap().len(), 2);
    }

    #[test]
    fn rejects_expected_tags_for_href_context() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "javascript:alert(1)",
                 "payload_context": "href", "expected_tags": ["a"]}]"#,
        );
        let err = load_vectors_from_str(&text, "test").unwrap_err();
        assert!(err.to_string().contains("expected_tags is not allowed"), "{err}");
    }

    #[test]
    fn rejects_expected_tags_for_js_context() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "alert(1)",
                 "payload_context": "js", "expected_tags": []}]"#,
        );
        let err = load_vectors_from_str(&text, "test").unwrap_err();
        assert!(err.to_string().contains("expected_tags is not allowed"), "{err}");
    }

    #[test]
    fn requires_expected_tags_for_fragment_contexts() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "<b>x</b>",
                 "payload_context": "html"}]"#,
        );
        let err = load_vectors_from_str(&text, "test").unwrap_err();
        assert!(err.to_string().contains("expected_tags is required"), "{err}");
    }

    #[test]
    fn ignore_option_disables_expected_tags() {
        let text = r#"{
            "schema": "xssbench.vectorfile.v1",
            "options": {"expected_tags": "ignore"},
            "vectors": [{"id": "v1", "description": "d", "payload_html": "<img src=x>",
                         "payload_context": "html"}]
        }"#;
        let vectors = load_vectors_from_str(text, "test").unwrap();
        assert_eq!(vectors[0].expected_tags, None);
    }

    #[test]
    fn rejects_empty_bracket_expected_tags() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "<img>",
                 "payload_context": "html", "expected_tags": ["img[]"]}]"#,
        );
        let err = load_vectors_from_str(&text, "test").unwrap_err();
        assert!(err.to_string().contains("must not use empty brackets"), "{err}");
    }

    #[test]
    fn rejects_sanitizer_allow_tags_outside_http_leak() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "<b>x</b>",
                 "payload_context": "html", "expected_tags": ["b"],
                 "sanitizer_allow_tags": ["meta"]}]"#,
        );
        let err = load_vectors_from_str(&text, "test").unwrap_err();
        assert!(err.to_string().contains("sanitizer_allow_tags"), "{err}");
    }

    #[test]
    fn accepts_sanitizer_allow_tags_for_http_leak() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "<video poster=\"https://leak/x\">",
                 "payload_context": "http_leak", "sanitizer_allow_tags": ["VIDEO"]}]"#,
        );
        let vectors = load_vectors_from_str(&text, "test").unwrap();
        assert_eq!(vectors[0].sanitizer_allow_tags, vec!["video"]);
    }

    #[test]
    fn rejects_invalid_context_name() {
        let text = v1_file(
            r#"[{"id": "v1", "description": "d", "payload_html": "x",
                 "payload_context": "attribute"}]"#,
        );
        let err = load_vectors_from_str(&text, "test").unwrap_err();
        assert!(err.to_string().contains("invalid payload_context"), "{err}");
    }
}
