//! The uniform adapter contract every sanitizer sits behind.

use serde::{Deserialize, Serialize};

use xssbench_vectors::PayloadContext;

use crate::policy::Policy;

/// How the adapter call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    /// Normal path; `html` carries the cleaned output.
    Ok,
    /// The adapter cannot represent the requested policy safely.
    /// Classified as outcome `skip`.
    UnsupportedConfig,
    /// Unexpected adapter failure. Classified as outcome `error`.
    AdapterError,
}

/// Result of one `sanitize` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedOutput {
    pub html: String,
    pub status: AdapterStatus,
    pub message: Option<String>,
}

impl SanitizedOutput {
    pub fn ok(html: String) -> Self {
        Self { html, status: AdapterStatus::Ok, message: None }
    }

    pub fn unsupported_config(message: impl Into<String>) -> Self {
        Self {
            html: String::new(),
            status: AdapterStatus::UnsupportedConfig,
            message: Some(message.into()),
        }
    }

    pub fn adapter_error(message: impl Into<String>) -> Self {
        Self {
            html: String::new(),
            status: AdapterStatus::AdapterError,
            message: Some(message.into()),
        }
    }
}

/// An opaque sanitizer capability.
///
/// Implementations must be infallible in the Rust sense: failures are
/// reported through `SanitizedOutput::status`, never by panicking across
/// this boundary.
pub trait SanitizerAdapter: Send + Sync + std::fmt::Debug {
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// Vector contexts this sanitizer can meaningfully be tested in.
    /// A case whose vector context is outside this set is outcome `skip`
    /// without the adapter being invoked.
    fn supported_contexts(&self) -> &[PayloadContext];

    fn sanitize(&self, html: &str, policy: &Policy) -> SanitizedOutput;

    fn supports_context(&self, context: PayloadContext) -> bool {
        self.supported_contexts().contains(&context)
    }
}
