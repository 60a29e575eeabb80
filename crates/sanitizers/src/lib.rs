//! Sanitizer adapters for xssbench.
//!
//! Every sanitizer under test sits behind the same narrow contract:
//! `sanitize(html, policy) -> SanitizedOutput`. Adapters never panic across
//! the boundary; a policy the underlying library cannot represent safely is
//! reported as `unsupported_config` and any other failure as
//! `adapter_error`, so one misbehaving sanitizer cannot take down a run.
//!
//! The distinguished `noop` adapter returns its input unchanged. It exists
//! to validate the harness itself: across a hostile corpus it must produce
//! plenty of `xss`/`external` outcomes and stay non-lossy wherever the
//! vector contracts allow.

pub mod adapter;
pub mod builtin;
pub mod error;
pub mod policy;

pub use adapter::{AdapterStatus, SanitizedOutput, SanitizerAdapter};
pub use builtin::{available_sanitizers, get_sanitizer};
pub use error::SanitizeError;
pub use policy::Policy;
