//! Vector model and vector-file loading for xssbench.
//!
//! A vector is one adversarial HTML payload plus the metadata the harness
//! needs to run and judge it: the syntactic context it is injected into,
//! and (for fragment contexts) the structural contract the sanitized output
//! must satisfy.

pub mod error;
pub mod load;
pub mod model;

pub use error::VectorError;
pub use load::{load_vectors, load_vectors_from_str};
pub use model::{CaseInput, PayloadContext, TagSpec, Vector};
