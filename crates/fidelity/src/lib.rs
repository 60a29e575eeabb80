//! Structural fidelity checking for sanitized HTML fragments.
//!
//! This crate decides the orthogonal `lossy` flag: whether a sanitizer's
//! output still satisfies the vector's `expected_tags` contract. It uses
//! kuchiki (built on html5ever) so the surviving-element view matches what
//! a real HTML5 parser would build from the fragment.
//!
//! The checker is pure: identical input always yields an identical verdict,
//! and re-serializing and re-parsing the fragment does not change it.

mod checker;

pub use checker::{check_fidelity, surviving_elements, ElementOccurrence, FidelityReport};
