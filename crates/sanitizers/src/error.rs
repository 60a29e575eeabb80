use thiserror::Error;

#[derive(Error, Debug)]
pub enum SanitizeError {
    /// The requested adapter id does not exist in this build.
    #[error("unknown sanitizer {name:?}; available: {available}")]
    UnknownSanitizer { name: String, available: String },

    /// An `expected_tags` contract references an attribute outside the
    /// shared allowlist. Checked once at corpus load, fatal before any case.
    #[error(
        "vector {vector_id}: expected_tags references attribute {attr:?} on <{tag}>, \
         which is not in the shared allowlist"
    )]
    ContractAttributeNotAllowed {
        vector_id: String,
        tag: String,
        attr: String,
    },
}
