use thiserror::Error;

/// Errors raised while loading and validating vector files.
///
/// All of these are fatal at load time: a corpus that fails validation
/// aborts the run before any case executes.
#[derive(Error, Debug)]
pub enum VectorError {
    /// The file could not be read.
    #[error("failed to read vector file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid JSON.
    #[error("invalid JSON in vector file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// The JSON shape does not match the vector-file schema.
    #[error("vector schema error in {path}: {message}")]
    Schema { path: String, message: String },

    /// Two loaded vectors share the same (id, context) pair.
    #[error("duplicate vector id+context: {id}@{context}")]
    DuplicateIdContext { id: String, context: String },

    /// A per-vector invariant does not hold (e.g. `expected_tags` on a
    /// script context).
    #[error("invariant violation for vector {id}: {message}")]
    Invariant { id: String, message: String },
}
