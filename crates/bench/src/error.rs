use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error(transparent)]
    Vector(#[from] xssbench_vectors::VectorError),

    #[error(transparent)]
    Sanitize(#[from] xssbench_sanitizers::SanitizeError),

    #[error(transparent)]
    Harness(#[from] xssbench_harness::HarnessError),

    #[error("no usable browser engines: {0}")]
    NoEngines(String),

    #[error("no vector files found; pass --vectors or run from a directory with vectors/*.json")]
    NoVectors,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize run artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}
