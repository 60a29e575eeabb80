use thiserror::Error;

/// Errors surfaced by the browser harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// No usable binary for the requested engine.
    #[error(
        "browser engine {engine:?} is not available: {reason}. \
         Install it or point XSSBENCH_{engine_upper} at a binary."
    )]
    EngineUnavailable {
        engine: String,
        engine_upper: String,
        reason: String,
    },

    /// The browser process could not be started.
    #[error("failed to launch {engine}: {source}")]
    Launch {
        engine: String,
        #[source]
        source: std::io::Error,
    },

    /// The process started but never announced a DevTools endpoint.
    #[error("{engine} did not announce a DevTools endpoint within {waited_ms} ms")]
    NoDevtoolsEndpoint { engine: String, waited_ms: u64 },

    /// Websocket-level failure on the DevTools connection.
    #[error("DevTools websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The DevTools endpoint rejected a command.
    #[error("DevTools command {method} failed: {message}")]
    Protocol { method: String, message: String },

    /// A DevTools command received no reply before its deadline.
    #[error("DevTools command {method} timed out")]
    CallTimeout { method: String },

    /// The browser connection dropped or the page's target crashed.
    /// The scheduler recycles the worker's browser and may retry the case.
    #[error("browser context crashed or connection closed")]
    ContextCrash,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed DevTools payload: {0}")]
    Serde(#[from] serde_json::Error),
}

impl HarnessError {
    pub fn engine_unavailable(engine: &str, reason: impl Into<String>) -> Self {
        HarnessError::EngineUnavailable {
            engine: engine.to_string(),
            engine_upper: engine.to_ascii_uppercase(),
            reason: reason.into(),
        }
    }

    /// Whether this error should recycle the worker's browser context.
    pub fn is_crash(&self) -> bool {
        matches!(
            self,
            HarnessError::ContextCrash | HarnessError::WebSocket(_)
        )
    }
}
