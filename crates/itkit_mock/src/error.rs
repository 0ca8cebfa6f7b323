use std::io;

use thiserror::Error;

/// Errors raised while starting, feeding or stopping the mock server.
#[derive(Debug, Error)]
pub enum MockError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("failed to start server runtime: {0}")]
    Runtime(io::Error),

    #[error("server thread panicked")]
    ThreadPanicked,

    #[error("invalid response data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type MockResult<T> = Result<T, MockError>;
