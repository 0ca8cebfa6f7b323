//! Error type shared by the harness library.

use std::io;

use thiserror::Error;

/// Errors raised by containers, processes, HTTP helpers and test cases.
///
/// Test functions return `HarnessResult<()>`. The runner counts a panic or `Failed` as a *failure*, `Skipped` as a
/// skip, and any other `Err` as an *error*.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{kind} image {image} does not exist")]
    ImageNotFound { kind: String, image: String },

    #[error("container '{name}' is not started: cannot {action}")]
    NotStarted { name: String, action: String },

    #[error("cannot set {name} mounts after running")]
    AlreadyStarted { name: String },

    #[error("container runtime error: {0}")]
    Runtime(String),

    #[error("process '{name}' failed: {message}")]
    Process { name: String, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("mock server error: {0}")]
    Mock(#[from] itkit_mock::MockError),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Failed(String),

    #[error("skipped: {0}")]
    Skipped(String),
}

impl HarnessError {
    pub fn runtime(message: impl ToString) -> Self {
        HarnessError::Runtime(message.to_string())
    }

    /// Convenience for a test that decides at run time it cannot proceed.
    pub fn skip(reason: impl Into<String>) -> Self {
        HarnessError::Skipped(reason.into())
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = HarnessError::ImageNotFound {
            kind: "PetStore".into(),
            image: "openapi-petstore:1".into(),
        };
        assert_eq!(err.to_string(), "PetStore image openapi-petstore:1 does not exist");

        let err = HarnessError::NotStarted {
            name: "db".into(),
            action: "run 'ls'".into(),
        };
        assert_eq!(err.to_string(), "container 'db' is not started: cannot run 'ls'");
    }

    #[test]
    fn test_skip_helper() {
        assert!(matches!(HarnessError::skip("no docker"), HarnessError::Skipped(r) if r == "no docker"));
    }
}
