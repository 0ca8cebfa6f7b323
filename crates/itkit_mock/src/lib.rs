//! Mock HTTP server for integration tests.
//!
//! The server answers every method on every path from a table of canned responses, keeps per-route hit counts and
//! optionally captures request bodies so a test can assert on what its client sent.
//!
//! Provided types:
//! - `ResponseInfo` / `ServerResponses` (building the response table)
//! - `MockApp` (request handling, shared state)
//! - `MockServer` (thread wrapper with its own tokio runtime; `start_server` entrypoint)

pub mod app;
pub mod error;
pub mod responses;
pub mod server;

pub use app::{MockApp, MockResponse};
pub use error::{MockError, MockResult};
pub use responses::{ResponseInfo, ResponseTable, ServerResponses, load_responses};
pub use server::{MockServer, ServerConfig, start_server};

pub const GET: &str = "GET";
pub const POST: &str = "POST";
pub const PUT: &str = "PUT";
pub const PATCH: &str = "PATCH";
pub const DELETE: &str = "DELETE";
pub const OPTIONS: &str = "OPTIONS";
pub const TRACE: &str = "TRACE";
