//! Canned response definitions.
//!
//! A `ResponseTable` maps a path to a map of HTTP method to `ResponseInfo`. Tests usually build one through
//! `ServerResponses`, which keeps a common base path out of every call site.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use itkit_core::constants::APP_JSON;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MockResult;

/// Path -> method -> response.
pub type ResponseTable = BTreeMap<String, BTreeMap<String, ResponseInfo>>;

/// How the server answers one method on one path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseInfo {
    pub status: u16,
    pub headers: Option<BTreeMap<String, String>>,
    /// Serialized as JSON on the wire, so a string body arrives quoted.
    pub body: Option<Value>,
    /// When set, the file's bytes replace the body.
    pub filename: Option<PathBuf>,
    /// `None` falls back to `text/html; charset=utf-8`.
    pub content_type: Option<String>,
    /// Store the request's JSON body for `get_request_data`.
    pub capture: bool,
}

impl Default for ResponseInfo {
    fn default() -> Self {
        Self {
            status: 200,
            headers: None,
            body: None,
            filename: None,
            content_type: Some(APP_JSON.to_string()),
            capture: false,
        }
    }
}

impl ResponseInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// A 200 response carrying `body`.
    pub fn json(body: impl Into<Value>) -> Self {
        Self::default().with_body(body)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.get_or_insert_with(BTreeMap::new).insert(name.into(), value.into());
        self
    }

    pub fn with_file(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_content_type(mut self, content_type: Option<&str>) -> Self {
        self.content_type = content_type.map(str::to_string);
        self
    }

    pub fn capturing(mut self) -> Self {
        self.capture = true;
        self
    }
}

/// Builder for a `ResponseTable` rooted at an optional base path.
#[derive(Debug, Clone, Default)]
pub struct ServerResponses {
    base_path: String,
    responses: ResponseTable,
}

impl ServerResponses {
    pub fn new(base_path: &str) -> Self {
        Self {
            base_path: base_path.trim_matches('/').to_string(),
            responses: ResponseTable::new(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Prefix `path` with the base path unless it already lies under it.
    pub fn full_path(&self, path: &str) -> String {
        let under_base = path
            .strip_prefix(self.base_path.as_str())
            .is_some_and(|rest| self.base_path.is_empty() || rest.is_empty() || rest.starts_with('/'));
        if under_base {
            return path.to_string();
        }
        format!("{}/{}", self.base_path, path.trim_matches('/'))
    }

    /// Register `info` for `method` on `path`, replacing any previous entry.
    pub fn add_response(&mut self, path: &str, method: &str, info: ResponseInfo) -> &mut Self {
        let full_path = self.full_path(path);
        self.responses.entry(full_path).or_default().insert(method.to_string(), info);
        self
    }

    /// The table in the shape the server consumes.
    pub fn for_server(&self) -> ResponseTable {
        self.responses.clone()
    }
}

/// Read a response table from a JSON file.
pub fn load_responses(path: &Path) -> MockResult<ResponseTable> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_response_info() {
        let info = ResponseInfo::default();
        assert_eq!(info.status, 200);
        assert_eq!(info.content_type.as_deref(), Some(APP_JSON));
        assert!(info.body.is_none());
        assert!(!info.capture);
    }

    #[test]
    fn test_builder_methods() {
        let info = ResponseInfo::json(json!({"id": 7}))
            .with_status(201)
            .with_header("X-Request-Id", "abc")
            .with_content_type(None)
            .capturing();
        assert_eq!(info.status, 201);
        assert_eq!(info.body, Some(json!({"id": 7})));
        assert_eq!(info.headers.unwrap().get("X-Request-Id").map(String::as_str), Some("abc"));
        assert!(info.content_type.is_none());
        assert!(info.capture);
    }

    #[test]
    fn test_full_path_without_base() {
        let responses = ServerResponses::new("");
        assert_eq!(responses.full_path("sna/foo"), "sna/foo");
    }

    #[test]
    fn test_full_path_prepends_base() {
        let responses = ServerResponses::new("/api/v1/");
        assert_eq!(responses.base_path(), "api/v1");
        assert_eq!(responses.full_path("/users/"), "api/v1/users");
        assert_eq!(responses.full_path("api/v1/users"), "api/v1/users");
    }

    #[test]
    fn test_full_path_needs_segment_boundary() {
        let responses = ServerResponses::new("api");
        assert_eq!(responses.full_path("apiary"), "api/apiary");
        assert_eq!(responses.full_path("api"), "api");
        assert_eq!(responses.full_path("api/pets"), "api/pets");
        assert_eq!(ServerResponses::new("").full_path("sna/foo"), "sna/foo");
    }

    #[test]
    fn test_add_response_groups_methods_by_path() {
        let mut responses = ServerResponses::new("api");
        responses
            .add_response("pets", "GET", ResponseInfo::json(json!([])))
            .add_response("pets", "POST", ResponseInfo::new().with_status(201));
        let table = responses.for_server();
        assert_eq!(table.len(), 1);
        let methods = &table["api/pets"];
        assert_eq!(methods.len(), 2);
        assert_eq!(methods["POST"].status, 201);
    }

    #[test]
    fn test_add_response_replaces_existing_method() {
        let mut responses = ServerResponses::new("");
        responses.add_response("a", "GET", ResponseInfo::new().with_status(500));
        responses.add_response("a", "GET", ResponseInfo::new().with_status(204));
        assert_eq!(responses.for_server()["a"]["GET"].status, 204);
    }

    #[test]
    fn test_deserialize_partial_entry_uses_defaults() {
        let table: ResponseTable =
            serde_json::from_value(json!({"pets": {"GET": {"body": ["rex"]}, "DELETE": {"content_type": null}}}))
                .unwrap();
        let get = &table["pets"]["GET"];
        assert_eq!(get.status, 200);
        assert_eq!(get.content_type.as_deref(), Some(APP_JSON));
        assert!(table["pets"]["DELETE"].content_type.is_none());
    }

    #[test]
    fn test_load_responses_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("responses.json");
        fs::write(&path, r#"{"health": {"GET": {"body": "ok", "content_type": "text/plain"}}}"#).unwrap();
        let table = load_responses(&path).unwrap();
        assert_eq!(table["health"]["GET"].content_type.as_deref(), Some("text/plain"));
    }
}
