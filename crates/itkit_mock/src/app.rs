//! Request handling and shared state of the mock server.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tracing::Level;

use crate::responses::{ResponseInfo, ResponseTable};

/// Content type used when a response explicitly clears it.
pub const FALLBACK_CONTENT_TYPE: &str = "text/html; charset=utf-8";

#[derive(Debug, Default)]
struct MockState {
    responses: ResponseTable,
    requests: HashMap<String, Value>,
    statistics: BTreeMap<String, u64>,
}

/// Shared handle to the server state. Cloning is cheap; all clones see the same data.
#[derive(Debug, Clone)]
pub struct MockApp {
    state: Arc<Mutex<MockState>>,
    log_level: Level,
}

/// A fully resolved answer, independent of the HTTP framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl MockResponse {
    fn error(status: u16, message: String) -> Self {
        Self {
            status,
            content_type: FALLBACK_CONTENT_TYPE.to_string(),
            headers: Vec::new(),
            body: json!({ "error": message }).to_string().into_bytes(),
        }
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Find `name` among the keys of `data`, ignoring case and leading/trailing slashes.
pub fn find_data<'a, V>(data: &'a BTreeMap<String, V>, name: &str) -> Option<&'a V> {
    let needle = normalize_key(name);
    data.iter().find(|(key, _)| normalize_key(key) == needle).map(|(_, value)| value)
}

fn normalize_key(key: &str) -> String {
    key.trim_matches('/').to_lowercase()
}

impl Default for MockApp {
    fn default() -> Self {
        Self::new(Level::WARN)
    }
}

impl MockApp {
    pub fn new(log_level: Level) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            log_level,
        }
    }

    // Every update is a single insert or assignment, so a poisoned lock still guards consistent data.
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_response_data(&self, data: ResponseTable) {
        self.state().responses = data;
    }

    /// Captured JSON body of the last request to `path`.
    pub fn get_request_data(&self, path: &str) -> Option<Value> {
        let state = self.state();
        let needle = normalize_key(path);
        state
            .requests
            .iter()
            .find(|(key, _)| normalize_key(key) == needle)
            .map(|(_, value)| value.clone())
    }

    /// Hit counts keyed by `"<METHOD> <path>"`.
    pub fn get_statistics(&self) -> BTreeMap<String, u64> {
        self.state().statistics.clone()
    }

    pub fn reset_statistics(&self) {
        self.state().statistics.clear();
    }

    /// Answer one request.
    ///
    /// `path` is the request path without its leading slash.
    pub fn handle(&self, method: &str, path: &str, body: &[u8]) -> MockResponse {
        let info = {
            let mut state = self.state();
            *state.statistics.entry(format!("{method} {path}")).or_insert(0) += 1;

            let Some(path_data) = find_data(&state.responses, path) else {
                return MockResponse::error(404, format!("No path for {path}"));
            };
            let Some(info) = find_data(path_data, method).cloned() else {
                return MockResponse::error(404, format!("No {method} method for path {path}"));
            };

            if info.capture {
                let captured = serde_json::from_slice(body)
                    .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
                state.requests.insert(path.to_string(), captured);
            }
            info
        };

        render(&info)
    }

    fn log_request(&self, method: &str, path: &str, status: u16) {
        match self.log_level {
            Level::ERROR => tracing::error!(method, path, status, "mock request"),
            Level::WARN => tracing::warn!(method, path, status, "mock request"),
            Level::INFO => tracing::info!(method, path, status, "mock request"),
            Level::DEBUG => tracing::debug!(method, path, status, "mock request"),
            _ => tracing::trace!(method, path, status, "mock request"),
        }
    }
}

fn render(info: &ResponseInfo) -> MockResponse {
    let body = match &info.filename {
        Some(filename) => match fs::read(filename) {
            Ok(bytes) => bytes,
            Err(e) => return MockResponse::error(500, format!("Cannot read {}: {}", filename.display(), e)),
        },
        None => serde_json::to_vec(&info.body).unwrap_or_default(),
    };

    MockResponse {
        status: info.status,
        content_type: info
            .content_type
            .clone()
            .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string()),
        headers: info
            .headers
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        body,
    }
}

impl IntoResponse for MockResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        for (name, value) in self.headers {
            match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "skipping invalid mock response header"),
            }
        }
        response
    }
}

/// Fallback handler: every method on every path lands here.
pub(crate) async fn process_request(State(app): State<MockApp>, method: Method, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().trim_start_matches('/');
    let answer = app.handle(method.as_str(), path, &body);
    app.log_request(method.as_str(), path, answer.status);
    answer.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::ServerResponses;
    use itkit_core::constants::APP_JSON;

    fn app_with(responses: &ServerResponses) -> MockApp {
        let app = MockApp::default();
        app.set_response_data(responses.for_server());
        app
    }

    #[test]
    fn test_find_data_ignores_case_and_slashes() {
        let mut data = BTreeMap::new();
        data.insert("/Sna/Foo/".to_string(), 1);
        assert_eq!(find_data(&data, "sna/foo"), Some(&1));
        assert_eq!(find_data(&data, "SNA/FOO/"), Some(&1));
        assert_eq!(find_data(&data, "sna"), None);
    }

    #[test]
    fn test_unknown_path_is_404() {
        let app = MockApp::default();
        let response = app.handle("GET", "some_url", b"");
        assert_eq!(response.status, 404);
        assert_eq!(response.text(), r#"{"error":"No path for some_url"}"#);
    }

    #[test]
    fn test_unknown_method_is_404() {
        let mut responses = ServerResponses::new("");
        responses.add_response("pets", "GET", ResponseInfo::json(json!([])));
        let app = app_with(&responses);
        let response = app.handle("DELETE", "pets", b"");
        assert_eq!(response.status, 404);
        assert_eq!(response.text(), r#"{"error":"No DELETE method for path pets"}"#);
    }

    #[test]
    fn test_json_body_and_default_content_type() {
        let mut responses = ServerResponses::new("");
        responses.add_response("sna/foo", "get", ResponseInfo::json(json!({"foo": "bar"})));
        let app = app_with(&responses);
        let response = app.handle("GET", "sna/foo", b"");
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type, APP_JSON);
        assert_eq!(response.text(), r#"{"foo":"bar"}"#);
    }

    #[test]
    fn test_string_body_is_json_encoded() {
        let mut responses = ServerResponses::new("");
        responses.add_response(
            "sna/foo",
            "GET",
            ResponseInfo::json("random string").with_content_type(Some("text/plain")),
        );
        let response = app_with(&responses).handle("GET", "sna/foo", b"");
        assert_eq!(response.text(), "\"random string\"");
        assert_eq!(response.content_type, "text/plain");
    }

    #[test]
    fn test_missing_body_is_null() {
        let mut responses = ServerResponses::new("");
        responses.add_response("empty", "GET", ResponseInfo::new().with_content_type(None));
        let response = app_with(&responses).handle("GET", "empty", b"");
        assert_eq!(response.text(), "null");
        assert_eq!(response.content_type, FALLBACK_CONTENT_TYPE);
    }

    #[test]
    fn test_file_body_replaces_json() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("payload.bin");
        fs::write(&file, [1u8, 2, 3]).unwrap();

        let mut responses = ServerResponses::new("");
        responses.add_response("download", "GET", ResponseInfo::json("ignored").with_file(&file));
        let response = app_with(&responses).handle("GET", "download", b"");
        assert_eq!(response.body, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_file_is_500() {
        let mut responses = ServerResponses::new("");
        responses.add_response("download", "GET", ResponseInfo::new().with_file("/nonexistent/itkit/file"));
        let response = app_with(&responses).handle("GET", "download", b"");
        assert_eq!(response.status, 500);
    }

    #[test]
    fn test_capture_stores_request_body() {
        let mut responses = ServerResponses::new("");
        responses.add_response("users", "POST", ResponseInfo::new().capturing());
        responses.add_response("plain", "POST", ResponseInfo::new().capturing());
        responses.add_response("ignored", "POST", ResponseInfo::new());
        let app = app_with(&responses);

        app.handle("POST", "users", br#"{"name": "rick"}"#);
        app.handle("POST", "plain", b"not json");
        app.handle("POST", "ignored", br#"{"a": 1}"#);

        assert_eq!(app.get_request_data("/USERS/"), Some(json!({"name": "rick"})));
        assert_eq!(app.get_request_data("plain"), Some(json!("not json")));
        assert_eq!(app.get_request_data("ignored"), None);
    }

    #[test]
    fn test_statistics_count_every_request() {
        let mut responses = ServerResponses::new("");
        responses.add_response("pets", "GET", ResponseInfo::json(json!([])));
        let app = app_with(&responses);

        app.handle("GET", "pets", b"");
        app.handle("GET", "pets", b"");
        app.handle("POST", "pets", b"");
        app.handle("GET", "unknown", b"");

        let stats = app.get_statistics();
        assert_eq!(stats["GET pets"], 2);
        assert_eq!(stats["POST pets"], 1);
        assert_eq!(stats["GET unknown"], 1);

        app.reset_statistics();
        assert!(app.get_statistics().is_empty());
    }

    #[test]
    fn test_headers_are_copied() {
        let mut responses = ServerResponses::new("");
        responses.add_response("h", "GET", ResponseInfo::new().with_header("X-Mock", "yes"));
        let response = app_with(&responses).handle("GET", "h", b"");
        assert_eq!(response.headers, vec![("X-Mock".to_string(), "yes".to_string())]);
    }

    #[test]
    fn test_into_response_invalid_status_is_500() {
        let response = MockResponse {
            status: 1000,
            content_type: APP_JSON.to_string(),
            headers: vec![],
            body: vec![],
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
