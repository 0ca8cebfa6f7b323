//! HTTP helpers that report like shell commands.

use std::fmt;
use std::time::{Duration, Instant};

use itkit_core::CommandResult;
use itkit_core::constants::default_headers;
use reqwest::Method;
use reqwest::blocking::{Client, Response};
use serde_json::Value;

use crate::errors::{HarnessError, HarnessResult};

/// Keeps only the response lines a test cares about; `description` shows up in the command text.
pub struct LineFilter {
    description: String,
    keep: Box<dyn Fn(&str) -> bool + Send + Sync>,
}

impl LineFilter {
    pub fn new(description: impl Into<String>, keep: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            description: description.into(),
            keep: Box::new(keep),
        }
    }

    /// Lines containing `needle`, described as `| grep <needle>`.
    pub fn contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(format!("| grep {needle}"), move |line| line.contains(needle.as_str()))
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn keeps(&self, line: &str) -> bool {
        (self.keep)(line)
    }
}

impl fmt::Debug for LineFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LineFilter").field(&self.description).finish()
    }
}

fn parse_method(method: &str) -> HarnessResult<Method> {
    Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| HarnessError::Failed(format!("invalid HTTP method '{method}'")))
}

/// Issue a request and describe the outcome as a `CommandResult`.
///
/// `return_value` is 0 for a 2xx status and the status code otherwise; a transport failure gives -1 with the error
/// in stderr. Never returns an error.
pub fn curl(
    client: &Client,
    method: &str,
    url: &str,
    timeout: Duration,
    body: Option<&str>,
    filter: Option<&LineFilter>,
) -> CommandResult {
    let command = format!(
        "curl -X {} {} {}",
        method,
        url,
        filter.map(LineFilter::description).unwrap_or_default()
    );

    let start = Instant::now();
    let outcome = parse_method(method).and_then(|method| {
        let mut request = client.request(method, url).timeout(timeout);
        if let Some(body) = body {
            request = request.body(body.to_string());
        }
        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;
        Ok((status, text))
    });
    let elapsed = start.elapsed();

    let (return_value, mut stdout, stderr) = match outcome {
        Ok((status, text)) => {
            let rv = if status.is_success() { 0 } else { i32::from(status.as_u16()) };
            let stdout = if text.is_empty() {
                vec![String::new()]
            } else {
                text.split('\n').map(str::to_string).collect()
            };
            (rv, stdout, Vec::new())
        }
        Err(e) => (-1, Vec::new(), e.to_string().split('\n').map(str::to_string).collect()),
    };

    if let Some(filter) = filter {
        stdout.retain(|line| filter.keeps(line));
    }

    CommandResult::new(command, return_value, elapsed)
        .with_stdout(stdout)
        .with_stderr(stderr)
}

/// Send `body` as JSON with the default accept/content-type headers.
pub fn request_json(
    client: &Client,
    method: &str,
    url: &str,
    timeout: Duration,
    body: Option<&Value>,
) -> HarnessResult<Response> {
    let mut request = client.request(parse_method(method)?, url).timeout(timeout);
    for (name, value) in default_headers() {
        request = request.header(name, value);
    }
    if let Some(body) = body {
        request = request.body(serde_json::to_vec(body)?);
    }
    Ok(request.send()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use itkit_mock::{GET, POST, ResponseInfo, ServerConfig, ServerResponses, start_server};
    use serde_json::json;

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[test]
    fn test_curl_success_and_filter() {
        let server = start_server(ServerConfig::default()).unwrap();
        let mut responses = ServerResponses::new("");
        responses.add_response(
            "lines",
            GET,
            ResponseInfo::json("ignored")
                .with_file(write_temp("alpha\nbeta\nalphabet"))
                .with_content_type(Some("text/plain")),
        );
        server.set_response_data(responses.for_server());

        let url = format!("{}/lines", server.base_url());
        let filter = LineFilter::contains("alpha");
        let result = curl(&Client::new(), "get", &url, timeout(), None, Some(&filter));
        assert_eq!(result.return_value, 0);
        assert_eq!(result.stdout, vec!["alpha", "alphabet"]);
        assert_eq!(result.command, Some(format!("curl -X get {url} | grep alpha")));
    }

    #[test]
    fn test_curl_error_status_is_return_value() {
        let server = start_server(ServerConfig::default()).unwrap();
        let url = format!("{}/missing", server.base_url());
        let result = curl(&Client::new(), "GET", &url, timeout(), None, None);
        assert_eq!(result.return_value, 404);
        assert_eq!(result.out(), r#"{"error":"No path for missing"}"#);
    }

    #[test]
    fn test_curl_empty_body_is_one_blank_line() {
        let server = start_server(ServerConfig::default()).unwrap();
        let mut responses = ServerResponses::new("");
        responses.add_response("empty", GET, ResponseInfo::new().with_file(write_temp("")));
        server.set_response_data(responses.for_server());

        let url = format!("{}/empty", server.base_url());
        let result = curl(&Client::new(), "GET", &url, timeout(), None, None);
        assert_eq!(result.stdout, vec![""]);
    }

    #[test]
    fn test_curl_transport_error() {
        // nothing listens on a port that was just released
        let port = std::net::TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}/");
        let result = curl(&Client::new(), "GET", &url, timeout(), None, None);
        assert_eq!(result.return_value, -1);
        assert!(result.stdout.is_empty());
        assert!(!result.err().is_empty());
    }

    #[test]
    fn test_curl_invalid_method() {
        let result = curl(&Client::new(), "GE T", "http://127.0.0.1:1/", timeout(), None, None);
        assert_eq!(result.return_value, -1);
        assert!(result.err().contains("invalid HTTP method"));
    }

    #[test]
    fn test_request_json_sends_body() {
        let server = start_server(ServerConfig::default()).unwrap();
        let mut responses = ServerResponses::new("");
        responses.add_response("pets", POST, ResponseInfo::new().with_status(201).capturing());
        server.set_response_data(responses.for_server());

        let url = format!("{}/pets", server.base_url());
        let response = request_json(&Client::new(), "POST", &url, timeout(), Some(&json!({"name": "rex"}))).unwrap();
        assert_eq!(response.status().as_u16(), 201);
        assert_eq!(server.get_request_data("pets"), Some(json!({"name": "rex"})));
    }

    fn write_temp(content: &str) -> std::path::PathBuf {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), content).unwrap();
        let (_, path) = file.keep().unwrap();
        path
    }
}
