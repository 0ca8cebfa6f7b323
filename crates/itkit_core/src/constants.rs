//! Default timings, environment variable names and standard REST headers.

use std::time::Duration;

// Container readiness polling (see `wait_for_ready`)
pub const DEFAULT_CONTAINER_POLL_START: Duration = Duration::from_millis(500);
pub const DEFAULT_CONTAINER_POLL_MAX: Duration = Duration::from_secs(2);
pub const DEFAULT_CONTAINER_POLL_MIN: Duration = Duration::from_millis(250);
pub const DEFAULT_CONTAINER_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP request timeout for `curl`. Kept short so a dead endpoint does not stall a test.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(500);

// Environment variables read by the harness
pub const ITKIT_CAPTURE: &str = "ITKIT_TEST_CAPTURE";
pub const ITKIT_JOB_ID: &str = "ITKIT_TEST_JOB_ID";
pub const ITKIT_KNOWN_ISSUES: &str = "ITKIT_TEST_KNOWN_ISSUES";
pub const ITKIT_PRINT_COMMANDS: &str = "ITKIT_TEST_LOG_COMMANDS";
pub const ITKIT_PRINT_OUTPUT: &str = "ITKIT_TEST_LOG_OUTPUT";

pub const HDR_ACCEPT: &str = "accept";
pub const HDR_CONTENT: &str = "Content-Type";

pub const ACCEPT_ANY: &str = "*/*";
pub const APP_JSON: &str = "application/json";

/// Headers sent with JSON REST requests.
pub fn default_headers() -> [(&'static str, &'static str); 2] {
    [(HDR_ACCEPT, APP_JSON), (HDR_CONTENT, APP_JSON)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_bounds_are_ordered() {
        assert!(DEFAULT_CONTAINER_POLL_MIN < DEFAULT_CONTAINER_POLL_START);
        assert!(DEFAULT_CONTAINER_POLL_START < DEFAULT_CONTAINER_POLL_MAX);
        assert!(DEFAULT_CONTAINER_POLL_MAX < DEFAULT_CONTAINER_READY_TIMEOUT);
    }

    #[test]
    fn test_default_headers_are_json() {
        let headers = default_headers();
        assert!(headers.iter().all(|(_, v)| *v == APP_JSON));
        assert_eq!(headers[0].0, HDR_ACCEPT);
        assert_eq!(headers[1].0, HDR_CONTENT);
    }
}
