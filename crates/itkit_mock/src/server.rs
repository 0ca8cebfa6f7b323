//! Background-thread wrapper around the mock app.
//!
//! The listener is bound on the caller's thread so the address (including an ephemeral port) is known as soon as
//! `start_server` returns; the thread only runs the accept loop on its own tokio runtime.

use std::collections::BTreeMap;
use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use axum::Router;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::Level;

use crate::app::{MockApp, process_request};
use crate::error::{MockError, MockResult};
use crate::responses::ResponseTable;

/// Where and how the mock server listens.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// `0` picks an ephemeral port.
    pub port: u16,
    /// Level at which each handled request is logged.
    pub log_level: Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_level: Level::WARN,
        }
    }
}

impl ServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_log_level(mut self, level: Level) -> Self {
        self.log_level = level;
        self
    }
}

/// A running mock server. Shuts down when dropped.
pub struct MockServer {
    app: MockApp,
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<MockResult<()>>>,
}

/// Bind and start serving on a background thread.
pub fn start_server(config: ServerConfig) -> MockResult<MockServer> {
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&bind_addr).map_err(|source| MockError::Bind {
        addr: bind_addr.clone(),
        source,
    })?;
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;

    let app = MockApp::new(config.log_level);
    let router = Router::new().fallback(process_request).with_state(app.clone());
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let thread = thread::Builder::new()
        .name(format!("itkit-mock-{}", addr.port()))
        .spawn(move || serve(listener, router, shutdown_rx))?;

    tracing::debug!(%addr, "mock server started");
    Ok(MockServer {
        app,
        addr,
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    })
}

fn serve(listener: TcpListener, router: Router, shutdown: oneshot::Receiver<()>) -> MockResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(MockError::Runtime)?;

    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                // A dropped sender also means "stop".
                let _ = shutdown.await;
            })
            .await?;
        Ok::<(), MockError>(())
    })
}

impl MockServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Whether the serving thread is still alive.
    pub fn ready(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn app(&self) -> &MockApp {
        &self.app
    }

    pub fn set_response_data(&self, data: ResponseTable) {
        self.app.set_response_data(data);
    }

    pub fn get_request_data(&self, path: &str) -> Option<Value> {
        self.app.get_request_data(path)
    }

    pub fn get_statistics(&self) -> BTreeMap<String, u64> {
        self.app.get_statistics()
    }

    pub fn reset_statistics(&self) {
        self.app.reset_statistics();
    }

    /// Dump the statistics as pretty JSON to `<dir>/<name>.json`, one entry per line for easy diffing.
    pub fn write_statistics(&self, dir: &Path, name: &str) -> MockResult<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.json"));
        let text = serde_json::to_string_pretty(&self.get_statistics())?;
        fs::write(&path, text)?;
        Ok(path)
    }

    /// Stop accepting connections and wait for the thread to exit. Calling it twice is harmless.
    pub fn shutdown(&mut self) -> MockResult<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        let result = thread.join().map_err(|_| MockError::ThreadPanicked)?;
        tracing::debug!(addr = %self.addr, "mock server stopped");
        result
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(addr = %self.addr, "mock server shutdown failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 0);
        assert_eq!(config.log_level, Level::WARN);
    }

    #[test]
    fn test_start_assigns_ephemeral_port() {
        let mut server = start_server(ServerConfig::default()).unwrap();
        assert_ne!(server.addr().port(), 0);
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        assert!(server.ready());
        server.shutdown().unwrap();
        assert!(!server.ready());
        // second shutdown is a no-op
        server.shutdown().unwrap();
    }

    #[test]
    fn test_bind_failure_reports_address() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let err = match start_server(ServerConfig::default().with_port(port)) {
            Err(e) => e,
            Ok(_) => panic!("expected bind failure"),
        };
        assert!(matches!(err, MockError::Bind { .. }));
        assert!(err.to_string().contains(&format!("127.0.0.1:{port}")));
    }

    #[test]
    fn test_write_statistics() {
        let server = start_server(ServerConfig::default()).unwrap();
        server.app().handle("GET", "pets", b"");
        let dir = tempfile::tempdir().unwrap();
        let path = server.write_statistics(&dir.path().join("stats"), "test_pets").unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(text, "{\n  \"GET pets\": 1\n}");
    }
}
