//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::io;
use std::path::Path;

use itkit_mock::{ServerConfig, load_responses, start_server};
use tracing::Level;

use super::{CliError, CliResult, ExitCode};
use crate::cleanup::{Cleanup, CleanupArgs, DEFAULT_DESCRIPTION};
use crate::container::{self, ContainerRuntime, DockerRuntime};

// ============================================================================
// cleanup
// ============================================================================

pub fn cleanup(args: &CleanupArgs) -> CliResult<ExitCode> {
    if args.filter.is_empty() {
        return Err(CliError::new(
            "Error: no container prefixes given; pass --filter PREFIX...",
            ExitCode::USAGE,
        ));
    }
    let runtime = DockerRuntime::connect()?;
    Cleanup::new(DEFAULT_DESCRIPTION, Vec::<String>::new()).execute(&runtime, args, &mut io::stdin().lock())?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// serve
// ============================================================================

pub fn serve(responses: &Path, host: &str, port: u16) -> CliResult<ExitCode> {
    let table = load_responses(responses)
        .map_err(|e| CliError::failure(format!("Error reading '{}': {}", responses.display(), e)))?;

    let config = ServerConfig::default()
        .with_host(host)
        .with_port(port)
        .with_log_level(Level::INFO);
    let mut server = start_server(config).map_err(|e| CliError::failure(format!("Error: {e}")))?;
    server.set_response_data(table);
    println!("Serving {} on {} (Ctrl-C to stop)", responses.display(), server.base_url());

    wait_for_interrupt()?;

    for (path, count) in server.get_statistics() {
        println!("{path}: {count}");
    }
    server
        .shutdown()
        .map_err(|e| CliError::failure(format!("Error stopping the server: {e}")))?;
    Ok(ExitCode::SUCCESS)
}

fn wait_for_interrupt() -> CliResult<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failure(format!("Error starting the signal handler: {e}")))?;
    rt.block_on(tokio::signal::ctrl_c())
        .map_err(|e| CliError::failure(format!("Error waiting for Ctrl-C: {e}")))
}

// ============================================================================
// last-built
// ============================================================================

pub fn last_built(base: &str) -> CliResult<ExitCode> {
    let runtime = DockerRuntime::connect()?;
    print_last_built(&runtime, base)
}

fn print_last_built(runtime: &dyn ContainerRuntime, base: &str) -> CliResult<ExitCode> {
    match container::last_built(runtime, base)? {
        Some(tag) => {
            println!("{tag}");
            Ok(ExitCode::SUCCESS)
        }
        None => Err(CliError::failure(format!("No image matching '{base}'"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::container::FakeRuntime;

    #[test]
    fn test_print_last_built() {
        let fake = FakeRuntime::new().with_image("petstore:1.0", 1).with_image("petstore:1.1", 2);
        assert_eq!(print_last_built(&fake, "petstore").unwrap(), ExitCode::SUCCESS);

        let err = print_last_built(&fake, "redis").unwrap_err();
        assert_eq!(err.exit_code, ExitCode::FAILURE);
        assert!(err.message.contains("redis"));
    }

    #[test]
    fn test_cleanup_requires_prefixes() {
        let err = cleanup(&CleanupArgs::default()).unwrap_err();
        assert_eq!(err.exit_code, ExitCode::USAGE);
    }

    #[test]
    fn test_serve_reports_unreadable_table() {
        let err = serve(Path::new("/nonexistent/itkit/responses.json"), "127.0.0.1", 0).unwrap_err();
        assert!(err.message.contains("responses.json"));
    }
}
