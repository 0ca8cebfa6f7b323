//! itkit CLI entry point

fn main() {
    // Structured logging filtered by RUST_LOG, defaulting to info
    itkit::logging::init("info");

    itkit::cli::run();
}
