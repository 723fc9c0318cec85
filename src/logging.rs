// Diagnostic logging setup for the pocscan binary
// Scan results go to stdout; tracing output goes to stderr

use std::io;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "POCSCAN_LOG";

/// Filter directive: RUST_LOG, then POCSCAN_LOG, then the given level for
/// this crate.
pub fn filter_directive(level: &str) -> String {
    std::env::var("RUST_LOG")
        .or_else(|_| std::env::var(LOG_ENV))
        .unwrap_or_else(|_| format!("{}={}", env!("CARGO_CRATE_NAME"), level))
}

/// Install the global subscriber. `verbose` overrides the environment.
pub fn init_logging(verbose: bool, level: Option<&str>) {
    let directive = if verbose {
        format!("{}=debug", env!("CARGO_CRATE_NAME"))
    } else {
        filter_directive(level.unwrap_or("info"))
    };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .try_init();
}
