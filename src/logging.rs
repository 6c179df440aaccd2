//! Logging init for the command-line binary.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,session_harvest=info";

/// Install a stderr `tracing` subscriber filtered by `RUST_LOG`.
///
/// `verbose` raises the crate's own level to debug. Calling this twice is
/// harmless; the second call leaves the first subscriber in place.
pub fn init_logging(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,session_harvest=debug")
        } else {
            EnvFilter::new(DEFAULT_FILTER)
        }
    });

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
