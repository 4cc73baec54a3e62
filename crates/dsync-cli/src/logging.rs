//! Subscriber setup

use tracing_subscriber::EnvFilter;

/// Install the global `fmt` subscriber
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` for dsync crates
/// when verbose.
pub(crate) fn init(verbose: bool) {
    let fallback = if verbose {
        "info,dsync_core=debug,dsync_aws=debug,dsync=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_target(verbose)
        .init();
}
