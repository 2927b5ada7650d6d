use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence; otherwise remark logs at `info`, or at `debug`
/// (including per-request traces) when `verbose` is set.
pub fn init(verbose: bool) {
    let default = if verbose {
        "remark=debug,tower_http=debug"
    } else {
        "remark=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}
