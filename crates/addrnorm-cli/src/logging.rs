//! Tracing subscriber setup.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter directive for a verbosity choice.
fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if quiet {
        "addrnorm=warn"
    } else if verbose {
        "addrnorm=debug"
    } else {
        "addrnorm=info"
    }
}

/// Install a stderr subscriber. `RUST_LOG` overrides the verbosity flags.
pub fn init_logging(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let console_layer = fmt::layer()
        .with_target(verbose)
        .with_writer(std::io::stderr);

    // A second init (tests) is harmless.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}
