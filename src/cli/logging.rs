//! Logging initialization

/// Initialize logging to stderr.
///
/// `RUST_LOG` overrides the default filter; `-v` raises the default from
/// warnings to debug.
pub fn init_logging(verbose: bool) {
    let default_filter = if verbose { "kinship=debug" } else { "kinship=warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .without_time()
        .init();
}
