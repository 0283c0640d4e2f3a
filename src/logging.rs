use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// Everything goes to stderr: stdout carries the JSON protocol and must stay
/// clean. Level comes from `ROLLCALLD_LOG` (standard EnvFilter directives),
/// defaulting to `info`.
pub fn init() {
    let filter = EnvFilter::try_from_env("ROLLCALLD_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}
