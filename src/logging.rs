use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "GLT_LOG";

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,glt=info",
        2 => "warn,glt=debug",
        _ => "debug",
    }
}

/// Diagnostics go to stderr so stdout carries nothing but trace output.
///
/// `-v` flags win over `GLT_LOG`, which wins over `RUST_LOG`.
pub fn init(verbosity: u8) {
    let filter = if verbosity > 0 {
        EnvFilter::new(default_directive(verbosity))
    } else {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new(default_directive(0)))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
