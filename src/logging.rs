use miette::IntoDiagnostic;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Log to stderr, keeping stdout for command output.
///
/// `RUST_LOG` wins over the configured filter; `-v` and `-vv` win over both.
pub fn init(configured: &str, verbose: u8) -> miette::Result<()> {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(configured)).into_diagnostic()?,
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose > 0))
        .try_init()
        .into_diagnostic()
}
