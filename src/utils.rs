#[cfg(feature = "logging")]
/// Install a default `tracing` subscriber reading `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();

    // A subscriber installed by the host application wins.
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }

    Ok(())
}
