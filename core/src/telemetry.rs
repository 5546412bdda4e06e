// Logging setup
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`, e.g.
/// `RUST_LOG=brewlink_core::spark=debug,info`.
///
/// # Example
///
/// ```no_run
/// use brewlink_core::telemetry::init_tracing;
///
/// fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     init_tracing()?;
///     Ok(())
/// }
/// ```
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()?;

    info!(target: "telemetry", "Tracing initialized");
    Ok(())
}
