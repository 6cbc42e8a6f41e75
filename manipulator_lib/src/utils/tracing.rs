//! Tracing initialization shared by the supervisor, actuator and CLI binaries.
//!
//! Uses a thread-local subscriber so it does not fight dora's own global subscriber.

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

/// Installs a compact fmt subscriber for the current thread.
///
/// `RUST_LOG` overrides the level (default `info`). Keep the returned guard alive for the
/// lifetime of the node.
///
/// # Example
/// ```no_run
/// use manipulator_lib::init_tracing;
///
/// let _guard = init_tracing();
/// tracing::info!("supervisor starting");
/// ```
pub fn init_tracing() -> DefaultGuard {
    use tracing_subscriber::layer::SubscriberExt;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false);

    tracing::subscriber::set_default(
        tracing_subscriber::Registry::default()
            .with(env_filter)
            .with(fmt_layer),
    )
}
