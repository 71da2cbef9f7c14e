use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the JSON subscriber filtered by `RUST_LOG`.
///
/// Returns false when a global subscriber was already set.
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .is_ok()
}
