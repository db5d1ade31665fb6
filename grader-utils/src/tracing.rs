use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Filtering follows `RUST_LOG`.
///
/// Calling it twice is harmless; the second call is ignored.
pub fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .event_format(fmt::format::Format::default().pretty())
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish()
        .with(ErrorLayer::default())
        .try_init();
}
