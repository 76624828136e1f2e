//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

use crate::config::Settings;

/// Installs a stderr fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug = true` forces `debug` and the
/// configured `logging.level` applies. Calling it twice is harmless.
pub fn init(settings: &Settings) {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if settings.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&settings.logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    // Already set in tests or by an embedding application.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
