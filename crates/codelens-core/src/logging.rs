use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, Registry};

use crate::config_manager::LoggingConfig;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. Output goes to stderr so
/// command output on stdout stays machine-readable. Calling this more than once is
/// harmless; later calls leave the first subscriber in place.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            let subscriber = Registry::default()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).json());
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        "compact" => {
            let subscriber = Registry::default()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact());
            tracing::subscriber::set_global_default(subscriber).ok();
        }
        _ => {
            let subscriber = Registry::default()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).pretty());
            tracing::subscriber::set_global_default(subscriber).ok();
        }
    }
}
