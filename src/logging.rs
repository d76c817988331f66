use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::TracingFormat;
use crate::config::Config;

/// Install the global subscriber.
///
/// `RUST_LOG` wins when set; otherwise dependencies log at `warn` and this
/// crate at `config.log_level`.
pub fn setup_logging(config: &Config, tracing_format: TracingFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    match tracing_format {
        TracingFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).compact())
            .init(),
        TracingFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .json()
                    .flatten_event(true)
                    .with_current_span(false),
            )
            .init(),
    }
}

fn default_directives(base_level: &str) -> String {
    // sqlx echoes every statement at info
    format!("warn,kino={base_level},sqlx::query=warn")
}
