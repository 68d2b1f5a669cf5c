use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log layer, selected through `RUST_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    fn from_env() -> Self {
        match var("RUST_LOG_FORMAT") {
            Ok(value) => Self::parse(&value),
            Err(error) => {
                warn!("Failed to read RUST_LOG_FORMAT, falling back to default: {error}");
                Self::default()
            }
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Install the global subscriber at INFO, honouring `RUST_LOG` and `RUST_LOG_FORMAT`.
pub fn init_tracing() {
    init_tracing_with(LevelFilter::INFO, LogFormat::from_env());
}

/// Install the global subscriber with an explicit default level and format.
///
/// `RUST_LOG` directives still take precedence over `level`. Calling this
/// twice is harmless: the second registration is ignored.
pub fn init_tracing_with(level: LevelFilter, format: LogFormat) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().with_filter(env_filter).boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(true)
            .with_filter(env_filter)
            .boxed(),
    };

    let _ = tracing_subscriber::registry().with(log_layer).try_init();
}
