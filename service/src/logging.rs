use crate::config::Config;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Targets of the database driver and the HTTP/WebSocket stack. They log every
/// query and frame, burying the relay's own `feed`, `relay` and `web` lines,
/// so they are only let through at Trace.
const DEPENDENCY_TARGETS: &[&str] = &[
    "sqlx",
    "tokio_tungstenite",
    "tungstenite",
    "hyper",
    "axum",
    "tower",
];

pub struct Logger {}

impl Logger {
    /// Installs the terminal logger at the configured level.
    ///
    /// At Info the log shows provisioning, server start and stop, subscriber
    /// connects and disconnects, and change feed reconnects. Debug adds feed
    /// state transitions; Trace adds every relayed payload.
    pub fn init_logger(config: &Config) {
        let level = config.log_level_filter;

        if let Err(e) = TermLogger::init(
            level,
            Self::log_config(level),
            TerminalMode::Mixed,
            ColorChoice::Auto,
        ) {
            eprintln!("Terminal logger not installed, running without logs: {e}");
        }
    }

    fn log_config(level: LevelFilter) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();

        if Self::hides_dependencies(level) {
            for target in DEPENDENCY_TARGETS {
                builder.add_filter_ignore_str(target);
            }
        }

        builder.build()
    }

    fn hides_dependencies(level: LevelFilter) -> bool {
        level < LevelFilter::Trace
    }
}
