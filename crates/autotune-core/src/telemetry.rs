//! Log output for the `autotune` CLI.
//!
//! Subcommands print their result (detection plans, strategy outcomes, run
//! reports) as JSON on stdout so it can be piped into other tools. Log lines
//! therefore never touch stdout: they go to stderr, as text by default or as
//! one JSON object per line with `--json`. `RUST_LOG` overrides the level
//! picked from `--verbose`.

use std::io::IsTerminal;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the process-wide subscriber writing to stderr.
///
/// Colours are only used for text output on a terminal. A second call is a
/// no-op, which lets tests and the binary both call it.
pub fn init_tracing(json: bool, level: Level) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let json_layer = json.then(|| {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .json()
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .with_ansi(std::io::stderr().is_terminal())
            .with_writer(std::io::stderr)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_ignored() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
        tracing::info!(event = "telemetry_ready", "subscriber installed");
    }
}
