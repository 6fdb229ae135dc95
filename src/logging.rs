#![cfg(feature = "std")]

use std::env;
use std::io::Write;

use log::{LevelFilter, Metadata, Record};

/// Writes records to stderr; stdout is left to the CLI's JSON summary.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let target = record.target().strip_prefix("vsp_transfer::").unwrap_or(record.target());
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{:<5} {}] {}",
            record.level(),
            target,
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

/// Parse a `VSP_LOG` value such as `debug` or `off`.
fn level_from(value: Option<String>) -> LevelFilter {
    value
        .and_then(|lvl| lvl.trim().parse().ok())
        .unwrap_or(LevelFilter::Info)
}

/// Initialize logging with a level taken from the `VSP_LOG` environment variable.
/// Defaults to `info` if the variable is not set or invalid. Calling it again
/// leaves the first logger in place.
pub fn init_logging() {
    let level = level_from(env::var("VSP_LOG").ok());
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
