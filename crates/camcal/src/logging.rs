//! Log output for the `camcal` binary.
//!
//! The library crates only emit `log` records (and `tracing` spans with the
//! `tracing` feature). [`init_logging`] bridges those records into a
//! `tracing-subscriber` formatter writing to stderr.

use log::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("log bridge already installed: {0}")]
    Bridge(#[from] log::SetLoggerError),
    #[error("global subscriber already installed: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

/// Map a `-v` count to a level: 0 → warn, 1 → info, 2 → debug, more → trace.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn default_directive(level: LevelFilter) -> String {
    level.as_str().to_ascii_lowercase()
}

/// `RUST_LOG` when set and valid, otherwise `level` for every target.
pub fn env_filter(level: LevelFilter) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(level)))
}

/// Install the stderr subscriber. `json` switches to one JSON object per event
/// with span-close timings.
pub fn init_logging(level: LevelFilter, json: bool) -> Result<(), LoggingError> {
    tracing_log::LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()?;

    let builder = fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE);
    if json {
        builder.json().flatten_event(true).finish().try_init()?;
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_from_verbosity(0), LevelFilter::Warn);
        assert_eq!(level_from_verbosity(2), LevelFilter::Debug);
        assert_eq!(level_from_verbosity(9), LevelFilter::Trace);
    }

    #[test]
    fn fallback_directive_names_the_level() {
        assert_eq!(default_directive(LevelFilter::Warn), "warn");
        assert_eq!(default_directive(LevelFilter::Off), "off");
    }
}
