// src/logging.rs

//! Logging setup for `plangraph`.
//!
//! The level comes from the first of:
//! 1. the `--log-level` flag,
//! 2. the `PLANGRAPH_LOG` environment variable (any `EnvFilter` directive,
//!    e.g. `plangraph::planning=debug`),
//! 3. `[network].log_level` in the network description.
//!
//! The description is only read after logging is up, so the subscriber starts
//! at `info` and is reloaded once the description names a level.

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "PLANGRAPH_LOG";
const DEFAULT_LEVEL: &str = "info";

/// Where the active filter came from.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Origin {
    Cli,
    Env,
    Default,
}

/// Handle on the installed subscriber's filter.
pub struct LogHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    origin: Origin,
}

/// Install the global subscriber, writing to stderr.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<LogHandle> {
    let env = std::env::var(LOG_ENV).ok();
    let (directive, origin) = initial_directive(cli_level, env.as_deref());
    let (filter, handle) = reload::Layer::new(EnvFilter::try_new(&directive)?);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .try_init()?;

    Ok(LogHandle { handle, origin })
}

impl LogHandle {
    /// Switch to the level named by the network description, unless the
    /// command line or the environment already chose one.
    pub fn apply_network_level(&self, level: Option<&str>) -> Result<()> {
        let Some(level) = level.filter(|_| self.origin == Origin::Default) else {
            return Ok(());
        };
        self.handle.reload(EnvFilter::try_new(level.trim().to_lowercase())?)?;
        debug!(network_level = %level, "log level taken from the network description");
        Ok(())
    }
}

fn initial_directive(cli_level: Option<LogLevel>, env: Option<&str>) -> (String, Origin) {
    if let Some(level) = cli_level {
        return (directive_for(level).to_string(), Origin::Cli);
    }
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directive) => (directive.to_string(), Origin::Env),
        None => (DEFAULT_LEVEL.to_string(), Origin::Default),
    }
}

fn directive_for(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_wins_over_environment() {
        let (directive, origin) = initial_directive(Some(LogLevel::Trace), Some("warn"));
        assert_eq!(directive, "trace");
        assert_eq!(origin, Origin::Cli);
    }

    #[test]
    fn environment_takes_full_directives() {
        let (directive, origin) = initial_directive(None, Some(" plangraph::planning=debug "));
        assert_eq!(directive, "plangraph::planning=debug");
        assert_eq!(origin, Origin::Env);
        assert!(EnvFilter::try_new(&directive).is_ok());
    }

    #[test]
    fn blank_environment_falls_back_to_info() {
        assert_eq!(initial_directive(None, Some("  ")), ("info".to_string(), Origin::Default));
        assert_eq!(initial_directive(None, None).1, Origin::Default);
    }
}
