//! Logging setup
//!
//! Records go to the session log file and, optionally, to stdout. The console gets coloured level
//! tags, the file gets plain ones so it can be grepped. Levels can be overridden per module, which
//! is how the control core's per-cycle `trace!` output is kept out of a trace level session:
//!
//! ```toml
//! level = "Trace"
//!
//! [modules]
//! "exo_lib::exo_ctrl" = "Debug"
//! ```

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{self, info, Level};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// Internal imports
use crate::session;

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Logging configuration, usually loaded from `logging.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level applied to every module without an override. Must be at least `Info`.
    pub level: LevelFilter,

    /// Per-module overrides, keyed by module path. Must be at least `Warn`.
    pub modules: BTreeMap<String, LevelFilter>,

    /// Echo records to stdout as well as the log file.
    pub console: bool,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors associated with initialising the logger.
#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("Expected a log level of at least `INFO`, found `{0}`")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Expected a log level of at least `WARN` for module `{0}`, found `{1}`")]
    InvalidModuleLogLevel(String, LevelFilter),

    #[error("Error initialising the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("An error occured while setting up the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl LogConfig {
    /// Console and file logging at the given level, with no overrides.
    pub fn with_level(level: LevelFilter) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Check that warnings and errors can never be filtered out.
    pub fn validate(&self) -> Result<(), LoggerInitError> {
        if self.level < Level::Info {
            return Err(LoggerInitError::InvalidMinLogLevel(self.level));
        }

        for (module, level) in &self.modules {
            if *level < Level::Warn {
                return Err(LoggerInitError::InvalidModuleLogLevel(
                    module.clone(),
                    *level,
                ));
            }
        }

        Ok(())
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            modules: BTreeMap::new(),
            console: true,
        }
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Initialise the logger for this execution.
///
/// # Safety
///
/// - This function must only be called once to prevent corrupting logs.
pub fn logger_init(
    config: &LogConfig,
    session: &session::Session,
) -> Result<(), LoggerInitError> {
    config.validate()?;

    let log_file = fern::log_file(session.log_file_path.clone())
        .map_err(LoggerInitError::LogFileInitError)?;

    let file = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{:10.6} {}] {}: {}",
                session::get_elapsed_seconds(),
                level_to_str(record.level()),
                record.target(),
                message
            ))
        })
        .chain(log_file);

    let mut root = fern::Dispatch::new().level(config.level);
    for (module, level) in &config.modules {
        root = root.level_for(module.clone(), *level);
    }
    root = root.chain(file);

    if config.console {
        let console = fern::Dispatch::new()
            .format(|out, message, record| {
                // If debug or trace include the target, otherwise don't include it
                if record.level() > Level::Info {
                    out.finish(format_args!(
                        "[{:10.6} {}] {}: {}",
                        session::get_elapsed_seconds(),
                        level_to_coloured(record.level()),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "[{:10.6} {}] {}",
                        session::get_elapsed_seconds(),
                        level_to_coloured(record.level()),
                        message
                    ))
                }
            })
            .chain(std::io::stdout());

        root = root.chain(console);
    }

    root.apply().map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    if let Some(epoch) = session::get_epoch() {
        info!("    Session epoch: {}", epoch);
    }
    info!("    Log level: {:?}", config.level);
    for (module, level) in &config.modules {
        info!("    {}: {:?}", module, level);
    }
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn level_to_str(level: Level) -> &'static str {
    match level {
        Level::Trace => "TRC",
        Level::Debug => "DBG",
        Level::Info => "INF",
        Level::Warn => "WRN",
        Level::Error => "ERR",
    }
}

fn level_to_coloured(level: Level) -> ColoredString {
    let tag = level_to_str(level);

    match level {
        Level::Trace => tag.dimmed().italic(),
        Level::Debug => tag.dimmed(),
        Level::Info => tag.normal(),
        Level::Warn => tag.yellow(),
        Level::Error => tag.red().bold(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params;

    #[test]
    fn test_validate_levels() {
        assert!(LogConfig::default().validate().is_ok());
        assert!(LogConfig::with_level(LevelFilter::Trace).validate().is_ok());

        assert!(matches!(
            LogConfig::with_level(LevelFilter::Warn).validate(),
            Err(LoggerInitError::InvalidMinLogLevel(LevelFilter::Warn))
        ));

        let mut config = LogConfig::with_level(LevelFilter::Trace);
        config
            .modules
            .insert("exo_lib::exo_ctrl".into(), LevelFilter::Warn);
        assert!(config.validate().is_ok());

        config
            .modules
            .insert("exo_lib::sim_hw".into(), LevelFilter::Off);
        assert!(matches!(
            config.validate(),
            Err(LoggerInitError::InvalidModuleLogLevel(m, LevelFilter::Off)) if m == "exo_lib::sim_hw"
        ));
    }

    #[test]
    fn test_parse_config() {
        let config: LogConfig = params::from_str(
            r#"
            level = "Trace"

            [modules]
            "exo_lib::exo_ctrl" = "Debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.level, LevelFilter::Trace);
        assert_eq!(
            config.modules.get("exo_lib::exo_ctrl"),
            Some(&LevelFilter::Debug)
        );
        assert!(config.console);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_level_tags() {
        assert_eq!(level_to_str(Level::Warn), "WRN");
        assert!(level_to_coloured(Level::Error).to_string().contains("ERR"));
    }
}
