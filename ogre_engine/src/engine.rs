//! Process-wide logging facade
//!
//! Every engine subsystem lives in an explicit [`Root`](crate::root::Root)
//! context; the only remaining global is the log sink used by the
//! `engine_*!` macros, so that code with no access to a context can still
//! report errors.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::config::Environment;
use crate::log::{ConsoleLogger, LogEntry, LogSeverity, Logger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with a ConsoleLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Minimum severity forwarded to the logger (stored as `LogSeverity::level`)
static MIN_SEVERITY: OnceLock<AtomicU8> = OnceLock::new();

fn logger_lock() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(ConsoleLogger::new())))
}

fn min_severity_cell() -> &'static AtomicU8 {
    MIN_SEVERITY.get_or_init(|| AtomicU8::new(default_min_severity().level() as u8))
}

/// Threshold taken from `OGRE_MIN_LOGLEVEL`, Normal when unset
fn default_min_severity() -> LogSeverity {
    Environment::from_env()
        .min_log_level
        .map(LogSeverity::from_level)
        .unwrap_or(LogSeverity::Normal)
}

// ===== PUBLIC API =====

/// Global logging facade
///
/// # Example
///
/// ```no_run
/// use ogre_engine::ogre::{Engine, log::{FileLogger, LogSeverity}};
///
/// Engine::set_logger(FileLogger::create("ogre.log")?);
/// Engine::set_min_severity(LogSeverity::Trivial);
/// # Ok::<(), ogre_engine::ogre::Error>(())
/// ```
pub struct Engine;

impl Engine {
    /// Replace the global logger
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset the logger to a console logger and the threshold to its
    /// environment default
    pub fn reset_logger() {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(ConsoleLogger::new());
        }
        Self::set_min_severity(default_min_severity());
    }

    /// Set the minimum severity forwarded to the logger
    pub fn set_min_severity(severity: LogSeverity) {
        min_severity_cell().store(severity.level() as u8, Ordering::Relaxed);
    }

    /// Current minimum severity
    pub fn min_severity() -> LogSeverity {
        LogSeverity::from_level(min_severity_cell().load(Ordering::Relaxed) as i32)
    }

    /// Log a message without file:line (used by engine_info!, engine_warn!, ...)
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        Self::dispatch(LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: None,
            line: None,
        });
    }

    /// Log a message with file:line (used by engine_error! and the error macros)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        Self::dispatch(LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: Some(file),
            line: Some(line),
        });
    }

    fn dispatch(entry: LogEntry) {
        if entry.severity < Self::min_severity() {
            return;
        }
        if let Ok(lock) = logger_lock().read() {
            lock.log(&entry);
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
