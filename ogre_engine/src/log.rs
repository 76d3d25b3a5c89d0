//! Logging system for the OGRE engine
//!
//! This module provides:
//! - The `Logger` trait for custom sinks
//! - Severity levels (Trivial, Normal, Warning, Critical)
//! - Console output with ANSI colour on xterm-like terminals
//! - File, fan-out and threshold-filtering sinks
//! - File and line information for Critical logs

use colored::*;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use chrono::{DateTime, Local};
use crate::error::Result;

/// Logger trait for custom logging implementations
///
/// # Example
///
/// ```no_run
/// use ogre_engine::ogre::log::{Logger, LogEntry};
///
/// struct NetworkLogger;
///
/// impl Logger for NetworkLogger {
///     fn log(&self, entry: &LogEntry) {
///         // Send somewhere...
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    /// Log an entry
    fn log(&self, entry: &LogEntry);
}

/// Log entry containing all information about a log message
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Severity level
    pub severity: LogSeverity,

    /// Timestamp when the log was created
    pub timestamp: SystemTime,

    /// Source module (e.g., "ogre::Root", "ogre::ResourceManager")
    pub source: String,

    /// Log message
    pub message: String,

    /// Source file (only for detailed Critical logs)
    pub file: Option<&'static str>,

    /// Source line (only for detailed Critical logs)
    pub line: Option<u32>,
}

/// Log severity levels, ordered from least to most important
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogSeverity {
    /// Verbose detail (per-frame events, cache hits)
    Trivial,

    /// Regular informational messages
    Normal,

    /// Something unexpected but recoverable
    Warning,

    /// Errors surfaced to the caller
    Critical,
}

impl LogSeverity {
    /// Map an integer log level (as found in `OGRE_MIN_LOGLEVEL`) to a severity.
    ///
    /// 1 = Trivial, 2 = Normal, 3 = Warning, 4 = Critical. Values outside the
    /// range are clamped.
    pub fn from_level(level: i32) -> Self {
        match level {
            i32::MIN..=1 => LogSeverity::Trivial,
            2 => LogSeverity::Normal,
            3 => LogSeverity::Warning,
            _ => LogSeverity::Critical,
        }
    }

    /// Integer level of this severity (inverse of `from_level`)
    pub fn level(self) -> i32 {
        match self {
            LogSeverity::Trivial => 1,
            LogSeverity::Normal => 2,
            LogSeverity::Warning => 3,
            LogSeverity::Critical => 4,
        }
    }

    /// Fixed-width tag used in formatted lines
    pub fn tag(self) -> &'static str {
        match self {
            LogSeverity::Trivial => "TRIVIAL ",
            LogSeverity::Normal => "NORMAL  ",
            LogSeverity::Warning => "WARNING ",
            LogSeverity::Critical => "CRITICAL",
        }
    }
}

/// Format an entry as a plain line (no colour, no trailing newline)
///
/// - Normal: `[timestamp] [SEVERITY] [source] message`
/// - Detailed: `[timestamp] [SEVERITY] [source] message (file:line)`
pub fn format_entry(entry: &LogEntry) -> String {
    let datetime: DateTime<Local> = entry.timestamp.into();
    let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

    match (entry.file, entry.line) {
        (Some(file), Some(line)) => format!(
            "[{}] [{}] [{}] {} ({}:{})",
            timestamp,
            entry.severity.tag(),
            entry.source,
            entry.message,
            file,
            line
        ),
        _ => format!(
            "[{}] [{}] [{}] {}",
            timestamp,
            entry.severity.tag(),
            entry.source,
            entry.message
        ),
    }
}

/// Whether a terminal type supports ANSI colour (`xterm*`)
pub fn terminal_supports_colour(term: Option<&str>) -> bool {
    term.map(|t| t.starts_with("xterm")).unwrap_or(false)
}

// ===== CONSOLE =====

/// Console logger
///
/// Colours (only when enabled):
/// - Trivial: bright black
/// - Normal: green
/// - Warning: yellow
/// - Critical: red + bold
pub struct ConsoleLogger {
    use_colour: bool,
}

impl ConsoleLogger {
    /// Create a console logger, enabling colour when `TERM` starts with `xterm`
    pub fn new() -> Self {
        let term = std::env::var("TERM").ok();
        Self {
            use_colour: terminal_supports_colour(term.as_deref()),
        }
    }

    /// Create a console logger with explicit colour choice
    pub fn with_colour(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub fn uses_colour(&self) -> bool {
        self.use_colour
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, entry: &LogEntry) {
        if !self.use_colour {
            println!("{}", format_entry(entry));
            return;
        }

        let datetime: DateTime<Local> = entry.timestamp.into();
        let timestamp = datetime.format("%Y-%m-%d %H:%M:%S%.3f").to_string();

        let severity_str = match entry.severity {
            LogSeverity::Trivial => entry.severity.tag().bright_black(),
            LogSeverity::Normal => entry.severity.tag().green(),
            LogSeverity::Warning => entry.severity.tag().yellow(),
            LogSeverity::Critical => entry.severity.tag().red().bold(),
        };
        let source = entry.source.bright_blue();

        if let (Some(file), Some(line)) = (entry.file, entry.line) {
            println!(
                "[{}] [{}] [{}] {} ({}:{})",
                timestamp, severity_str, source, entry.message, file, line
            );
        } else {
            println!("[{}] [{}] [{}] {}", timestamp, severity_str, source, entry.message);
        }
    }
}

// ===== FILE =====

/// Appends plain formatted lines to a log file
pub struct FileLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogger {
    /// Create (truncate) the log file at `path`
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    /// Open the log file at `path` for appending, creating it if missing
    pub fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Logger for FileLogger {
    fn log(&self, entry: &LogEntry) {
        if let Ok(mut file) = self.file.lock() {
            // A failing log sink has nowhere to report to
            let _ = writeln!(file, "{}", format_entry(entry));
            let _ = file.flush();
        }
    }
}

// ===== MULTI / FILTERED =====

/// Fans every entry out to several sinks, in registration order
#[derive(Default)]
pub struct MultiLogger {
    sinks: Vec<Box<dyn Logger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    /// Add a sink (builder style)
    pub fn with<L: Logger + 'static>(mut self, logger: L) -> Self {
        self.sinks.push(Box::new(logger));
        self
    }

    pub fn add<L: Logger + 'static>(&mut self, logger: L) {
        self.sinks.push(Box::new(logger));
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }
}

impl Logger for MultiLogger {
    fn log(&self, entry: &LogEntry) {
        for sink in &self.sinks {
            sink.log(entry);
        }
    }
}

/// Drops entries below a minimum severity before forwarding
pub struct FilteredLogger<L: Logger> {
    inner: L,
    min_severity: LogSeverity,
}

impl<L: Logger> FilteredLogger<L> {
    pub fn new(inner: L, min_severity: LogSeverity) -> Self {
        Self { inner, min_severity }
    }

    pub fn min_severity(&self) -> LogSeverity {
        self.min_severity
    }
}

impl<L: Logger> Logger for FilteredLogger<L> {
    fn log(&self, entry: &LogEntry) {
        if entry.severity >= self.min_severity {
            self.inner.log(entry);
        }
    }
}

// ===== LOGGING MACROS =====

/// Log a TRIVIAL message (very verbose)
///
/// # Example
///
/// ```no_run
/// ogre_engine::engine_trivial!("ogre::RenderQueue", "{} solids queued", 12);
/// ```
#[macro_export]
macro_rules! engine_trivial {
    ($source:expr, $($arg:tt)*) => {
        $crate::ogre::Engine::log(
            $crate::ogre::log::LogSeverity::Trivial,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a NORMAL message (important events)
///
/// # Example
///
/// ```no_run
/// ogre_engine::engine_info!("ogre::Root", "Render system '{}' initialised", "Mock");
/// ```
#[macro_export]
macro_rules! engine_info {
    ($source:expr, $($arg:tt)*) => {
        $crate::ogre::Engine::log(
            $crate::ogre::log::LogSeverity::Normal,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a WARNING message (potential issues)
///
/// # Example
///
/// ```no_run
/// ogre_engine::engine_warn!("ogre::Material", "'{}' has no supported technique", "Rock");
/// ```
#[macro_export]
macro_rules! engine_warn {
    ($source:expr, $($arg:tt)*) => {
        $crate::ogre::Engine::log(
            $crate::ogre::log::LogSeverity::Warning,
            $source,
            format!($($arg)*)
        )
    };
}

/// Log a CRITICAL message with file:line information
///
/// # Example
///
/// ```no_run
/// ogre_engine::engine_error!("ogre::Root", "Failed to initialise: {}", "no device");
/// ```
#[macro_export]
macro_rules! engine_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::ogre::Engine::log_detailed(
            $crate::ogre::log::LogSeverity::Critical,
            $source,
            format!($($arg)*),
            file!(),
            line!()
        )
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
