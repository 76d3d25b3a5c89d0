//! Unit tests for log.rs
//!
//! Tests Logger trait, LogEntry, LogSeverity and the provided sinks.

use crate::log::{
    format_entry, terminal_supports_colour, ConsoleLogger, FileLogger, FilteredLogger, LogEntry,
    LogSeverity, Logger, MultiLogger,
};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

// ============================================================================
// TEST HELPERS
// ============================================================================

fn entry(severity: LogSeverity, message: &str) -> LogEntry {
    LogEntry {
        severity,
        timestamp: SystemTime::now(),
        source: "ogre::test".to_string(),
        message: message.to_string(),
        file: None,
        line: None,
    }
}

/// Sink that captures messages into a shared vector
struct CaptureLogger {
    messages: Arc<Mutex<Vec<String>>>,
}

impl Logger for CaptureLogger {
    fn log(&self, entry: &LogEntry) {
        self.messages.lock().unwrap().push(entry.message.clone());
    }
}

fn capture() -> (CaptureLogger, Arc<Mutex<Vec<String>>>) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    (CaptureLogger { messages: messages.clone() }, messages)
}

// ============================================================================
// LOG SEVERITY TESTS
// ============================================================================

#[test]
fn test_log_severity_ordering() {
    assert!(LogSeverity::Trivial < LogSeverity::Normal);
    assert!(LogSeverity::Normal < LogSeverity::Warning);
    assert!(LogSeverity::Warning < LogSeverity::Critical);
}

#[test]
fn test_log_severity_from_level() {
    assert_eq!(LogSeverity::from_level(1), LogSeverity::Trivial);
    assert_eq!(LogSeverity::from_level(2), LogSeverity::Normal);
    assert_eq!(LogSeverity::from_level(3), LogSeverity::Warning);
    assert_eq!(LogSeverity::from_level(4), LogSeverity::Critical);
}

#[test]
fn test_log_severity_from_level_clamps() {
    assert_eq!(LogSeverity::from_level(-7), LogSeverity::Trivial);
    assert_eq!(LogSeverity::from_level(0), LogSeverity::Trivial);
    assert_eq!(LogSeverity::from_level(99), LogSeverity::Critical);
}

#[test]
fn test_log_severity_level_inverse() {
    for severity in [
        LogSeverity::Trivial,
        LogSeverity::Normal,
        LogSeverity::Warning,
        LogSeverity::Critical,
    ] {
        assert_eq!(LogSeverity::from_level(severity.level()), severity);
    }
}

// ============================================================================
// FORMATTING
// ============================================================================

#[test]
fn test_format_entry_without_location() {
    let line = format_entry(&entry(LogSeverity::Warning, "texture missing"));
    assert!(line.contains("[WARNING ]"));
    assert!(line.contains("[ogre::test]"));
    assert!(line.ends_with("texture missing"));
}

#[test]
fn test_format_entry_with_location() {
    let mut e = entry(LogSeverity::Critical, "device lost");
    e.file = Some("root.rs");
    e.line = Some(42);
    let line = format_entry(&e);
    assert!(line.contains("[CRITICAL]"));
    assert!(line.ends_with("device lost (root.rs:42)"));
}

#[test]
fn test_terminal_supports_colour() {
    assert!(terminal_supports_colour(Some("xterm")));
    assert!(terminal_supports_colour(Some("xterm-256color")));
    assert!(!terminal_supports_colour(Some("dumb")));
    assert!(!terminal_supports_colour(Some("screen")));
    assert!(!terminal_supports_colour(None));
}

// ============================================================================
// SINKS
// ============================================================================

#[test]
fn test_console_logger_all_severities() {
    for use_colour in [false, true] {
        let logger = ConsoleLogger::with_colour(use_colour);
        assert_eq!(logger.uses_colour(), use_colour);
        for severity in [
            LogSeverity::Trivial,
            LogSeverity::Normal,
            LogSeverity::Warning,
            LogSeverity::Critical,
        ] {
            // Just verify it doesn't panic
            logger.log(&entry(severity, "console message"));
        }
    }
}

#[test]
fn test_file_logger_writes_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ogre.log");

    let logger = FileLogger::create(&path).unwrap();
    logger.log(&entry(LogSeverity::Normal, "first"));
    logger.log(&entry(LogSeverity::Warning, "second"));

    let text = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("first"));
    assert!(lines[1].ends_with("second"));
}

#[test]
fn test_file_logger_append_keeps_previous_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ogre.log");

    FileLogger::create(&path).unwrap().log(&entry(LogSeverity::Normal, "run 1"));
    FileLogger::append(&path).unwrap().log(&entry(LogSeverity::Normal, "run 2"));

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
}

#[test]
fn test_multi_logger_fans_out() {
    let (a, a_messages) = capture();
    let (b, b_messages) = capture();
    let multi = MultiLogger::new().with(a).with(b);
    assert_eq!(multi.sink_count(), 2);

    multi.log(&entry(LogSeverity::Normal, "hello"));

    assert_eq!(*a_messages.lock().unwrap(), vec!["hello".to_string()]);
    assert_eq!(*b_messages.lock().unwrap(), vec!["hello".to_string()]);
}

#[test]
fn test_filtered_logger_drops_below_threshold() {
    let (sink, messages) = capture();
    let filtered = FilteredLogger::new(sink, LogSeverity::Warning);

    filtered.log(&entry(LogSeverity::Trivial, "trivial"));
    filtered.log(&entry(LogSeverity::Normal, "normal"));
    filtered.log(&entry(LogSeverity::Warning, "warning"));
    filtered.log(&entry(LogSeverity::Critical, "critical"));

    assert_eq!(
        *messages.lock().unwrap(),
        vec!["warning".to_string(), "critical".to_string()]
    );
}

#[test]
fn test_logger_trait_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<ConsoleLogger>();
    assert_send_sync::<FileLogger>();
    assert_send_sync::<MultiLogger>();
}
