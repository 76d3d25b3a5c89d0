//! Integration tests for Engine logging system
//!
//! These tests verify the logging facade, the engine macros and the
//! logging of errors raised by the core. No GPU required.
//!
//! Run with: cargo test --test logging_integration_tests


use ogre_engine::ogre::log::{FileLogger, FilteredLogger, LogEntry, LogSeverity, Logger, MultiLogger};
use ogre_engine::ogre::{Engine, ErrorKind};
use serial_test::serial;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use test_utils::{create_running_root, TestDirs};

// ============================================================================
// TEST LOGGER IMPLEMENTATION
// ============================================================================

/// Test logger that captures log entries for verification
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl TestLogger {
    fn new() -> (Self, Arc<Mutex<Vec<LogEntry>>>) {
        let entries = Arc::new(Mutex::new(Vec::new()));
        (Self { entries: entries.clone() }, entries)
    }
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        self.entries.lock().unwrap().push(entry.clone());
    }
}

// ============================================================================
// LOGGING TESTS
// ============================================================================

#[test]
#[serial]
fn test_integration_custom_logger() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);
    Engine::set_min_severity(LogSeverity::Trivial);

    Engine::log(LogSeverity::Normal, "test::module", "Test info message".to_string());
    Engine::log(LogSeverity::Warning, "test::module", "Test warning message".to_string());
    Engine::log(LogSeverity::Critical, "test::module", "Test error message".to_string());

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 3);
        assert_eq!(captured[0].severity, LogSeverity::Normal);
        assert_eq!(captured[0].source, "test::module");
        assert_eq!(captured[0].message, "Test info message");
        assert_eq!(captured[1].severity, LogSeverity::Warning);
        assert_eq!(captured[2].severity, LogSeverity::Critical);
        assert_eq!(captured[2].message, "Test error message");
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_error_logging_with_location() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log_detailed(
        LogSeverity::Critical,
        "test::error",
        "Critical error occurred".to_string(),
        "test_file.rs",
        42,
    );

    {
        let captured = entries.lock().unwrap();
        assert_eq!(captured.len(), 1);
        let entry = &captured[0];
        assert_eq!(entry.severity, LogSeverity::Critical);
        assert_eq!(entry.source, "test::error");
        assert_eq!(entry.file, Some("test_file.rs"));
        assert_eq!(entry.line, Some(42));
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_threshold_filters_entries() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);
    Engine::set_min_severity(LogSeverity::Warning);

    ogre_engine::engine_trivial!("test", "dropped {}", 1);
    ogre_engine::engine_info!("test", "dropped {}", 2);
    ogre_engine::engine_warn!("test", "kept {}", 3);
    ogre_engine::engine_error!("test", "kept {}", 4);

    {
        let captured = entries.lock().unwrap();
        let messages: Vec<&str> = captured.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["kept 3", "kept 4"]);
        assert!(captured[1].file.is_some());
    }

    Engine::reset_logger();
}

#[test]
#[serial]
fn test_integration_logger_reset() {
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    Engine::log(LogSeverity::Critical, "test", "Message 1".to_string());
    assert_eq!(entries.lock().unwrap().len(), 1);

    Engine::reset_logger();
    Engine::log(LogSeverity::Critical, "test", "Message 2".to_string());

    // The reset logger no longer feeds the test sink
    assert_eq!(entries.lock().unwrap().len(), 1);
}

#[test]
#[serial]
fn test_integration_multiple_sinks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ogre.log");
    let (all, all_entries) = TestLogger::new();
    let (critical, critical_entries) = TestLogger::new();
    Engine::set_logger(
        MultiLogger::new()
            .with(all)
            .with(FilteredLogger::new(critical, LogSeverity::Critical))
            .with(FileLogger::create(&path).unwrap()),
    );
    Engine::set_min_severity(LogSeverity::Trivial);

    Engine::log(LogSeverity::Normal, "test::sinks", "to two sinks".to_string());
    Engine::log(LogSeverity::Critical, "test::sinks", "to every sink".to_string());
    Engine::reset_logger();

    assert_eq!(all_entries.lock().unwrap().len(), 2);
    assert_eq!(critical_entries.lock().unwrap().len(), 1);
    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().count(), 2);
    assert!(text.contains("[test::sinks] to every sink"));
}

#[test]
#[serial]
fn test_integration_surfaced_errors_are_logged() {
    let dirs = TestDirs::new();
    let (mut root, _recorder) = create_running_root(&dirs);
    let (test_logger, entries) = TestLogger::new();
    Engine::set_logger(test_logger);

    let err = root.create_scene_manager("scene").err().map(|e| e.kind());
    assert_eq!(err, Some(ErrorKind::DuplicateItem));

    {
        let captured = entries.lock().unwrap();
        let critical: Vec<&LogEntry> = captured.iter().filter(|e| e.severity == LogSeverity::Critical).collect();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].source, "ogre::Root");
        assert!(critical[0].file.is_some());
    }

    Engine::reset_logger();
}
