//! Unit tests for the Engine logging facade
//!
//! IMPORTANT: the logger is a global shared across all tests.
//! Tests are marked #[serial] and only count entries from their own source,
//! since tests in other modules log concurrently.

use crate::ogre::Engine;
use crate::ogre::log::{LogEntry, LogSeverity, Logger};
use std::sync::{Arc, Mutex};
use serial_test::serial;

// ============================================================================
// TEST HELPERS
// ============================================================================

const SOURCE: &str = "ogre::EngineTest";

/// Test logger that captures entries emitted by this test module
struct TestLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Logger for TestLogger {
    fn log(&self, entry: &LogEntry) {
        if entry.source == SOURCE {
            self.entries.lock().unwrap().push(entry.clone());
        }
    }
}

fn install_test_logger() -> Arc<Mutex<Vec<LogEntry>>> {
    let entries = Arc::new(Mutex::new(Vec::new()));
    Engine::set_logger(TestLogger { entries: entries.clone() });
    Engine::set_min_severity(LogSeverity::Trivial);
    entries
}

// ============================================================================
// LOGGER REPLACEMENT
// ============================================================================

#[test]
#[serial]
fn test_set_logger_receives_entries() {
    let entries = install_test_logger();

    crate::engine_info!(SOURCE, "Render system {} ready", "Mock");

    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Normal);
    assert_eq!(entries[0].message, "Render system Mock ready");
    assert!(entries[0].file.is_none());
    drop(entries);
    Engine::reset_logger();
}

#[test]
#[serial]
fn test_engine_error_macro_carries_location() {
    let entries = install_test_logger();

    crate::engine_error!(SOURCE, "device lost");

    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Critical);
    assert!(entries[0].file.unwrap().ends_with("engine_tests.rs"));
    assert!(entries[0].line.is_some());
    drop(entries);
    Engine::reset_logger();
}

#[test]
#[serial]
fn test_error_macros_log_at_critical() {
    let entries = install_test_logger();

    let err = crate::engine_err!(SOURCE, InvalidState, "buffer {} already locked", 7);

    assert!(format!("{}", err).contains("buffer 7 already locked"));
    let entries = entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].severity, LogSeverity::Critical);
    drop(entries);
    Engine::reset_logger();
}

// ============================================================================
// THRESHOLD
// ============================================================================

#[test]
#[serial]
fn test_min_severity_filters_entries() {
    let entries = install_test_logger();
    Engine::set_min_severity(LogSeverity::Warning);
    assert_eq!(Engine::min_severity(), LogSeverity::Warning);

    crate::engine_trivial!(SOURCE, "trivial");
    crate::engine_info!(SOURCE, "normal");
    crate::engine_warn!(SOURCE, "warning");
    crate::engine_error!(SOURCE, "critical");

    let messages: Vec<String> = entries.lock().unwrap().iter().map(|e| e.message.clone()).collect();
    assert_eq!(messages, vec!["warning".to_string(), "critical".to_string()]);
    Engine::reset_logger();
}

#[test]
#[serial]
fn test_reset_logger_detaches_custom_logger() {
    let entries = install_test_logger();
    Engine::reset_logger();
    Engine::set_min_severity(LogSeverity::Trivial);

    crate::engine_warn!(SOURCE, "goes to console");

    assert!(entries.lock().unwrap().is_empty());
    Engine::reset_logger();
}
