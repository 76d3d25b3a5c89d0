use super::*;
use crate::error::ErrorKind;
use std::fs;
use tempfile::TempDir;

fn media_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("ogre.png"), b"png").unwrap();
    fs::write(dir.path().join("basic.vert"), b"void main() {}").unwrap();
    fs::create_dir(dir.path().join("models")).unwrap();
    fs::write(dir.path().join("models").join("ninja.mesh"), b"mesh").unwrap();
    fs::write(dir.path().join(".hidden"), b"x").unwrap();
    dir
}

// ============================================================================
// Glob matching
// ============================================================================

#[test]
fn test_glob_match() {
    assert!(glob_match("*.png", "ogre.png"));
    assert!(!glob_match("*.png", "ogre.pngx"));
    assert!(glob_match("o?re.*", "ogre.png"));
    assert!(glob_match("*", ""));
    assert!(glob_match("a*b*c", "aXXbYYc"));
    assert!(!glob_match("a*b*c", "aXXbYY"));
    assert!(glob_match("exact", "exact"));
}

// ============================================================================
// Filesystem archive
// ============================================================================

#[test]
fn test_missing_directory() {
    let err = FileSystemArchive::new("/definitely/not/here").err().unwrap();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
}

#[test]
fn test_list_flat_and_recursive() {
    let dir = media_dir();
    let archive = FileSystemArchive::new(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(archive.list(false, false), vec!["basic.vert", "ogre.png"]);
    assert_eq!(
        archive.list(true, false),
        vec!["basic.vert", "models/ninja.mesh", "ogre.png"]
    );
    assert_eq!(archive.list(false, true), vec!["models"]);
}

#[cfg(unix)]
#[test]
fn test_symlinked_directories_are_not_followed() {
    let dir = media_dir();
    std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();
    let archive = FileSystemArchive::new(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(
        archive.list(true, false),
        vec!["basic.vert", "models/ninja.mesh", "ogre.png"]
    );
    assert_eq!(archive.list(true, true), vec!["loop", "models"]);
}

#[test]
fn test_find_by_pattern() {
    let dir = media_dir();
    let archive = FileSystemArchive::new(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(archive.find("*.mesh", true, false), vec!["models/ninja.mesh"]);
    assert_eq!(archive.find("models/*", true, false), vec!["models/ninja.mesh"]);
    assert!(archive.find("*.mesh", false, false).is_empty());
}

#[test]
fn test_open_and_exists() {
    let dir = media_dir();
    let archive = FileSystemArchive::new(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(archive.open("basic.vert").unwrap(), b"void main() {}");
    assert!(archive.exists("models/ninja.mesh"));
    assert!(!archive.exists("missing.png"));
    assert!(archive.modified_time("ogre.png").is_some());
    assert_eq!(archive.open("missing.png").unwrap_err().kind(), ErrorKind::FileNotFound);
}

#[test]
fn test_parent_dir_rejected() {
    let dir = media_dir();
    let archive = FileSystemArchive::new(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(archive.open("../etc/passwd").unwrap_err().kind(), ErrorKind::InvalidParams);
}

#[test]
fn test_factory() {
    let dir = media_dir();
    let archive = FileSystemArchiveFactory
        .create_archive(dir.path().to_str().unwrap())
        .unwrap();
    assert_eq!(archive.archive_type(), FILE_SYSTEM_ARCHIVE_TYPE);
}
