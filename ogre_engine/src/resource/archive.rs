/// Archives: named collections of files that resources are read from
///
/// Only the filesystem archive lives in the core. Other archive kinds
/// register through [`ArchiveFactory`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::engine_bail;
use crate::error::Result;

/// Archive type name of [`FileSystemArchive`]
pub const FILE_SYSTEM_ARCHIVE_TYPE: &str = "FileSystem";

/// Read access to a collection of files
pub trait Archive: Send + Sync {
    /// Location the archive was opened from
    fn name(&self) -> &str;

    fn archive_type(&self) -> &str;

    /// Relative paths of every file (or directory with `dirs`)
    fn list(&self, recursive: bool, dirs: bool) -> Vec<String>;

    /// Like `list`, filtered by a `*` / `?` glob pattern
    fn find(&self, pattern: &str, recursive: bool, dirs: bool) -> Vec<String> {
        let match_full_path = pattern.contains('/');
        self.list(recursive, dirs)
            .into_iter()
            .filter(|name| {
                let candidate = if match_full_path {
                    name.as_str()
                } else {
                    name.rsplit('/').next().unwrap_or(name)
                };
                glob_match(pattern, candidate)
            })
            .collect()
    }

    /// Read a whole file
    fn open(&self, name: &str) -> Result<Vec<u8>>;

    fn exists(&self, name: &str) -> bool;

    fn modified_time(&self, name: &str) -> Option<SystemTime>;
}

/// Creates archives of one type
pub trait ArchiveFactory: Send + Sync {
    fn archive_type(&self) -> &str;

    fn create_archive(&self, location: &str) -> Result<Box<dyn Archive>>;
}

/// Match `text` against a glob with `*` (any run) and `?` (one char)
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            backtrack = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = backtrack {
            p = star_p + 1;
            t = star_t + 1;
            backtrack = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|c| *c == '*')
}

// ===== FILESYSTEM =====

/// Archive over a directory tree
pub struct FileSystemArchive {
    name: String,
    root: PathBuf,
}

impl FileSystemArchive {
    pub fn new(location: &str) -> Result<Self> {
        let root = PathBuf::from(location);
        if !root.is_dir() {
            engine_bail!("ogre::FileSystemArchive", FileNotFound,
                "Archive location '{}' is not a directory", location);
        }
        Ok(Self { name: location.to_string(), root })
    }

    /// Path of `path` relative to the archive root, `/`-separated
    fn relative_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect();
        Some(parts.join("/"))
    }

    fn resolve(&self, name: &str) -> Result<PathBuf> {
        if Path::new(name).components().any(|c| matches!(c, std::path::Component::ParentDir)) {
            engine_bail!("ogre::FileSystemArchive", InvalidParams,
                "'{}' escapes archive '{}'", name, self.name);
        }
        Ok(self.root.join(name))
    }
}

impl Archive for FileSystemArchive {
    fn name(&self) -> &str {
        &self.name
    }

    fn archive_type(&self) -> &str {
        FILE_SYSTEM_ARCHIVE_TYPE
    }

    fn list(&self, recursive: bool, dirs: bool) -> Vec<String> {
        let mut walker = WalkDir::new(&self.root).min_depth(1).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }
        walker
            .into_iter()
            // Hidden files and directories are skipped
            .filter_entry(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                // Symlinks are listed but never descended into
                let is_dir = entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir());
                is_dir == dirs
            })
            .filter_map(|entry| self.relative_name(entry.path()))
            .collect()
    }

    fn open(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(name)?;
        if !path.is_file() {
            engine_bail!("ogre::FileSystemArchive", FileNotFound,
                "'{}' not found in archive '{}'", name, self.name);
        }
        Ok(fs::read(path)?)
    }

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).map(|p| p.is_file()).unwrap_or(false)
    }

    fn modified_time(&self, name: &str) -> Option<SystemTime> {
        let path = self.resolve(name).ok()?;
        fs::metadata(path).and_then(|m| m.modified()).ok()
    }
}

/// Factory for [`FileSystemArchive`]
pub struct FileSystemArchiveFactory;

impl ArchiveFactory for FileSystemArchiveFactory {
    fn archive_type(&self) -> &str {
        FILE_SYSTEM_ARCHIVE_TYPE
    }

    fn create_archive(&self, location: &str) -> Result<Box<dyn Archive>> {
        Ok(Box::new(FileSystemArchive::new(location)?))
    }
}

#[cfg(test)]
#[path = "archive_tests.rs"]
mod tests;
