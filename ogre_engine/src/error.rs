//! Error types for the OGRE engine
//!
//! One error enum is shared by every subsystem (resources, hardware buffers,
//! materials, scene, compositor). Recoverable internal conditions such as an
//! unsupported pass or a vetoed name collision are NOT errors: they are
//! reported through `bool`/`Option` results and a log line.

use std::fmt;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Clone)]
pub enum Error {
    /// A caller passed an out-of-range or inconsistent argument
    InvalidParams(String),

    /// A named or keyed item does not exist
    ItemNotFound(String),

    /// An item with the same identity already exists
    DuplicateItem(String),

    /// No archive or path provides the requested file
    FileNotFound(String),

    /// The asset bytes could not be decoded
    InvalidAsset(String),

    /// Internal invariant broken (lock poisoned, worker died, ...)
    InternalError(String),

    /// The rendering backend reported a failure
    RenderingApiError(String),

    /// The operation is not implemented by this backend
    NotImplemented(String),

    /// The object is not in a state that allows the operation
    InvalidState(String),

    /// GPU allocation failed
    OutOfGpuMemory,
}

/// Fieldless mirror of [`Error`], convenient for matching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParams,
    ItemNotFound,
    DuplicateItem,
    FileNotFound,
    InvalidAsset,
    InternalError,
    RenderingApiError,
    NotImplemented,
    InvalidState,
    OutOfGpuMemory,
}

impl Error {
    /// Kind of this error, without its message
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidParams(_) => ErrorKind::InvalidParams,
            Error::ItemNotFound(_) => ErrorKind::ItemNotFound,
            Error::DuplicateItem(_) => ErrorKind::DuplicateItem,
            Error::FileNotFound(_) => ErrorKind::FileNotFound,
            Error::InvalidAsset(_) => ErrorKind::InvalidAsset,
            Error::InternalError(_) => ErrorKind::InternalError,
            Error::RenderingApiError(_) => ErrorKind::RenderingApiError,
            Error::NotImplemented(_) => ErrorKind::NotImplemented,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::OutOfGpuMemory => ErrorKind::OutOfGpuMemory,
        }
    }

    /// Build an error of the given kind carrying `message`.
    ///
    /// Used by the `engine_err!` / `engine_bail!` macros.
    pub fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::InvalidParams => Error::InvalidParams(message),
            ErrorKind::ItemNotFound => Error::ItemNotFound(message),
            ErrorKind::DuplicateItem => Error::DuplicateItem(message),
            ErrorKind::FileNotFound => Error::FileNotFound(message),
            ErrorKind::InvalidAsset => Error::InvalidAsset(message),
            ErrorKind::InternalError => Error::InternalError(message),
            ErrorKind::RenderingApiError => Error::RenderingApiError(message),
            ErrorKind::NotImplemented => Error::NotImplemented(message),
            ErrorKind::InvalidState => Error::InvalidState(message),
            ErrorKind::OutOfGpuMemory => Error::OutOfGpuMemory,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParams(msg) => write!(f, "Invalid parameters: {}", msg),
            Error::ItemNotFound(msg) => write!(f, "Item not found: {}", msg),
            Error::DuplicateItem(msg) => write!(f, "Duplicate item: {}", msg),
            Error::FileNotFound(msg) => write!(f, "File not found: {}", msg),
            Error::InvalidAsset(msg) => write!(f, "Invalid asset: {}", msg),
            Error::InternalError(msg) => write!(f, "Internal error: {}", msg),
            Error::RenderingApiError(msg) => write!(f, "Rendering API error: {}", msg),
            Error::NotImplemented(msg) => write!(f, "Not implemented: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::OutOfGpuMemory => write!(f, "Out of GPU memory"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::FileNotFound(err.to_string()),
            _ => Error::InternalError(format!("I/O error: {}", err)),
        }
    }
}

// ===== ERROR MACROS =====

/// Log a Critical message and build an [`Error`] of the given kind.
///
/// # Example
///
/// ```ignore
/// let err = engine_err!("ogre::ResourceManager", ItemNotFound, "'{}' not found", name);
/// ```
#[macro_export]
macro_rules! engine_err {
    ($source:expr, $kind:ident, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::ogre::Engine::log_detailed(
            $crate::ogre::log::LogSeverity::Critical,
            $source,
            message.clone(),
            file!(),
            line!(),
        );
        $crate::ogre::Error::from_kind($crate::ogre::ErrorKind::$kind, message)
    }};
}

/// Log a Critical message and return early with an [`Error`] of the given kind.
///
/// # Example
///
/// ```ignore
/// engine_bail!("ogre::HardwareBuffer", InvalidParams, "lock range exceeds buffer size");
/// ```
#[macro_export]
macro_rules! engine_bail {
    ($source:expr, $kind:ident, $($arg:tt)*) => {
        return Err($crate::engine_err!($source, $kind, $($arg)*))
    };
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
