use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreErrorCode {
    NotFound,
    Format,
    NameConflict,
    Io,
    /// A migration journal from an unfinished pass is still on disk.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct CoreError {
    pub code: CoreErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn new(code: CoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(CoreErrorCode::NotFound, message)
    }

    pub fn format(message: impl Into<String>) -> Self {
        Self::new(CoreErrorCode::Format, message)
    }

    pub fn name_conflict(message: impl Into<String>) -> Self {
        Self::new(CoreErrorCode::NameConflict, message)
    }

    /// Wraps an I/O failure on `path`, keeping `NotFound` distinct from other I/O errors.
    pub fn io(path: &Path, err: io::Error) -> Self {
        let code = if err.kind() == io::ErrorKind::NotFound {
            CoreErrorCode::NotFound
        } else {
            CoreErrorCode::Io
        };
        Self::new(code, format!("{}: {err}", path.display()))
    }
}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        let code = if err.kind() == io::ErrorKind::NotFound {
            CoreErrorCode::NotFound
        } else {
            CoreErrorCode::Io
        };
        Self::new(code, err.to_string())
    }
}
