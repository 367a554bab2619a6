//! Error types for GristDB.
//!
//! Provides the unified error type returned by every fallible engine
//! operation. Configuration problems surface from `open`; data and I/O
//! problems surface from `next`; nothing is retried internally.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and are stable
/// across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0001,
    /// Operation not supported.
    NotSupported = 0x0002,

    // Configuration errors (0x0100 - 0x01FF)
    /// Invalid configuration value.
    InvalidConfig = 0x0100,
    /// A tuple does not fit in a page.
    PageTooSmall = 0x0101,
    /// Join key vectors differ in length.
    KeyArityMismatch = 0x0102,
    /// Referenced column does not exist.
    ColumnNotFound = 0x0103,
    /// Values of different types were compared.
    TypeMismatch = 0x0104,
    /// A string exceeds its declared column width.
    ValueTooWide = 0x0105,

    // I/O and data errors (0x0200 - 0x02FF)
    /// General I/O error.
    Io = 0x0200,
    /// Data corruption detected.
    Corruption = 0x0201,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Config",
            0x02 => "I/O",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for GristDB.
///
/// Each variant carries the context a host needs to decide whether the
/// failure is a misconfigured plan (reject the query), corrupt spill data
/// (abort the query), or a bug (abort the process if it so chooses).
#[derive(Debug, Error)]
pub enum GristError {
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Operation not supported.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    /// A page cannot hold even a single tuple of the schema.
    #[error("page size {page_size} is smaller than tuple size {tuple_size}")]
    PageTooSmall {
        /// Configured page size in bytes.
        page_size: usize,
        /// Serialized tuple size in bytes.
        tuple_size: usize,
    },

    /// The two key-index vectors of a join differ in length.
    #[error("join key arity mismatch: left has {left} keys, right has {right}")]
    KeyArityMismatch {
        /// Number of left-side key columns.
        left: usize,
        /// Number of right-side key columns.
        right: usize,
    },

    /// A column referenced by a plan does not exist in the schema.
    #[error("column '{column}' not found")]
    ColumnNotFound {
        /// The missing column name.
        column: String,
    },

    /// Values of different types were compared.
    #[error("type mismatch: cannot compare {left} with {right}")]
    TypeMismatch {
        /// Type name of the left value.
        left: &'static str,
        /// Type name of the right value.
        right: &'static str,
    },

    /// A string value exceeds its declared column width.
    #[error("value of {size} bytes exceeds column width {width}")]
    ValueTooWide {
        /// Actual value size in bytes.
        size: usize,
        /// Declared column width in bytes.
        width: usize,
    },

    /// I/O error from the underlying system.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Data corruption detected in a spill file.
    #[error("spill file {path} is corrupted: {message}")]
    Corrupted {
        /// The corrupted file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    /// Checksum mismatch in a spill frame.
    #[error("checksum mismatch in {path}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// The file containing the bad frame.
        path: PathBuf,
        /// Expected checksum.
        expected: u32,
        /// Actual checksum.
        actual: u32,
    },
}

impl GristError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::InvalidConfig { .. } => ErrorCode::InvalidConfig,
            Self::PageTooSmall { .. } => ErrorCode::PageTooSmall,
            Self::KeyArityMismatch { .. } => ErrorCode::KeyArityMismatch,
            Self::ColumnNotFound { .. } => ErrorCode::ColumnNotFound,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::ValueTooWide { .. } => ErrorCode::ValueTooWide,
            Self::Io { .. } => ErrorCode::Io,
            Self::Corrupted { .. } | Self::ChecksumMismatch { .. } => ErrorCode::Corruption,
        }
    }

    /// Returns true if the error indicates a misconfigured plan rather than
    /// a runtime failure.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self.code().as_u16() >> 8, 0x01)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a corruption error for the given spill file.
    #[must_use]
    pub fn corruption(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corrupted {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type alias using [`GristError`].
pub type GristResult<T> = Result<T, GristError>;
