//! Error types for loading and dispatching controllers.
//!
//! Every failure is a value. Each variant maps onto the numeric status code the
//! host-facing C surface reports (see [`LoadError::status_code`]).

use std::path::PathBuf;
use thiserror::Error;

/// Host status code for a successful operation.
pub const STATUS_OK: i32 = 0;
/// Host status code when the platform loader could not open the library.
pub const STATUS_LIBRARY_NOT_FOUND: i32 = 1;
/// Host status code when the entry point symbol could not be resolved.
pub const STATUS_SYMBOL_NOT_FOUND: i32 = 2;
/// Host status code for an out-of-range connection id or a bad argument.
pub const STATUS_INVALID_ARGUMENT: i32 = 3;
/// Host status code when `invoke` targets a connection with nothing loaded.
pub const STATUS_NOT_LOADED: i32 = 4;

/// A connection id outside `0..capacity` of the registry it was used with.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("connection id {id} is outside 0..{capacity}")]
pub struct InvalidConnectionId {
    pub id: i32,
    pub capacity: usize,
}

/// Failures from [`Registry::load`](crate::Registry::load).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    InvalidConnectionId(#[from] InvalidConnectionId),

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("failed to load library {}: {reason}", path.display())]
    LibraryNotFound { path: PathBuf, reason: String },

    #[error("failed to get function {symbol} from {}: {reason}", path.display())]
    SymbolNotFound {
        path: PathBuf,
        symbol: String,
        reason: String,
    },
}

impl LoadError {
    /// Numeric status reported across the C boundary.
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::LibraryNotFound { .. } => STATUS_LIBRARY_NOT_FOUND,
            Self::SymbolNotFound { .. } => STATUS_SYMBOL_NOT_FOUND,
            Self::InvalidConnectionId(_) | Self::InvalidArgument(_) => STATUS_INVALID_ARGUMENT,
        }
    }
}

/// Failures from [`Registry::invoke`](crate::Registry::invoke).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    InvalidConnectionId(#[from] InvalidConnectionId),

    #[error("no controller loaded on connection {id}")]
    NotLoaded { id: i32 },

    #[error("{0} buffer is empty")]
    EmptyBuffer(&'static str),
}

impl DispatchError {
    #[must_use]
    pub fn status_code(&self) -> i32 {
        match self {
            Self::InvalidConnectionId(_) | Self::EmptyBuffer(_) => STATUS_INVALID_ARGUMENT,
            Self::NotLoaded { .. } => STATUS_NOT_LOADED,
        }
    }
}

/// Failures decoding a [`Payload`](crate::Payload).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload truncated: needed {needed} more bytes for {field}, {remaining} left")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("payload field {field} is too large to encode ({len} elements)")]
    TooLarge { field: &'static str, len: usize },
}
