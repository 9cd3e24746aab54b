//! Loader error surface.

use thiserror::Error;

use crate::ffi::{self, Status};

/// Errors returned by loader operations.
///
/// Discovery-time problems (missing directories, unloadable libraries,
/// absent symbols) never surface here; they drop the offending library and
/// discovery continues. These variants cover the caller-facing contract.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A required pointer or descriptor handle was null.
    #[error("null pointer")]
    NullPtr,

    /// No implementation matches the given index or filter set.
    #[error("implementation not found")]
    NotFound,

    /// The operation or requested format is not supported.
    #[error("unsupported")]
    Unsupported,

    /// An allocation inside the loader or a backend failed.
    #[error("memory allocation failed")]
    MemoryAlloc,

    /// A handle was not recognized by this loader instance.
    #[error("invalid handle")]
    InvalidHandle,

    /// An operation was called out of sequence.
    #[error("loader not initialized")]
    NotInitialized,

    /// A backend entry point returned a failure status, passed through
    /// unchanged.
    #[error("runtime returned status {0}")]
    Runtime(Status),
}

impl LoaderError {
    /// Wrap a nonzero backend status.
    pub(crate) fn from_status(sts: Status) -> Self {
        debug_assert_ne!(sts, ffi::MFX_ERR_NONE);
        LoaderError::Runtime(sts)
    }

    /// Status-code form of this error, mirroring the C ABI values.
    pub fn status(&self) -> Status {
        match self {
            LoaderError::NullPtr => ffi::MFX_ERR_NULL_PTR,
            LoaderError::NotFound => ffi::MFX_ERR_NOT_FOUND,
            LoaderError::Unsupported => ffi::MFX_ERR_UNSUPPORTED,
            LoaderError::MemoryAlloc => ffi::MFX_ERR_MEMORY_ALLOC,
            LoaderError::InvalidHandle => ffi::MFX_ERR_INVALID_HANDLE,
            LoaderError::NotInitialized => ffi::MFX_ERR_NOT_INITIALIZED,
            LoaderError::Runtime(sts) => *sts,
        }
    }
}

/// Loader result alias.
pub type Result<T> = std::result::Result<T, LoaderError>;
