//! Module containing error definitions.

use std::str::Utf8Error;

use thiserror::Error;

/// Type alias for the `Result` of fallible operations in this crate.
pub type TfResult<T> = std::result::Result<T, TfError>;

/// Error type centralizing all possible errors
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TfError {
    /// Failure to load the TensorFlow shared library or to resolve one of
    /// its entry points.
    #[error("Failed to load or call TensorFlow library: {0}")]
    Library(#[from] libloading::Error),
    /// Non-OK status reported by the runtime; code and message are
    /// surfaced verbatim.
    #[error("tensorflow: {code}: {message}")]
    NativeStatus {
        /// Numeric status code as reported (`0` never appears here).
        code: i32,
        /// Human-readable message as reported.
        message: String,
    },
    /// A tensor carried a native element type outside the supported set.
    #[error("tensorflow: unsupported type {0}")]
    UnsupportedType(String),
    /// A tensor buffer is inconsistent with its declared type and shape.
    #[error("malformed tensor buffer: {0}")]
    MalformedTensor(String),
    /// Operation attempted on a session whose handle was already closed.
    #[error("session has been closed")]
    ClosedHandle,
    /// Attempt to build a Rust `CString` from a string with an interior
    /// null byte.
    #[error("Failed to build CString when original contains null: {0}")]
    CStringNul(#[from] std::ffi::NulError),
    /// The runtime returned a null handle where one was required.
    #[error("{0} pointer should not be null")]
    PointerShouldNotBeNull(String),
    /// Text reported by the runtime was not valid UTF-8.
    #[error("Failed to convert CStr to UTF-8: {0}")]
    StringConversion(Utf8Error),
}

pub(crate) fn assert_not_null_pointer<T>(ptr: *const T, name: &str) -> TfResult<()> {
    (!ptr.is_null())
        .then_some(())
        .ok_or_else(|| TfError::PointerShouldNotBeNull(name.to_owned()))
}
