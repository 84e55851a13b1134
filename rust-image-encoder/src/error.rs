use std::path::PathBuf;

use thiserror::Error;

/// Result type returned throughout the encoder.
pub type Result<T> = core::result::Result<T, Error>;

/// Describes an error encountered while encoding an image.
#[derive(Debug, Error)]
pub enum Error {
    /// A dimension, color model, format or other argument is not acceptable. The string describes
    /// which.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The image context was used before `init` succeeded, or after `free`.
    #[error("image context is not initialized")]
    NotInitialized,
    /// The library format was requested but no module was configured.
    #[error("library backend requested without a module configured")]
    NotConfigured,
    /// The dynamic loader could not open the module.
    #[error("failed to load image module {}: {source}", path.display())]
    ModuleLoadFailed {
        /// Module that was asked for.
        path: PathBuf,
        /// What the loader reported.
        #[source]
        source: libloading::Error,
    },
    /// The module is missing a mandatory export.
    #[error("invalid image module {}: missing export `{symbol}`", path.display())]
    ModuleInvalid {
        /// Module that was opened.
        path: PathBuf,
        /// The first export found missing.
        symbol: &'static str,
    },
    /// A pixel buffer could not be allocated.
    #[error("out of memory allocating {bytes} bytes")]
    OutOfMemory {
        /// Size of the failed request, or 0 when a module did not say.
        bytes: usize,
    },
    /// A sequential write found the pixel buffer full.
    #[error("pixel buffer exhausted ({capacity} bytes)")]
    BufferExhausted {
        /// Size of the buffer in bytes.
        capacity: usize,
    },
    /// Random access outside the image.
    #[error("pixel ({x}, {y}) outside {width}x{height} image")]
    OutOfBounds {
        /// Requested column.
        x: usize,
        /// Requested row.
        y: usize,
        /// Image width.
        width: usize,
        /// Image height.
        height: usize,
    },
    /// The active backend does not provide an optional operation.
    #[error("operation not supported by backend: {0}")]
    Unsupported(&'static str),
    /// The normalized file name does not fit the caller's capacity.
    #[error("file name of {len} bytes exceeds capacity of {capacity}")]
    NameTooLong {
        /// Length of the normalized name in bytes.
        len: usize,
        /// Largest length the caller accepts.
        capacity: usize,
    },
    /// A module returned a status code with no other meaning.
    #[error("image module failed with status {code}")]
    Backend {
        /// The raw status.
        code: i32,
    },
    /// There was an error writing the image
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
