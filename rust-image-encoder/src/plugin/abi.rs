//! The C interface a shared library implements to act as an image backend.
//!
//! Every export uses the C calling convention and returns a status code, `STATUS_OK` on success.
//! The host owns the pixel buffer; `lib_init` only declares how many bytes a pixel takes and which
//! extension output files get. The canvas is allocated after `lib_init` returns and handed to every
//! later call through [`RawImage`].

use std::ffi::{c_char, c_int, c_void};

use crate::error::Error;

/// Mandatory: [`InitFn`].
pub const INIT_SYMBOL: &[u8] = b"lib_init\0";
/// Mandatory: [`AddPixelFn`].
pub const ADD_PIXEL_SYMBOL: &[u8] = b"lib_add_pixel\0";
/// Mandatory: [`WriteImageFn`].
pub const WRITE_SYMBOL: &[u8] = b"lib_write\0";
/// Optional: [`SetPixelFn`].
pub const SET_PIXEL_SYMBOL: &[u8] = b"lib_set_pixel\0";
/// Optional: [`GetPixelFn`].
pub const GET_PIXEL_SYMBOL: &[u8] = b"lib_get_pixel\0";
/// Optional: [`FreeFn`].
pub const FREE_SYMBOL: &[u8] = b"lib_free\0";

/// Success.
pub const STATUS_OK: c_int = 0;
/// Maps to [`Error::InvalidArgument`].
pub const STATUS_INVALID_ARGUMENT: c_int = 1;
/// Maps to [`Error::OutOfMemory`].
pub const STATUS_OUT_OF_MEMORY: c_int = 2;
/// Maps to [`Error::BufferExhausted`].
pub const STATUS_BUFFER_EXHAUSTED: c_int = 3;
/// Maps to [`Error::Unsupported`].
pub const STATUS_UNSUPPORTED: c_int = 4;
/// Maps to [`Error::Io`].
pub const STATUS_IO: c_int = 5;

/// Room for the extension including its terminating NUL.
pub const EXTENSION_CAPACITY: usize = 16;

/// Bytes per pixel assumed when `lib_init` leaves `channels` at zero.
pub const DEFAULT_CHANNELS: usize = 4;

/// Largest `channels` value a module may declare.
pub const MAX_CHANNELS: usize = 4;

/// Image state shared between the host and a module.
#[repr(C)]
#[derive(Debug)]
pub struct RawImage {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Color model code.
    pub model: c_int,
    /// Bytes per pixel, set by `lib_init`.
    pub channels: usize,
    /// Host-owned pixel buffer. Null during `lib_init`.
    pub canvas: *mut u8,
    /// Length of `canvas` in bytes.
    pub canvas_len: usize,
    /// Offset of the next sequential write. Modules advance it in `lib_add_pixel`.
    pub cursor: usize,
    /// NUL-terminated extension, set by `lib_init`.
    pub extension: [c_char; EXTENSION_CAPACITY],
    /// Module-private state. Released by `lib_free`.
    pub user_data: *mut c_void,
}

impl RawImage {
    /// State for a fresh image, before `lib_init` runs.
    pub fn new(width: usize, height: usize, model: c_int) -> Self {
        Self {
            width,
            height,
            model,
            channels: 0,
            canvas: std::ptr::null_mut(),
            canvas_len: 0,
            cursor: 0,
            extension: [0; EXTENSION_CAPACITY],
            user_data: std::ptr::null_mut(),
        }
    }

    /// The extension up to its first NUL. A missing terminator takes the whole array, and
    /// non-UTF-8 bytes are replaced.
    pub fn extension(&self) -> String {
        let bytes: Vec<u8> = self
            .extension
            .iter()
            .map(|&c| c as u8)
            .take_while(|&b| b != 0)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Stores `extension`, truncating so the terminating NUL always fits.
    pub fn set_extension(&mut self, extension: &str) {
        self.extension = [0; EXTENSION_CAPACITY];
        for (slot, byte) in self
            .extension
            .iter_mut()
            .zip(extension.bytes().take(EXTENSION_CAPACITY - 1))
        {
            *slot = byte as c_char;
        }
    }
}

/// Sink callback passed to `lib_write`. Returns non-zero if the sink failed, in which case the
/// module should stop writing and return `STATUS_IO`.
pub type WriteFn = unsafe extern "C" fn(sink: *mut c_void, data: *const u8, len: usize) -> c_int;

/// `lib_init`: declare `channels` and `extension`, and set up `user_data`.
pub type InitFn = unsafe extern "C" fn(image: *mut RawImage) -> c_int;
/// `lib_add_pixel`: store a pixel at `cursor` and advance it.
pub type AddPixelFn =
    unsafe extern "C" fn(image: *mut RawImage, r: u8, g: u8, b: u8, a: u8) -> c_int;
/// `lib_set_pixel`: store a pixel at `(x, y)`. The host has checked the coordinates.
pub type SetPixelFn = unsafe extern "C" fn(
    image: *mut RawImage,
    x: usize,
    y: usize,
    r: u8,
    g: u8,
    b: u8,
    a: u8,
) -> c_int;
/// `lib_get_pixel`: read the pixel at `(x, y)` into the out pointers.
pub type GetPixelFn = unsafe extern "C" fn(
    image: *mut RawImage,
    x: usize,
    y: usize,
    r: *mut u8,
    g: *mut u8,
    b: *mut u8,
    a: *mut u8,
) -> c_int;
/// `lib_write`: serialize the image through `write`, passing `sink` back unchanged.
pub type WriteImageFn =
    unsafe extern "C" fn(image: *mut RawImage, write: WriteFn, sink: *mut c_void) -> c_int;
/// `lib_free`: release whatever `user_data` holds.
pub type FreeFn = unsafe extern "C" fn(image: *mut RawImage);

/// Maps a module status code to a result. `capacity` is reported with
/// [`STATUS_BUFFER_EXHAUSTED`].
pub fn check_status(code: c_int, capacity: usize) -> crate::error::Result<()> {
    match code {
        STATUS_OK => Ok(()),
        STATUS_INVALID_ARGUMENT => Err(Error::InvalidArgument("rejected by image module")),
        STATUS_OUT_OF_MEMORY => Err(Error::OutOfMemory { bytes: 0 }),
        STATUS_BUFFER_EXHAUSTED => Err(Error::BufferExhausted { capacity }),
        STATUS_UNSUPPORTED => Err(Error::Unsupported("image module operation")),
        STATUS_IO => Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "image module reported a write failure",
        ))),
        code => Err(Error::Backend { code }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_truncated_and_terminated() {
        let mut image = RawImage::new(1, 1, 0);
        image.set_extension(".a-very-long-extension");
        assert_eq!(image.extension().len(), EXTENSION_CAPACITY - 1);
        assert_eq!(image.extension[EXTENSION_CAPACITY - 1], 0);

        image.set_extension(".pam");
        assert_eq!(image.extension(), ".pam");
    }

    #[test]
    fn status_codes_map_to_errors() {
        assert!(check_status(STATUS_OK, 0).is_ok());
        assert!(matches!(
            check_status(STATUS_BUFFER_EXHAUSTED, 12),
            Err(Error::BufferExhausted { capacity: 12 })
        ));
        assert!(matches!(check_status(STATUS_IO, 0), Err(Error::Io(_))));
        assert!(matches!(
            check_status(99, 0),
            Err(Error::Backend { code: 99 })
        ));
    }
}
