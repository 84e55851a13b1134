//! A PAM (P7, RGB_ALPHA) encoder built as a loadable image module. Unlike the built-in PPM encoder
//! it keeps the alpha channel and supports random access.
use std::ffi::{c_int, c_void};

use rust_image_encoder::plugin::abi::{
    RawImage, WriteFn, STATUS_BUFFER_EXHAUSTED, STATUS_INVALID_ARGUMENT, STATUS_IO, STATUS_OK,
};

const CHANNELS: usize = 4;

#[derive(Debug, Default)]
struct State {
    pixels_added: usize,
}

fn canvas(image: &mut RawImage) -> Option<&mut [u8]> {
    if image.canvas.is_null() {
        return None;
    }
    // SAFETY: the host points `canvas` at a live buffer of `canvas_len` bytes for every call.
    Some(unsafe { std::slice::from_raw_parts_mut(image.canvas, image.canvas_len) })
}

fn offset(image: &RawImage, x: usize, y: usize) -> Option<usize> {
    if x >= image.width || y >= image.height {
        return None;
    }
    let offset = (y * image.width + x) * CHANNELS;
    (offset + CHANNELS <= image.canvas_len).then_some(offset)
}

/// # Safety
/// `image` must be null or point to a valid `RawImage`.
#[no_mangle]
pub unsafe extern "C" fn lib_init(image: *mut RawImage) -> c_int {
    let Some(image) = image.as_mut() else {
        return STATUS_INVALID_ARGUMENT;
    };
    if image.width == 0 || image.height == 0 {
        return STATUS_INVALID_ARGUMENT;
    }
    image.channels = CHANNELS;
    image.set_extension(".pam");
    image.user_data = Box::into_raw(Box::<State>::default()) as *mut c_void;
    STATUS_OK
}

/// # Safety
/// `image` must be null or point to a `RawImage` initialized by [`lib_init`].
#[no_mangle]
pub unsafe extern "C" fn lib_add_pixel(image: *mut RawImage, r: u8, g: u8, b: u8, a: u8) -> c_int {
    let Some(image) = image.as_mut() else {
        return STATUS_INVALID_ARGUMENT;
    };
    let cursor = image.cursor;
    let Some(canvas) = canvas(image) else {
        return STATUS_INVALID_ARGUMENT;
    };
    let Some(pixel) = canvas.get_mut(cursor..cursor + CHANNELS) else {
        return STATUS_BUFFER_EXHAUSTED;
    };
    pixel.copy_from_slice(&[r, g, b, a]);
    image.cursor += CHANNELS;
    if let Some(state) = (image.user_data as *mut State).as_mut() {
        state.pixels_added += 1;
    }
    STATUS_OK
}

/// # Safety
/// `image` must be null or point to a `RawImage` initialized by [`lib_init`].
#[no_mangle]
pub unsafe extern "C" fn lib_set_pixel(
    image: *mut RawImage,
    x: usize,
    y: usize,
    r: u8,
    g: u8,
    b: u8,
    a: u8,
) -> c_int {
    let Some(image) = image.as_mut() else {
        return STATUS_INVALID_ARGUMENT;
    };
    let Some(offset) = offset(image, x, y) else {
        return STATUS_INVALID_ARGUMENT;
    };
    let Some(canvas) = canvas(image) else {
        return STATUS_INVALID_ARGUMENT;
    };
    canvas[offset..offset + CHANNELS].copy_from_slice(&[r, g, b, a]);
    STATUS_OK
}

/// # Safety
/// `image` must be null or point to a `RawImage` initialized by [`lib_init`], and the output
/// pointers must be valid for writes.
#[no_mangle]
pub unsafe extern "C" fn lib_get_pixel(
    image: *mut RawImage,
    x: usize,
    y: usize,
    r: *mut u8,
    g: *mut u8,
    b: *mut u8,
    a: *mut u8,
) -> c_int {
    let Some(image) = image.as_mut() else {
        return STATUS_INVALID_ARGUMENT;
    };
    if r.is_null() || g.is_null() || b.is_null() || a.is_null() {
        return STATUS_INVALID_ARGUMENT;
    }
    let Some(offset) = offset(image, x, y) else {
        return STATUS_INVALID_ARGUMENT;
    };
    let Some(canvas) = canvas(image) else {
        return STATUS_INVALID_ARGUMENT;
    };
    *r = canvas[offset];
    *g = canvas[offset + 1];
    *b = canvas[offset + 2];
    *a = canvas[offset + 3];
    STATUS_OK
}

/// # Safety
/// `image` must be null or point to a `RawImage` initialized by [`lib_init`]; `write` and `sink`
/// come from the host.
#[no_mangle]
pub unsafe extern "C" fn lib_write(
    image: *mut RawImage,
    write: WriteFn,
    sink: *mut c_void,
) -> c_int {
    let Some(image) = image.as_mut() else {
        return STATUS_INVALID_ARGUMENT;
    };
    let header = format!(
        "P7\nWIDTH {}\nHEIGHT {}\nDEPTH {}\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n",
        image.width, image.height, CHANNELS
    );
    if write(sink, header.as_ptr(), header.len()) != STATUS_OK {
        return STATUS_IO;
    }
    let Some(canvas) = canvas(image) else {
        return STATUS_INVALID_ARGUMENT;
    };
    if write(sink, canvas.as_ptr(), canvas.len()) != STATUS_OK {
        return STATUS_IO;
    }
    STATUS_OK
}

/// # Safety
/// `image` must be null or point to a `RawImage` initialized by [`lib_init`] and not yet freed.
#[no_mangle]
pub unsafe extern "C" fn lib_free(image: *mut RawImage) {
    let Some(image) = image.as_mut() else {
        return;
    };
    if !image.user_data.is_null() {
        drop(Box::from_raw(image.user_data as *mut State));
        image.user_data = std::ptr::null_mut();
    }
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    unsafe extern "C" fn collect(sink: *mut c_void, data: *const u8, len: usize) -> c_int {
        let out = &mut *(sink as *mut Vec<u8>);
        out.extend_from_slice(std::slice::from_raw_parts(data, len));
        STATUS_OK
    }

    unsafe extern "C" fn refuse(_sink: *mut c_void, _data: *const u8, _len: usize) -> c_int {
        1
    }

    fn image(width: usize, height: usize, canvas: &mut Vec<u8>) -> RawImage {
        let mut image = RawImage::new(width, height, 0);
        assert_eq!(unsafe { lib_init(&mut image) }, STATUS_OK);
        canvas.resize(width * height * image.channels, 0);
        image.canvas = canvas.as_mut_ptr();
        image.canvas_len = canvas.len();
        image
    }

    #[test]
    fn init_declares_rgba_and_extension() {
        let mut canvas = Vec::new();
        let mut image = image(2, 3, &mut canvas);
        assert_eq!(image.channels, 4);
        assert_eq!(image.extension(), ".pam");
        assert!(!image.user_data.is_null());
        unsafe { lib_free(&mut image) };
        assert!(image.user_data.is_null());
    }

    #[test]
    fn zero_sized_image_is_rejected() {
        let mut image = RawImage::new(0, 1, 0);
        assert_eq!(unsafe { lib_init(&mut image) }, STATUS_INVALID_ARGUMENT);
        assert_eq!(unsafe { lib_init(ptr::null_mut()) }, STATUS_INVALID_ARGUMENT);
    }

    #[test]
    fn pixels_keep_alpha_and_exhaust() {
        let mut canvas = Vec::new();
        let mut image = image(1, 2, &mut canvas);
        unsafe {
            assert_eq!(lib_add_pixel(&mut image, 1, 2, 3, 4), STATUS_OK);
            assert_eq!(lib_add_pixel(&mut image, 5, 6, 7, 8), STATUS_OK);
            assert_eq!(lib_add_pixel(&mut image, 9, 9, 9, 9), STATUS_BUFFER_EXHAUSTED);
            assert_eq!((*(image.user_data as *mut State)).pixels_added, 2);
            lib_free(&mut image);
        }
        assert_eq!(canvas, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn random_access_round_trip() {
        let mut canvas = Vec::new();
        let mut image = image(2, 2, &mut canvas);
        let (mut r, mut g, mut b, mut a) = (0, 0, 0, 0);
        unsafe {
            assert_eq!(lib_set_pixel(&mut image, 1, 1, 10, 20, 30, 40), STATUS_OK);
            assert_eq!(
                lib_get_pixel(&mut image, 1, 1, &mut r, &mut g, &mut b, &mut a),
                STATUS_OK
            );
            assert_eq!(
                lib_set_pixel(&mut image, 2, 0, 0, 0, 0, 0),
                STATUS_INVALID_ARGUMENT
            );
            lib_free(&mut image);
        }
        assert_eq!((r, g, b, a), (10, 20, 30, 40));
        assert_eq!(&canvas[12..], &[10, 20, 30, 40]);
    }

    #[test]
    fn write_emits_pam_header_and_samples() {
        let mut canvas = Vec::new();
        let mut image = image(1, 1, &mut canvas);
        let mut out: Vec<u8> = Vec::new();
        unsafe {
            lib_add_pixel(&mut image, 0xff, 0, 0, 0x80);
            let status = lib_write(&mut image, collect, &mut out as *mut Vec<u8> as *mut c_void);
            assert_eq!(status, STATUS_OK);
            assert_eq!(lib_write(&mut image, refuse, ptr::null_mut()), STATUS_IO);
            lib_free(&mut image);
        }
        let header = b"P7\nWIDTH 1\nHEIGHT 1\nDEPTH 4\nMAXVAL 255\nTUPLTYPE RGB_ALPHA\nENDHDR\n";
        assert!(out.starts_with(header));
        assert_eq!(&out[header.len()..], &[0xff, 0, 0, 0x80]);
    }
}
