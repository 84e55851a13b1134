/// C interface implemented by image modules
pub mod abi;
mod loader;

use std::{
    ffi::{c_int, c_void},
    io::{self, Write},
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};

use libloading::Library;
use log::{debug, trace};

use crate::{
    error::{Error, Result},
    image::{Backend, Canvas, Rgba},
};
use abi::{
    check_status, RawImage, DEFAULT_CHANNELS, MAX_CHANNELS, STATUS_INVALID_ARGUMENT, STATUS_IO,
    STATUS_OK,
};
use loader::PluginVTable;

/// Per-context state of a module, kept on the canvas between calls.
#[derive(Debug)]
struct ModuleImage(Box<RawImage>);

/// An encoder provided by a shared library loaded at runtime.
///
/// The library stays open for as long as this backend is alive.
#[derive(Debug)]
pub struct PluginBackend {
    path: PathBuf,
    vtable: PluginVTable,
    _library: Option<Library>,
}

impl PluginBackend {
    /// Opens the module at `path` and checks that it exports the mandatory entry points.
    pub fn load(path: &Path) -> Result<Self> {
        let (library, vtable) = loader::open_module(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            vtable,
            _library: Some(library),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_vtable(path: &Path, vtable: PluginVTable) -> Self {
        Self {
            path: path.to_path_buf(),
            vtable,
            _library: None,
        }
    }

    /// Where the module was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Points the module state at the current pixel buffer, runs `call`, then picks up the cursor.
    fn with_image<R>(
        &self,
        canvas: &mut Canvas,
        call: impl FnOnce(*mut RawImage) -> R,
    ) -> Result<R> {
        let (pixels, image) = canvas.split_mut::<ModuleImage>();
        let (pixels, ModuleImage(image)) = match (pixels, image) {
            (Some(pixels), Some(image)) => (pixels, image),
            _ => return Err(Error::NotInitialized),
        };
        image.canvas = pixels.as_mut_ptr();
        image.canvas_len = pixels.len();
        image.cursor = pixels.cursor();

        let result = call(&mut **image as *mut RawImage);

        pixels.advance_to(image.cursor);
        Ok(result)
    }

    fn release(&self, image: &mut RawImage) {
        if let Some(free) = self.vtable.free {
            image.canvas = std::ptr::null_mut();
            image.canvas_len = 0;
            // SAFETY: `image` is the state this module initialized and has not freed yet.
            unsafe { free(image) };
        }
    }

    fn check_bounds(canvas: &Canvas, x: usize, y: usize) -> Result<()> {
        if x >= canvas.width() || y >= canvas.height() {
            return Err(Error::OutOfBounds {
                x,
                y,
                width: canvas.width(),
                height: canvas.height(),
            });
        }
        Ok(())
    }
}

impl Backend for PluginBackend {
    fn name(&self) -> &str {
        "library"
    }

    fn init(&self, canvas: &mut Canvas) -> Result<()> {
        let mut image = Box::new(RawImage::new(
            canvas.width(),
            canvas.height(),
            canvas.model().code(),
        ));
        // SAFETY: `image` is a valid, exclusively borrowed RawImage for the duration of the call.
        check_status(unsafe { (self.vtable.init)(&mut *image) }, 0)?;

        let channels = match image.channels {
            0 => DEFAULT_CHANNELS,
            n => n,
        };
        if channels > MAX_CHANNELS {
            self.release(&mut image);
            return Err(Error::InvalidArgument("image module declared too many channels"));
        }
        if let Err(err) = canvas.allocate(channels) {
            self.release(&mut image);
            return Err(err);
        }
        image.channels = channels;
        canvas.set_extension(image.extension());
        canvas.set_private(ModuleImage(image));
        debug!(
            "Image module {} initialized with {} channels",
            self.path.display(),
            channels
        );
        Ok(())
    }

    fn add_pixel(&self, canvas: &mut Canvas, pixel: Rgba) -> Result<()> {
        let capacity = canvas.pixels()?.len();
        let add_pixel = self.vtable.add_pixel;
        // SAFETY: `with_image` hands over a RawImage whose canvas points at a live buffer of
        // `canvas_len` bytes.
        let status = self.with_image(canvas, |image| unsafe {
            add_pixel(image, pixel.r, pixel.g, pixel.b, pixel.a)
        })?;
        check_status(status, capacity)
    }

    fn set_pixel(&self, canvas: &mut Canvas, x: usize, y: usize, pixel: Rgba) -> Result<()> {
        let set_pixel = self.vtable.set_pixel.ok_or(Error::Unsupported("set_pixel"))?;
        Self::check_bounds(canvas, x, y)?;
        let capacity = canvas.pixels()?.len();
        // SAFETY: see `add_pixel`; the coordinates are inside the image.
        let status = self.with_image(canvas, |image| unsafe {
            set_pixel(image, x, y, pixel.r, pixel.g, pixel.b, pixel.a)
        })?;
        check_status(status, capacity)
    }

    fn get_pixel(&self, canvas: &mut Canvas, x: usize, y: usize) -> Result<Rgba> {
        let get_pixel = self.vtable.get_pixel.ok_or(Error::Unsupported("get_pixel"))?;
        Self::check_bounds(canvas, x, y)?;
        let capacity = canvas.pixels()?.len();
        let mut pixel = Rgba::default();
        // SAFETY: see `add_pixel`; the out pointers refer to fields of `pixel`.
        let status = self.with_image(canvas, |image| unsafe {
            get_pixel(image, x, y, &mut pixel.r, &mut pixel.g, &mut pixel.b, &mut pixel.a)
        })?;
        check_status(status, capacity)?;
        Ok(pixel)
    }

    fn write(&self, canvas: &mut Canvas, sink: &mut dyn Write) -> Result<()> {
        let write = self.vtable.write;
        let mut bridge = SinkBridge { sink, error: None };
        let bridge_ptr = &mut bridge as *mut SinkBridge<'_> as *mut c_void;
        // SAFETY: `bridge_ptr` stays valid until the call returns and is only used by
        // `write_to_sink`.
        let status =
            self.with_image(canvas, |image| unsafe { write(image, write_to_sink, bridge_ptr) })?;
        if let Some(err) = bridge.error {
            return Err(Error::Io(err));
        }
        check_status(status, 0)
    }

    fn free(&self, canvas: &mut Canvas) {
        if let Some(ModuleImage(mut image)) = canvas.take_private::<ModuleImage>() {
            trace!("Releasing image module state for {}", self.path.display());
            self.release(&mut image);
        }
    }
}

/// Carries the caller's sink through the module's write callback.
struct SinkBridge<'a> {
    sink: &'a mut dyn Write,
    error: Option<io::Error>,
}

unsafe extern "C" fn write_to_sink(sink: *mut c_void, data: *const u8, len: usize) -> c_int {
    let bridge = &mut *(sink as *mut SinkBridge<'_>);
    if bridge.error.is_some() {
        return STATUS_IO;
    }
    if len == 0 {
        return STATUS_OK;
    }
    if data.is_null() {
        return STATUS_INVALID_ARGUMENT;
    }
    let bytes = std::slice::from_raw_parts(data, len);
    // Unwinding into the module is undefined behaviour.
    match panic::catch_unwind(AssertUnwindSafe(|| bridge.sink.write_all(bytes))) {
        Ok(Ok(())) => STATUS_OK,
        Ok(Err(err)) => {
            bridge.error = Some(err);
            STATUS_IO
        }
        Err(_) => {
            bridge.error = Some(io::Error::new(io::ErrorKind::Other, "image sink panicked"));
            STATUS_IO
        }
    }
}
