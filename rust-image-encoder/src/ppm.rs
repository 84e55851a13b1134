use std::io::Write;

use log::trace;

use crate::{
    error::Result,
    image::{Backend, Canvas, Rgba},
};

/// Extension given to files written by [`PPMBackend`].
pub const PPM_EXTENSION: &str = ".ppm";

/// Largest sample value written to the header.
const PPM_MAX_VALUE: u8 = 255;

/// Samples stored per pixel. Alpha is not persisted.
const RGB_SIZE: usize = 3;

/// Binary PPM (P6) encoder
#[derive(Debug, Default, Clone, Copy)]
pub struct PPMBackend;

impl PPMBackend {
    /// The encoder. It keeps no state of its own.
    pub fn new() -> Self {
        Self
    }
}

impl Backend for PPMBackend {
    fn name(&self) -> &str {
        "ppm"
    }

    fn init(&self, canvas: &mut Canvas) -> Result<()> {
        canvas.allocate(RGB_SIZE)?;
        canvas.set_extension(PPM_EXTENSION);
        trace!(
            "Allocated {}x{} PPM canvas",
            canvas.width(),
            canvas.height()
        );
        Ok(())
    }

    fn add_pixel(&self, canvas: &mut Canvas, pixel: Rgba) -> Result<()> {
        canvas.pixels_mut()?.push(&[pixel.r, pixel.g, pixel.b])
    }

    fn get_pixel(&self, canvas: &mut Canvas, x: usize, y: usize) -> Result<Rgba> {
        let samples = canvas.pixels()?.get(x, y)?;
        Ok(Rgba::rgb(samples[0], samples[1], samples[2]))
    }

    fn write(&self, canvas: &mut Canvas, sink: &mut dyn Write) -> Result<()> {
        let pixels = canvas.pixels()?;
        write!(sink, "P6\n{} {}\n{}\n", canvas.width(), canvas.height(), PPM_MAX_VALUE)?;
        sink.write_all(pixels.as_bytes())?;
        Ok(())
    }
}
