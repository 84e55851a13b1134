use std::{any::Any, fmt, io::Write, str::FromStr};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::{
    buffer::PixelBuffer,
    error::{Error, Result},
};

/// Exclusive upper bound of valid [`ColorModel`] codes.
pub const MODEL_MAX: i32 = 1;

/// Exclusive upper bound of valid [`ImageFormat`] codes.
pub const FORMAT_MAX: i32 = 3;

/// The color model pixels are supplied in. Only RGB exists for now.
#[derive(PartialEq, Eq, FromPrimitive, Debug, Clone, Copy)]
pub enum ColorModel {
    /// Red, green and blue samples.
    Rgb = 0,
}

impl ColorModel {
    /// Converts a numeric code, rejecting anything outside `0..MODEL_MAX`.
    pub fn from_code(code: i32) -> Result<Self> {
        FromPrimitive::from_i32(code).ok_or(Error::InvalidArgument("unknown color model"))
    }

    /// The numeric code of this model.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Number of samples a pixel carries in this model, not counting alpha.
    pub fn channels(self) -> usize {
        match self {
            ColorModel::Rgb => 3,
        }
    }
}

/// Which encoder an image context should use.
#[derive(PartialEq, Eq, FromPrimitive, Debug, Clone, Copy)]
pub enum ImageFormat {
    /// Whatever the configuration names as the default.
    Default = 0,
    /// The built-in binary pixmap encoder.
    Ppm = 1,
    /// An encoder loaded from a shared library at runtime.
    Library = 2,
}

impl ImageFormat {
    /// Converts a numeric code, rejecting anything outside `0..FORMAT_MAX`.
    pub fn from_code(code: i32) -> Result<Self> {
        FromPrimitive::from_i32(code).ok_or(Error::InvalidArgument("unknown image format"))
    }

    /// The numeric code of this format.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Lowercase name, as accepted by `FromStr`.
    pub fn name(self) -> &'static str {
        match self {
            ImageFormat::Default => "default",
            ImageFormat::Ppm => "ppm",
            ImageFormat::Library => "library",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageFormat {
    type Err = Error;

    /// Accepts a format name or its numeric code.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(ImageFormat::Default),
            "ppm" => Ok(ImageFormat::Ppm),
            "library" | "plugin" => Ok(ImageFormat::Library),
            other => other
                .parse::<i32>()
                .map_err(|_| Error::InvalidArgument("unknown image format"))
                .and_then(ImageFormat::from_code),
        }
    }
}

/// A single pixel as supplied by callers. Backends without alpha drop `a`.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct Rgba {
    /// Red sample.
    pub r: u8,
    /// Green sample.
    pub g: u8,
    /// Blue sample.
    pub b: u8,
    /// Alpha, 255 being opaque.
    pub a: u8,
}

impl Rgba {
    /// A pixel with explicit alpha.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// An opaque pixel.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }
}

/// The per-context state a backend works on: dimensions, the shared pixel buffer, the file
/// extension and whatever private data the backend chose to keep.
#[derive(Debug)]
pub struct Canvas {
    width: usize,
    height: usize,
    model: ColorModel,
    pixels: Option<PixelBuffer>,
    extension: String,
    private: Option<Box<dyn Any>>,
}

impl Canvas {
    pub(crate) fn new(width: usize, height: usize, model: ColorModel) -> Self {
        Self {
            width,
            height,
            model,
            pixels: None,
            extension: String::new(),
            private: None,
        }
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Color model the caller supplies pixels in.
    pub fn model(&self) -> ColorModel {
        self.model
    }

    /// Allocates the pixel buffer with `channels` bytes per pixel, replacing any previous one.
    pub fn allocate(&mut self, channels: usize) -> Result<()> {
        self.pixels = Some(PixelBuffer::allocate(self.width, self.height, channels)?);
        Ok(())
    }

    /// The pixel buffer, or [`Error::NotInitialized`] before [`allocate`](Self::allocate).
    pub fn pixels(&self) -> Result<&PixelBuffer> {
        self.pixels.as_ref().ok_or(Error::NotInitialized)
    }

    /// Mutable access to the pixel buffer.
    pub fn pixels_mut(&mut self) -> Result<&mut PixelBuffer> {
        self.pixels.as_mut().ok_or(Error::NotInitialized)
    }

    /// Whether the pixel buffer exists.
    pub fn is_allocated(&self) -> bool {
        self.pixels.is_some()
    }

    /// Extension output files get, dot included. Empty until the backend sets one.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Sets the extension output files get.
    pub fn set_extension(&mut self, extension: impl Into<String>) {
        self.extension = extension.into();
    }

    /// Stores backend-private data, replacing whatever was there.
    pub fn set_private<T: Any>(&mut self, value: T) {
        self.private = Some(Box::new(value));
    }

    /// The backend-private data, if it is a `T`.
    pub fn private_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.private.as_mut()?.downcast_mut()
    }

    /// Removes and returns backend-private data of type `T`. Data of another type is left in
    /// place.
    pub fn take_private<T: Any>(&mut self) -> Option<T> {
        match self.private.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.private = Some(other);
                None
            }
        }
    }

    /// Borrows the pixel buffer and the private data at the same time.
    pub(crate) fn split_mut<T: Any>(&mut self) -> (Option<&mut PixelBuffer>, Option<&mut T>) {
        let private = self.private.as_mut().and_then(|p| p.downcast_mut());
        (self.pixels.as_mut(), private)
    }

    /// Drops the pixel buffer and any private data left behind by the backend.
    pub(crate) fn release(&mut self) {
        self.pixels = None;
        self.private = None;
    }
}

/// The operations every encoder provides. Implement this for any format that should be selectable
/// through an image context.
///
/// `init`, `add_pixel` and `write` are required. The others have defaults: random access reports
/// [`Error::Unsupported`] and `free` does nothing, which suits backends that only append and keep
/// no private resources.
pub trait Backend {
    /// Short name used in log messages.
    fn name(&self) -> &str;

    /// Allocates the pixel buffer for the dimensions stored on `canvas` and sets its extension.
    fn init(&self, canvas: &mut Canvas) -> Result<()>;

    /// Appends one pixel at the cursor.
    fn add_pixel(&self, canvas: &mut Canvas, pixel: Rgba) -> Result<()>;

    /// Overwrites the pixel at `(x, y)`.
    fn set_pixel(&self, _canvas: &mut Canvas, _x: usize, _y: usize, _pixel: Rgba) -> Result<()> {
        Err(Error::Unsupported("set_pixel"))
    }

    /// Reads the pixel at `(x, y)`.
    fn get_pixel(&self, _canvas: &mut Canvas, _x: usize, _y: usize) -> Result<Rgba> {
        Err(Error::Unsupported("get_pixel"))
    }

    /// Serializes the whole image to `sink`.
    fn write(&self, canvas: &mut Canvas, sink: &mut dyn Write) -> Result<()>;

    /// Releases backend-private resources. The pixel buffer is released by the caller.
    fn free(&self, _canvas: &mut Canvas) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_enums() {
        assert_eq!(ColorModel::from_code(0).unwrap(), ColorModel::Rgb);
        assert!(ColorModel::from_code(MODEL_MAX).is_err());
        assert!(ColorModel::from_code(-1).is_err());
        assert_eq!(ImageFormat::from_code(2).unwrap(), ImageFormat::Library);
        assert!(ImageFormat::from_code(FORMAT_MAX).is_err());
    }

    #[test]
    fn format_parses_names_and_codes() {
        assert_eq!("PPM".parse::<ImageFormat>().unwrap(), ImageFormat::Ppm);
        assert_eq!("plugin".parse::<ImageFormat>().unwrap(), ImageFormat::Library);
        assert_eq!("0".parse::<ImageFormat>().unwrap(), ImageFormat::Default);
        assert!("jpeg".parse::<ImageFormat>().is_err());
        assert!("7".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn private_data_keeps_its_type() {
        let mut canvas = Canvas::new(1, 1, ColorModel::Rgb);
        canvas.set_private(41u32);
        *canvas.private_mut::<u32>().unwrap() += 1;
        assert!(canvas.take_private::<String>().is_none());
        assert_eq!(canvas.take_private::<u32>(), Some(42));
        assert!(canvas.private_mut::<u32>().is_none());
    }
}
