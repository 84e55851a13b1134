//! Writes images through whichever encoder is configured: the built-in PPM encoder, or one loaded
//! from a shared library at runtime.
#![warn(missing_docs)]

mod buffer;
/// Backend selection and settings
pub mod config;
/// The image context callers write pixels through
pub mod context;
mod error;
/// Defines the backend interface and the types it works on
pub mod image;
/// Encoders loaded from shared libraries
pub mod plugin;
/// Encoder for PPM images
pub mod ppm;

pub use buffer::PixelBuffer;
pub use config::{BackendRegistry, EncoderConfig};
pub use context::ImageContext;
pub use error::{Error, Result};
pub use image::{Backend, Canvas, ColorModel, ImageFormat, Rgba};
