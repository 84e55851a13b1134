use std::{fmt, io::Write, rc::Rc};

use log::{debug, error};

use crate::{
    config::BackendRegistry,
    error::{Error, Result},
    image::{Backend, Canvas, ColorModel, ImageFormat, Rgba},
};

/// Base name used when the caller supplies an empty one.
pub const DEFAULT_BASE_NAME: &str = "output";

/// Capacity used by [`ImageContext::file_name`].
pub const MAX_FILENAME_LEN: usize = 255;

struct Session {
    format: ImageFormat,
    backend: Rc<dyn Backend>,
    canvas: Canvas,
}

/// One image being encoded.
///
/// Starts out empty. [`init`](Self::init) picks a backend and allocates the pixel buffer, pixels
/// are appended with [`add_pixel`](Self::add_pixel), and [`write`](Self::write) serializes them.
/// [`free`](Self::free) returns the context to its empty state; dropping the context does the
/// same.
#[derive(Default)]
pub struct ImageContext {
    session: Option<Session>,
}

impl ImageContext {
    /// An empty, uninitialized context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepares the context for a `width` x `height` image in `format`.
    ///
    /// Arguments and the format are checked before anything is touched, so a call rejected for
    /// those reasons leaves an initialized context as it was. Once they pass, the previous image
    /// is released; if the backend then fails, the context is left uninitialized with nothing
    /// allocated.
    pub fn init(
        &mut self,
        registry: &BackendRegistry,
        width: usize,
        height: usize,
        model: ColorModel,
        format: ImageFormat,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument("image dimensions must be non-zero"));
        }
        let (format, backend) = registry.resolve(format)?;

        self.free();
        let mut canvas = Canvas::new(width, height, model);
        if let Err(err) = backend.init(&mut canvas) {
            error!("Error initializing image context: {}", err);
            backend.free(&mut canvas);
            return Err(err);
        }
        if !canvas.is_allocated() {
            error!(
                "Error initializing image context: {} backend allocated no pixels",
                backend.name()
            );
            backend.free(&mut canvas);
            return Err(Error::InvalidArgument("backend did not allocate a pixel buffer"));
        }

        debug!(
            "Initialized {}x{} {} image context",
            width, height, format
        );
        self.session = Some(Session {
            format,
            backend,
            canvas,
        });
        Ok(())
    }

    /// [`init`](Self::init) with the color model and format given as their numeric codes.
    pub fn init_with_codes(
        &mut self,
        registry: &BackendRegistry,
        width: usize,
        height: usize,
        model: i32,
        format: i32,
    ) -> Result<()> {
        let model = ColorModel::from_code(model)?;
        let format = ImageFormat::from_code(format)?;
        self.init(registry, width, height, model, format)
    }

    /// Appends a pixel at the cursor. Fails with [`Error::BufferExhausted`] once every pixel has
    /// been written.
    pub fn add_pixel(&mut self, r: u8, g: u8, b: u8, a: u8) -> Result<()> {
        let session = self.session_mut()?;
        session
            .backend
            .add_pixel(&mut session.canvas, Rgba::new(r, g, b, a))
    }

    /// Appends an opaque pixel.
    pub fn add_rgb(&mut self, r: u8, g: u8, b: u8) -> Result<()> {
        self.add_pixel(r, g, b, 0xff)
    }

    /// Overwrites the pixel at `(x, y)` without moving the cursor, if the backend supports it.
    pub fn set_pixel(&mut self, x: usize, y: usize, pixel: Rgba) -> Result<()> {
        let session = self.session_mut()?;
        session.backend.set_pixel(&mut session.canvas, x, y, pixel)
    }

    /// Reads the pixel at `(x, y)`, if the backend supports it.
    pub fn get_pixel(&mut self, x: usize, y: usize) -> Result<Rgba> {
        let session = self.session_mut()?;
        session.backend.get_pixel(&mut session.canvas, x, y)
    }

    /// Serializes the image to `sink`. The sink is neither flushed nor closed.
    pub fn write(&mut self, sink: &mut dyn Write) -> Result<()> {
        let session = self.session_mut()?;
        session.backend.write(&mut session.canvas, sink)
    }

    /// Releases the backend's private state and the pixel buffer. Does nothing if the context is
    /// not initialized.
    pub fn free(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.backend.free(&mut session.canvas);
            session.canvas.release();
            debug!("Released {} image context", session.format);
        }
    }

    /// Builds an output file name from `base` that carries this image's extension.
    ///
    /// A name that already ends in the extension is returned unchanged; anything else has the
    /// extension appended. An empty `base` becomes [`DEFAULT_BASE_NAME`]. Fails if the result is
    /// longer than `capacity` bytes.
    pub fn filename(&self, base: &str, capacity: usize) -> Result<String> {
        let extension = self.session()?.canvas.extension();
        let base = if base.is_empty() { DEFAULT_BASE_NAME } else { base };

        let name = if base.len() > extension.len() && base.ends_with(extension) {
            base.to_string()
        } else {
            format!("{base}{extension}")
        };

        if name.len() > capacity {
            error!("Error building image output filename");
            return Err(Error::NameTooLong {
                len: name.len(),
                capacity,
            });
        }
        Ok(name)
    }

    /// [`filename`](Self::filename) limited to [`MAX_FILENAME_LEN`].
    pub fn file_name(&self, base: &str) -> Result<String> {
        self.filename(base, MAX_FILENAME_LEN)
    }

    /// Whether `init` succeeded and `free` has not run since.
    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// Image width in pixels.
    pub fn width(&self) -> Result<usize> {
        Ok(self.session()?.canvas.width())
    }

    /// Image height in pixels.
    pub fn height(&self) -> Result<usize> {
        Ok(self.session()?.canvas.height())
    }

    /// Color model given to `init`.
    pub fn color_model(&self) -> Result<ColorModel> {
        Ok(self.session()?.canvas.model())
    }

    /// The concrete format in use. Never [`ImageFormat::Default`].
    pub fn format(&self) -> Result<ImageFormat> {
        Ok(self.session()?.format)
    }

    /// Extension of the active backend, dot included.
    pub fn extension(&self) -> Result<&str> {
        Ok(self.session()?.canvas.extension())
    }

    /// Number of pixels appended so far.
    pub fn pixels_written(&self) -> Result<usize> {
        Ok(self.session()?.canvas.pixels()?.pixels_written())
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(Error::NotInitialized)
    }

    fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or(Error::NotInitialized)
    }
}

impl Drop for ImageContext {
    fn drop(&mut self) {
        self.free();
    }
}

impl fmt::Debug for ImageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(session) => f
                .debug_struct("ImageContext")
                .field("format", &session.format)
                .field("backend", &session.backend.name())
                .field("canvas", &session.canvas)
                .finish(),
            None => f
                .debug_struct("ImageContext")
                .field("initialized", &false)
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;

    fn ppm_context(width: usize, height: usize) -> ImageContext {
        let mut ctx = ImageContext::new();
        ctx.init(
            &BackendRegistry::default(),
            width,
            height,
            ColorModel::Rgb,
            ImageFormat::Default,
        )
        .unwrap();
        ctx
    }

    #[test_log::test]
    fn init_then_free_clears_buffer() {
        let mut ctx = ppm_context(5, 7);
        assert!(ctx.is_initialized());
        assert_eq!(ctx.format().unwrap(), ImageFormat::Ppm);
        assert_eq!(ctx.extension().unwrap(), ".ppm");
        ctx.free();
        assert!(!ctx.is_initialized());
        assert!(matches!(ctx.pixels_written(), Err(Error::NotInitialized)));
        ctx.free();
    }

    #[test_log::test]
    fn operations_require_init() {
        let mut ctx = ImageContext::new();
        assert!(matches!(ctx.add_rgb(1, 2, 3), Err(Error::NotInitialized)));
        assert!(matches!(ctx.write(&mut Vec::new()), Err(Error::NotInitialized)));
        assert!(matches!(ctx.get_pixel(0, 0), Err(Error::NotInitialized)));
        assert!(matches!(ctx.file_name("scan"), Err(Error::NotInitialized)));
    }

    #[test_log::test]
    fn zero_dimensions_are_rejected() {
        let registry = BackendRegistry::default();
        let mut ctx = ImageContext::new();
        for (width, height) in [(0, 1), (1, 0), (0, 0)] {
            assert!(matches!(
                ctx.init(&registry, width, height, ColorModel::Rgb, ImageFormat::Ppm),
                Err(Error::InvalidArgument(_))
            ));
            assert!(!ctx.is_initialized());
        }
    }

    #[test_log::test]
    fn unknown_codes_are_rejected() {
        let registry = BackendRegistry::default();
        let mut ctx = ImageContext::new();
        assert!(matches!(
            ctx.init_with_codes(&registry, 1, 1, 1, 1),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            ctx.init_with_codes(&registry, 1, 1, 0, 3),
            Err(Error::InvalidArgument(_))
        ));
        ctx.init_with_codes(&registry, 1, 1, 0, 1).unwrap();
        assert_eq!(ctx.color_model().unwrap(), ColorModel::Rgb);
    }

    #[test_log::test]
    fn library_without_module_leaves_context_alone() {
        let registry = BackendRegistry::new(EncoderConfig::new());
        let mut ctx = ImageContext::new();
        assert!(matches!(
            ctx.init(&registry, 2, 2, ColorModel::Rgb, ImageFormat::Library),
            Err(Error::NotConfigured)
        ));
        assert!(!ctx.is_initialized());
    }

    #[test_log::test]
    fn rejected_reinit_keeps_previous_image() {
        let mut ctx = ppm_context(2, 2);
        ctx.add_rgb(1, 1, 1).unwrap();
        let registry = BackendRegistry::default();

        assert!(matches!(
            ctx.init(&registry, 2, 2, ColorModel::Rgb, ImageFormat::Library),
            Err(Error::NotConfigured)
        ));
        assert!(ctx.is_initialized());
        assert_eq!(ctx.pixels_written().unwrap(), 1);

        assert!(matches!(
            ctx.init(&registry, 0, 2, ColorModel::Rgb, ImageFormat::Ppm),
            Err(Error::InvalidArgument(_))
        ));
        assert!(ctx.is_initialized());
        assert_eq!(ctx.width().unwrap(), 2);
        assert_eq!(ctx.get_pixel(0, 0).unwrap(), Rgba::rgb(1, 1, 1));
    }

    #[test_log::test]
    fn rejected_codes_keep_previous_image() {
        let mut ctx = ppm_context(1, 1);
        ctx.add_rgb(4, 5, 6).unwrap();
        assert!(ctx
            .init_with_codes(&BackendRegistry::default(), 1, 1, 0, 9)
            .is_err());
        assert_eq!(ctx.pixels_written().unwrap(), 1);
    }

    #[test_log::test]
    fn reinit_rewinds_cursor() {
        let mut ctx = ppm_context(1, 1);
        ctx.add_rgb(1, 1, 1).unwrap();
        assert_eq!(ctx.pixels_written().unwrap(), 1);
        ctx.init(
            &BackendRegistry::default(),
            1,
            1,
            ColorModel::Rgb,
            ImageFormat::Ppm,
        )
        .unwrap();
        assert_eq!(ctx.pixels_written().unwrap(), 0);
        ctx.add_rgb(2, 2, 2).unwrap();
    }

    #[test_log::test]
    fn filename_appends_missing_extension() {
        let ctx = ppm_context(1, 1);
        assert_eq!(ctx.file_name("scan").unwrap(), "scan.ppm");
        assert_eq!(ctx.file_name("").unwrap(), "output.ppm");
        assert_eq!(ctx.file_name("scan.png").unwrap(), "scan.png.ppm");
        assert_eq!(ctx.file_name(".ppm").unwrap(), ".ppm.ppm");
    }

    #[test_log::test]
    fn filename_keeps_existing_extension() {
        let ctx = ppm_context(1, 1);
        let once = ctx.file_name("coverage/site-a.ppm").unwrap();
        assert_eq!(once, "coverage/site-a.ppm");
        assert_eq!(ctx.file_name(&once).unwrap(), once);
    }

    #[test_log::test]
    fn filename_respects_capacity() {
        let ctx = ppm_context(1, 1);
        assert_eq!(ctx.filename("scan", 8).unwrap(), "scan.ppm");
        assert!(matches!(
            ctx.filename("scan", 7),
            Err(Error::NameTooLong { len: 8, capacity: 7 })
        ));
        assert!(matches!(
            ctx.filename("scan.ppm", 7),
            Err(Error::NameTooLong { len: 8, capacity: 7 })
        ));
    }

    #[test_log::test]
    fn get_pixel_delegates_to_backend() {
        let mut ctx = ppm_context(2, 1);
        ctx.add_pixel(10, 20, 30, 0).unwrap();
        assert_eq!(ctx.get_pixel(0, 0).unwrap(), Rgba::rgb(10, 20, 30));
        assert!(matches!(
            ctx.set_pixel(1, 0, Rgba::rgb(1, 1, 1)),
            Err(Error::Unsupported(_))
        ));
    }
}
