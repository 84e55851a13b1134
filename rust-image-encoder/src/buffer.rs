use crate::error::{Error, Result};

/// Owned pixel storage with a sequential write cursor.
///
/// Pixels are stored row-major, top row first, `channels` bytes each. The cursor only ever moves
/// forward; a fresh buffer is the only way back to the start.
#[derive(Debug)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: usize,
    height: usize,
    channels: usize,
    cursor: usize,
}

impl PixelBuffer {
    /// Allocates a zeroed buffer for `width * height` pixels of `channels` bytes.
    pub fn allocate(width: usize, height: usize, channels: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument("image dimensions must be non-zero"));
        }
        if channels == 0 {
            return Err(Error::InvalidArgument("pixel must have at least one channel"));
        }
        let bytes = width
            .checked_mul(height)
            .and_then(|pixels| pixels.checked_mul(channels))
            .ok_or(Error::OutOfMemory { bytes: usize::MAX })?;

        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| Error::OutOfMemory { bytes })?;
        data.resize(bytes, 0);

        Ok(Self {
            data,
            width,
            height,
            channels,
            cursor: 0,
        })
    }

    /// Writes one pixel at the cursor and advances it.
    pub fn push(&mut self, samples: &[u8]) -> Result<()> {
        self.check_samples(samples)?;
        let end = self.cursor + self.channels;
        if end > self.data.len() {
            return Err(Error::BufferExhausted {
                capacity: self.data.len(),
            });
        }
        self.data[self.cursor..end].copy_from_slice(samples);
        self.cursor = end;
        Ok(())
    }

    /// Returns the samples of the pixel at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> Result<&[u8]> {
        let offset = self.offset(x, y)?;
        Ok(&self.data[offset..offset + self.channels])
    }

    /// Byte offset of the pixel at `(x, y)`.
    pub fn offset(&self, x: usize, y: usize) -> Result<usize> {
        if x >= self.width || y >= self.height {
            return Err(Error::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok((y * self.width + x) * self.channels)
    }

    /// The whole buffer, including pixels not yet written.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes. Never true for an allocated buffer.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes per pixel.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Byte offset of the next sequential write.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of whole pixels written sequentially so far.
    pub fn pixels_written(&self) -> usize {
        self.cursor / self.channels
    }

    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.as_mut_ptr()
    }

    /// Moves the cursor to `cursor`, clamped so it never goes backwards or past the end.
    pub(crate) fn advance_to(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.data.len()).max(self.cursor);
    }

    fn check_samples(&self, samples: &[u8]) -> Result<()> {
        if samples.len() != self.channels {
            return Err(Error::InvalidArgument("sample count does not match channel count"));
        }
        Ok(())
    }
}
