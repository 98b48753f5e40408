use crate::error::{ScanError, ScanResult};

/// Bytes per RGBA pixel
pub const CHANNELS: usize = 4;

/// Immutable RGBA pixel buffer.
///
/// `data.len() == width * height * 4` always holds. Transforms never mutate a
/// frame in place; they build a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap an RGBA buffer, validating its length against the dimensions
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> ScanResult<Self> {
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidDimensions { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(ScanError::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Frame with every pixel set to `rgba`
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> ScanResult<Self> {
        let count = width as usize * height as usize;
        let mut data = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            data.extend_from_slice(&rgba);
        }
        Self::new(width, height, data)
    }

    /// Build a frame from a buffer the caller has already sized correctly
    pub(crate) fn from_parts(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * CHANNELS);
        Self {
            width,
            height,
            data,
        }
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw RGBA bytes, row-major
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Give up the frame and take its buffer
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// RGBA value at `(x, y)`; callers keep coordinates in range
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// True when both frames share dimensions
    pub fn same_size(&self, other: &Frame) -> bool {
        self.dimensions() == other.dimensions()
    }
}
