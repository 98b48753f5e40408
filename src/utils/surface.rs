//! Internal scaling surface
//!
//! Incoming frames are drawn onto a fixed-size surface at the configured
//! resolution scale before decoding. The surface only owns the geometry; the
//! resampling itself goes through the enhancer.

use crate::error::{ScanError, ScanResult};

/// Fixed-size drawing target for incoming frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingSurface {
    width: u32,
    height: u32,
}

impl ScalingSurface {
    /// Create a surface; both dimensions must be positive
    pub fn new(width: u32, height: u32) -> ScanResult<Self> {
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Size a frame is drawn at for `scale` in (0, 1]
    pub fn target_size(&self, scale: f32) -> (u32, u32) {
        let w = ((self.width as f32 * scale).floor() as u32).max(1);
        let h = ((self.height as f32 * scale).floor() as u32).max(1);
        (w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_surface() {
        assert!(ScalingSurface::new(0, 10).is_err());
    }

    #[test]
    fn target_size_scales_and_never_collapses() {
        let surface = ScalingSurface::new(640, 480).unwrap();
        assert_eq!(surface.target_size(1.0), (640, 480));
        assert_eq!(surface.target_size(0.5), (320, 240));
        assert_eq!(surface.target_size(0.0001), (1, 1));
    }
}
