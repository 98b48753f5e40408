use serde::{Deserialize, Serialize};

use super::{BoundingBox, Point};

/// One decoded code with its polygon in frame-global coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Decoded payload
    pub data: String,
    /// Symbol version reported by the decoder
    pub version: u32,
    /// Corner polygon; may be empty when the decoder gives no location
    pub bounds: Vec<Point>,
}

impl DetectionResult {
    /// Create a new detection result
    pub fn new(data: impl Into<String>, version: u32, bounds: Vec<Point>) -> Self {
        Self {
            data: data.into(),
            version,
            bounds,
        }
    }

    /// Axis-aligned box around `bounds`
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.bounds)
    }

    /// Same result with every bound shifted by `(dx, dy)`
    pub fn translated(mut self, dx: f32, dy: f32) -> Self {
        for p in &mut self.bounds {
            *p = p.translate(dx, dy);
        }
        self
    }

    /// Same result with x and y scaled independently
    pub fn scaled_xy(mut self, fx: f32, fy: f32) -> Self {
        for p in &mut self.bounds {
            *p = p.scale_xy(fx, fy);
        }
        self
    }
}
