use serde::{Deserialize, Serialize};

use super::Point;

/// Integer rectangle in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when width and height are both positive
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Clip to a `frame_width x frame_height` frame.
    ///
    /// Returns `None` when nothing of the rectangle lies inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<Rect> {
        if self.x >= frame_width || self.y >= frame_height || !self.has_area() {
            return None;
        }
        let width = self.width.min(frame_width - self.x);
        let height = self.height.min(frame_height - self.y);
        Some(Rect::new(self.x, self.y, width, height))
    }
}

/// Candidate sub-rectangle of a frame at a given search scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Scale the window was generated at (1.0 = full frame)
    pub scale: f32,
}

impl Window {
    /// Integer rectangle covered by the window
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }
}

/// Axis-aligned box in floating point coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Minimum x
    pub min_x: f32,
    /// Minimum y
    pub min_y: f32,
    /// Maximum x
    pub max_x: f32,
    /// Maximum y
    pub max_y: f32,
}

impl BoundingBox {
    /// Smallest box containing every point; `None` for an empty slice
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in &points[1..] {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    /// Area of the box
    pub fn area(&self) -> f32 {
        (self.max_x - self.min_x).max(0.0) * (self.max_y - self.min_y).max(0.0)
    }

    /// True when `other` lies inside this box, edges included
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.min_y >= self.min_y
            && other.max_x <= self.max_x
            && other.max_y <= self.max_y
    }

    /// Area shared with `other` (0 when disjoint)
    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let w = self.max_x.min(other.max_x) - self.min_x.max(other.min_x);
        let h = self.max_y.min(other.max_y) - self.min_y.max(other.min_y);
        if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_trims_overhanging_rect() {
        let rect = Rect::new(90, 10, 50, 200);
        assert_eq!(rect.clamp_to(100, 100), Some(Rect::new(90, 10, 10, 90)));
        assert_eq!(Rect::new(100, 0, 5, 5).clamp_to(100, 100), None);
        assert_eq!(Rect::new(0, 0, 0, 5).clamp_to(100, 100), None);
    }

    #[test]
    fn intersection_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::from_points(&[Point::new(0.0, 0.0), Point::new(10.0, 10.0)]).unwrap();
        let b = BoundingBox::from_points(&[Point::new(20.0, 20.0), Point::new(30.0, 30.0)]).unwrap();
        assert_eq!(a.intersection_area(&b), 0.0);
        assert_eq!(a.area(), 100.0);
    }

    #[test]
    fn intersection_of_overlapping_boxes() {
        let a = BoundingBox::from_points(&[Point::new(0.0, 0.0), Point::new(10.0, 10.0)]).unwrap();
        let b = BoundingBox::from_points(&[Point::new(5.0, 0.0), Point::new(15.0, 10.0)]).unwrap();
        assert_eq!(a.intersection_area(&b), 50.0);
    }

    #[test]
    fn point_box_containment() {
        let square = BoundingBox::from_points(&[Point::new(0.0, 0.0), Point::new(10.0, 10.0)]).unwrap();
        let inside = BoundingBox::from_points(&[Point::new(10.0, 3.0)]).unwrap();
        let outside = BoundingBox::from_points(&[Point::new(11.0, 3.0)]).unwrap();
        assert!(square.contains(&inside));
        assert!(!square.contains(&outside));
        assert!(inside.contains(&inside));
    }
}
