pub mod detection;
pub mod frame;
pub mod point;
pub mod rect;

pub use detection::DetectionResult;
pub use frame::Frame;
pub use point::Point;
pub use rect::{BoundingBox, Rect, Window};
