//! Utility functions for frame processing
//!
//! - Luma conversion (RGBA to luminance)
//! - Scaling surface geometry

pub mod grayscale;
pub mod surface;

pub use surface::ScalingSurface;
