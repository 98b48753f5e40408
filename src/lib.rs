//! rust_qr_live - adaptive multi-stage QR scanning for live video frames
//!
//! Each frame goes through a staged scheduler that spends only as much
//! enhancement and search effort as the frame budget allows:
//! a direct decode first, then sharpening with a sliding-window search, then a
//! center crop that is upscaled and contrast-boosted. Recent Stage 1 hit
//! history decides whether preprocessing is worth running at all.
//!
//! The scheduler is usually driven through [`worker::WorkerHandle`], which
//! runs a [`DecodeSession`] on its own thread behind a request/response
//! protocol. [`scan_image`] covers single-shot decoding of still images.

/// Session configuration and partial updates
pub mod config;
/// Decode primitive seam, invoker and the `rqrr` backend
pub mod decode;
/// Image Enhancer: native and pure pixel transforms
pub mod enhance;
/// Error taxonomy
pub mod error;
/// Frame Buffer for temporal merging
pub mod frame_buffer;
/// Core data structures (Frame, Point, Rect, DetectionResult)
pub mod models;
/// MRZ text-zone parsing
pub mod mrz;
/// Multi-stage decode scheduler
pub mod pipeline;
/// Crop, center crop and window generation
pub mod region;
/// Sliding-window search and deduplication
pub mod search;
/// Performance Tracker
pub mod stats;
/// Image loading and dataset helpers
pub mod tools;
/// Luma conversion and the scaling surface
pub mod utils;
/// Worker message loop and protocol
pub mod worker;

pub use config::{ConfigPatch, ProcessingConfig};
pub use decode::{DecodePrimitive, RqrrDecoder};
pub use enhance::Enhancer;
pub use error::{ScanError, ScanResult};
pub use models::{DetectionResult, Frame, Point};
pub use pipeline::{DecodeSession, FrameOutcome};

use decode::DecodeInvoker;

/// Decode every code in a still RGBA image.
///
/// Runs a full-frame pass followed by the overlapping region scan, which
/// handles codes that are small relative to the image.
pub fn scan_image(frame: &Frame) -> Vec<DetectionResult> {
    let invoker = DecodeInvoker::new(Box::new(RqrrDecoder::with_region_scan()));
    search::dedup(invoker.decode_frame(frame))
}
