//! Error types shared across the crate

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the scanning session and worker.
///
/// Decode and enhancement failures inside a frame never show up here; they are
/// recovered where they happen and only logged.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Pixel buffer length does not match `width * height * 4`
    #[error("invalid frame buffer: expected {expected} bytes, got {actual}")]
    FrameSize {
        /// Required byte length
        expected: usize,
        /// Byte length that was supplied
        actual: usize,
    },
    /// Zero-sized or otherwise unusable dimensions
    #[error("invalid dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
    },
    /// A frame arrived before `init`
    #[error("decoder not initialized")]
    NotInitialized,
    /// A frame arrived before the scaling surface was created
    #[error("scaling surface not ready")]
    SurfaceNotReady,
    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The decode primitive could not be loaded
    #[error("failed to load decode primitive: {0}")]
    InitFailed(String),
    /// The decode primitive reported a failure
    #[error("decode failed: {0}")]
    Decode(String),
    /// MRZ text could not be parsed
    #[error("failed to parse MRZ: {0}")]
    Mrz(String),
    /// Malformed request or response
    #[error("protocol error: {0}")]
    Protocol(String),
    /// No correlated response within the caller's deadline
    #[error("no response within {0:?}")]
    Timeout(Duration),
    /// The worker context has gone away
    #[error("worker channel closed")]
    WorkerClosed,
    /// Image loading or conversion failure
    #[error(transparent)]
    Image(#[from] image::ImageError),
    /// JSON encoding or decoding failure
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Filesystem failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate
pub type ScanResult<T> = Result<T, ScanError>;

/// Failure of a single enhancement primitive call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    /// The backend does not provide this operation
    #[error("primitive not available")]
    Unsupported,
    /// The backend provides the operation but the call failed
    #[error("primitive failed: {0}")]
    Failed(String),
}
