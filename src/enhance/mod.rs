//! Image Enhancer
//!
//! Every transform takes a [`Frame`] and returns a new one. Each operation has
//! two implementations: an accelerated backend (by default the `image` crate)
//! and the pure versions in this module. Which one runs is decided from the
//! backend's [`Capabilities`], probed once when the [`Enhancer`] is built; a
//! backend error at call time falls back to the pure version for that call.

pub mod adjust;
pub mod gamma;
pub mod native;
pub mod pure;
pub mod resample;
pub mod sharpen;
pub mod threshold;

pub use native::NativeBackend;
pub use pure::PureBackend;

use tracing::{debug, warn};

use crate::config::{PreprocessingConfig, UpscaleFilter};
use crate::error::PrimitiveError;
use crate::models::{Frame, Rect};

/// Enhancement operations a backend may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Crop,
    Sharpen,
    Upscale,
    Resize,
    Gamma,
    AdaptiveThreshold,
    Contrast,
}

impl Operation {
    /// Name used in log fields
    pub fn name(self) -> &'static str {
        match self {
            Operation::Crop => "crop",
            Operation::Sharpen => "sharpen",
            Operation::Upscale => "upscale",
            Operation::Resize => "resize",
            Operation::Gamma => "gamma",
            Operation::AdaptiveThreshold => "adaptive-threshold",
            Operation::Contrast => "contrast",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of operations a backend implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No operations
    pub fn none() -> Self {
        Self(0)
    }

    /// Every operation
    pub fn all() -> Self {
        [
            Operation::Crop,
            Operation::Sharpen,
            Operation::Upscale,
            Operation::Resize,
            Operation::Gamma,
            Operation::AdaptiveThreshold,
            Operation::Contrast,
        ]
        .into_iter()
        .fold(Self::none(), Self::with)
    }

    /// Add `op` to the set
    pub fn with(self, op: Operation) -> Self {
        Self(self.0 | op.bit())
    }

    /// True when `op` is in the set
    pub fn supports(self, op: Operation) -> bool {
        self.0 & op.bit() != 0
    }
}

/// Pixel transforms offered by an enhancement backend.
///
/// Operations a backend does not list in [`capabilities`](Self::capabilities)
/// are never called; the defaults return [`PrimitiveError::Unsupported`].
pub trait EnhancementPrimitives: Send {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Operations this backend implements
    fn capabilities(&self) -> Capabilities;

    fn crop(&self, _frame: &Frame, _rect: Rect) -> Result<Frame, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }

    fn sharpen(
        &self,
        _frame: &Frame,
        _sigma: f32,
        _amount: f32,
        _threshold: i32,
    ) -> Result<Frame, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }

    fn upscale(
        &self,
        _frame: &Frame,
        _factor: f32,
        _filter: UpscaleFilter,
    ) -> Result<Frame, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }

    fn resize_exact(
        &self,
        _frame: &Frame,
        _width: u32,
        _height: u32,
        _filter: UpscaleFilter,
    ) -> Result<Frame, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }

    fn gamma(&self, _frame: &Frame, _gamma: f32) -> Result<Frame, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }

    fn adaptive_threshold(
        &self,
        _frame: &Frame,
        _block_radius: u32,
        _bias: i32,
    ) -> Result<Frame, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }

    fn contrast(&self, _frame: &Frame, _factor: f32) -> Result<Frame, PrimitiveError> {
        Err(PrimitiveError::Unsupported)
    }
}

/// Dispatches each transform to the accelerated backend or the pure fallback
pub struct Enhancer {
    backend: Option<Box<dyn EnhancementPrimitives>>,
    capabilities: Capabilities,
}

impl Default for Enhancer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Enhancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enhancer")
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl Enhancer {
    /// Enhancer backed by the `image` crate
    pub fn new() -> Self {
        Self::with_backend(Box::new(NativeBackend))
    }

    /// Enhancer that only runs the pure implementations
    pub fn pure_only() -> Self {
        Self {
            backend: None,
            capabilities: Capabilities::none(),
        }
    }

    /// Enhancer preferring `backend` wherever it reports a capability
    pub fn with_backend(backend: Box<dyn EnhancementPrimitives>) -> Self {
        let capabilities = backend.capabilities();
        debug!(backend = backend.name(), ?capabilities, "enhancement backend probed");
        Self {
            backend: Some(backend),
            capabilities,
        }
    }

    /// Capabilities recorded at construction
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn run<N, P>(&self, op: Operation, native: N, pure: P) -> Frame
    where
        N: FnOnce(&dyn EnhancementPrimitives) -> Result<Frame, PrimitiveError>,
        P: FnOnce() -> Frame,
    {
        if self.capabilities.supports(op) {
            if let Some(backend) = self.backend.as_deref() {
                match native(backend) {
                    Ok(frame) => return frame,
                    Err(err) => warn!(
                        operation = op.name(),
                        backend = backend.name(),
                        error = %err,
                        "native primitive failed, using pure fallback"
                    ),
                }
            }
        }
        pure()
    }

    /// Copy out `rect`, which must lie inside the frame
    pub fn crop(&self, frame: &Frame, rect: Rect) -> Frame {
        self.run(
            Operation::Crop,
            |b| b.crop(frame, rect),
            || adjust::crop(frame, rect),
        )
    }

    /// Unsharp mask
    pub fn sharpen(&self, frame: &Frame, sigma: f32, amount: f32, threshold: i32) -> Frame {
        self.run(
            Operation::Sharpen,
            |b| b.sharpen(frame, sigma, amount, threshold),
            || sharpen::apply(frame, sigma, amount, threshold),
        )
    }

    /// Unsharp mask with the sigma and threshold from `pre` and the given amount
    pub fn sharpen_with(&self, frame: &Frame, pre: &PreprocessingConfig, amount: f32) -> Frame {
        self.sharpen(frame, pre.sharpen_sigma, amount, pre.sharpen_threshold)
    }

    /// Scale by `factor` in both directions
    pub fn upscale(&self, frame: &Frame, factor: f32, filter: UpscaleFilter) -> Frame {
        self.run(
            Operation::Upscale,
            |b| b.upscale(frame, factor, filter),
            || resample::upscale(frame, factor, filter),
        )
    }

    /// Resample to an exact size
    pub fn resize_exact(&self, frame: &Frame, width: u32, height: u32, filter: UpscaleFilter) -> Frame {
        if frame.dimensions() == (width, height) {
            return frame.clone();
        }
        self.run(
            Operation::Resize,
            |b| b.resize_exact(frame, width, height, filter),
            || resample::resize_exact(frame, width, height, filter),
        )
    }

    /// Power-law remap; `None` picks gamma from the frame's brightness
    pub fn gamma(&self, frame: &Frame, value: Option<f32>) -> Frame {
        let value = value.unwrap_or_else(|| gamma::auto_gamma(frame));
        self.run(
            Operation::Gamma,
            |b| b.gamma(frame, value),
            || gamma::apply(frame, value),
        )
    }

    /// Local-mean binarization
    pub fn adaptive_threshold(&self, frame: &Frame, block_radius: u32, bias: i32) -> Frame {
        self.run(
            Operation::AdaptiveThreshold,
            |b| b.adaptive_threshold(frame, block_radius, bias),
            || threshold::apply(frame, block_radius, bias),
        )
    }

    /// Linear contrast stretch around mid-grey
    pub fn contrast(&self, frame: &Frame, factor: f32) -> Frame {
        self.run(
            Operation::Contrast,
            |b| b.contrast(frame, factor),
            || adjust::contrast(frame, factor),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Claims every capability and fails every call
    struct Broken {
        capability_calls: Arc<AtomicUsize>,
    }

    impl EnhancementPrimitives for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn capabilities(&self) -> Capabilities {
            self.capability_calls.fetch_add(1, Ordering::SeqCst);
            Capabilities::all()
        }

        fn contrast(&self, _frame: &Frame, _factor: f32) -> Result<Frame, PrimitiveError> {
            Err(PrimitiveError::Failed("boom".into()))
        }
    }

    fn gradient() -> Frame {
        let mut data = Vec::new();
        for i in 0..16u8 {
            data.extend_from_slice(&[i * 16, i * 16, i * 16, 255]);
        }
        Frame::new(4, 4, data).unwrap()
    }

    #[test]
    fn failing_backend_falls_back_to_pure() {
        let capability_calls = Arc::new(AtomicUsize::new(0));
        let enhancer = Enhancer::with_backend(Box::new(Broken {
            capability_calls: capability_calls.clone(),
        }));
        let frame = gradient();
        assert_eq!(enhancer.contrast(&frame, 1.5), adjust::contrast(&frame, 1.5));
        // Default trait methods report Unsupported, which also falls back
        assert_eq!(enhancer.gamma(&frame, Some(2.0)), gamma::apply(&frame, 2.0));
        enhancer.contrast(&frame, 1.2);
        assert_eq!(capability_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn native_and_pure_upscale_agree_in_size() {
        let frame = gradient();
        let native = Enhancer::new().upscale(&frame, 2.5, UpscaleFilter::CatmullRom);
        let pure = Enhancer::pure_only().upscale(&frame, 2.5, UpscaleFilter::CatmullRom);
        assert_eq!(native.dimensions(), (10, 10));
        assert_eq!(native.dimensions(), pure.dimensions());
    }

    #[test]
    fn native_backend_lacks_gamma_and_threshold() {
        let caps = Enhancer::new().capabilities();
        assert!(caps.supports(Operation::Sharpen));
        assert!(!caps.supports(Operation::Gamma));
        assert!(!caps.supports(Operation::AdaptiveThreshold));
        assert!(!Enhancer::pure_only().capabilities().supports(Operation::Crop));
    }

    #[test]
    fn resize_to_same_size_is_a_clone() {
        let frame = gradient();
        assert_eq!(
            Enhancer::new().resize_exact(&frame, 4, 4, UpscaleFilter::Triangle),
            frame
        );
    }
}
