//! Decode Invoker and the decode primitive seam
//!
//! The primitive turns a frame into zero or more [`DetectionResult`]s. The
//! invoker applies the optional crop and sharpen pass first, and swallows any
//! primitive failure so a bad frame never interrupts the caller's loop.

pub mod rqrr_decoder;

pub use rqrr_decoder::RqrrDecoder;

use tracing::{trace, warn};

use crate::config::PreprocessingConfig;
use crate::enhance::Enhancer;
use crate::error::ScanResult;
use crate::models::{DetectionResult, Frame, Rect};
use crate::region::clamp_crop;

/// Black-box pixel decoder.
///
/// Must be idempotent and free of side effects visible to the scheduler.
pub trait DecodePrimitive: Send {
    /// Decode every code found in `frame`, bounds in `frame` coordinates
    fn decode(&self, frame: &Frame) -> ScanResult<Vec<DetectionResult>>;
}

impl<F> DecodePrimitive for F
where
    F: Fn(&Frame) -> ScanResult<Vec<DetectionResult>> + Send,
{
    fn decode(&self, frame: &Frame) -> ScanResult<Vec<DetectionResult>> {
        self(frame)
    }
}

/// Optional pre-processing applied by [`DecodeInvoker::decode`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DecodeOptions {
    /// Region to decode; ignored unless it has positive width and height
    pub crop: Option<Rect>,
    /// Sharpen amount; ignored unless positive
    pub sharpen: Option<f32>,
}

impl DecodeOptions {
    /// Crop that will actually be applied to a `width x height` frame
    pub fn effective_crop(&self, width: u32, height: u32) -> Option<Rect> {
        self.crop
            .filter(Rect::has_area)
            .and_then(|c| clamp_crop(c, width, height))
    }
}

/// Wraps a [`DecodePrimitive`]
pub struct DecodeInvoker {
    primitive: Box<dyn DecodePrimitive>,
}

impl std::fmt::Debug for DecodeInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeInvoker").finish_non_exhaustive()
    }
}

impl DecodeInvoker {
    pub fn new(primitive: Box<dyn DecodePrimitive>) -> Self {
        Self { primitive }
    }

    /// Decode `frame` as-is; errors become an empty result
    pub fn decode_frame(&self, frame: &Frame) -> Vec<DetectionResult> {
        match self.primitive.decode(frame) {
            Ok(results) => {
                trace!(
                    width = frame.width(),
                    height = frame.height(),
                    found = results.len(),
                    "decode primitive returned"
                );
                results
            }
            Err(err) => {
                warn!(error = %err, "decode primitive failed, treating as no result");
                Vec::new()
            }
        }
    }

    /// Crop, then sharpen, then decode.
    ///
    /// Results come back exactly as the primitive reports them, so bounds are
    /// relative to the cropped region when a crop applies.
    pub fn decode(
        &self,
        frame: &Frame,
        options: &DecodeOptions,
        enhancer: &Enhancer,
        pre: &PreprocessingConfig,
    ) -> Vec<DetectionResult> {
        let cropped;
        let mut input = frame;
        if let Some(rect) = options.effective_crop(frame.width(), frame.height()) {
            cropped = enhancer.crop(frame, rect);
            input = &cropped;
        }
        match options.sharpen.filter(|a| *a > 0.0) {
            Some(amount) => {
                let sharpened = enhancer.sharpen_with(input, pre, amount);
                self.decode_frame(&sharpened)
            }
            None => self.decode_frame(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanError;
    use crate::models::Point;

    fn found(frame: &Frame) -> ScanResult<Vec<DetectionResult>> {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(vec![DetectionResult::new(
            format!("{w}x{h}"),
            1,
            vec![Point::new(0.0, 0.0), Point::new(w, h)],
        )])
    }

    #[test]
    fn errors_are_swallowed() {
        let invoker = DecodeInvoker::new(Box::new(|_: &Frame| -> ScanResult<Vec<DetectionResult>> {
            Err(ScanError::Decode("corrupt".into()))
        }));
        let frame = Frame::filled(4, 4, [0, 0, 0, 255]).unwrap();
        assert!(invoker.decode_frame(&frame).is_empty());
    }

    #[test]
    fn crop_is_applied_before_decode() {
        let invoker = DecodeInvoker::new(Box::new(found));
        let frame = Frame::filled(20, 10, [0, 0, 0, 255]).unwrap();
        let options = DecodeOptions {
            crop: Some(Rect::new(5, 2, 8, 4)),
            sharpen: Some(1.0),
        };
        let results = invoker.decode(
            &frame,
            &options,
            &Enhancer::pure_only(),
            &PreprocessingConfig::default(),
        );
        assert_eq!(results[0].data, "8x4");
    }

    #[test]
    fn empty_or_outside_crop_is_ignored() {
        let invoker = DecodeInvoker::new(Box::new(found));
        let frame = Frame::filled(20, 10, [0, 0, 0, 255]).unwrap();
        for crop in [Rect::new(0, 0, 0, 4), Rect::new(30, 0, 5, 5)] {
            let options = DecodeOptions {
                crop: Some(crop),
                sharpen: None,
            };
            let results = invoker.decode(
                &frame,
                &options,
                &Enhancer::pure_only(),
                &PreprocessingConfig::default(),
            );
            assert_eq!(results[0].data, "20x10");
        }
    }
}
