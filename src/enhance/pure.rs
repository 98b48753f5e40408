use super::{Capabilities, EnhancementPrimitives, adjust, gamma, resample, sharpen, threshold};
use crate::config::UpscaleFilter;
use crate::error::PrimitiveError;
use crate::models::{Frame, Rect};

/// Hand-written implementations of every primitive; never fails
#[derive(Debug, Default, Clone, Copy)]
pub struct PureBackend;

impl EnhancementPrimitives for PureBackend {
    fn name(&self) -> &'static str {
        "pure"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn crop(&self, frame: &Frame, rect: Rect) -> Result<Frame, PrimitiveError> {
        Ok(adjust::crop(frame, rect))
    }

    fn sharpen(
        &self,
        frame: &Frame,
        sigma: f32,
        amount: f32,
        threshold: i32,
    ) -> Result<Frame, PrimitiveError> {
        Ok(sharpen::apply(frame, sigma, amount, threshold))
    }

    fn upscale(
        &self,
        frame: &Frame,
        factor: f32,
        filter: UpscaleFilter,
    ) -> Result<Frame, PrimitiveError> {
        Ok(resample::upscale(frame, factor, filter))
    }

    fn resize_exact(
        &self,
        frame: &Frame,
        width: u32,
        height: u32,
        filter: UpscaleFilter,
    ) -> Result<Frame, PrimitiveError> {
        Ok(resample::resize_exact(frame, width, height, filter))
    }

    fn gamma(&self, frame: &Frame, gamma: f32) -> Result<Frame, PrimitiveError> {
        Ok(gamma::apply(frame, gamma))
    }

    fn adaptive_threshold(
        &self,
        frame: &Frame,
        block_radius: u32,
        bias: i32,
    ) -> Result<Frame, PrimitiveError> {
        Ok(threshold::apply(frame, block_radius, bias))
    }

    fn contrast(&self, frame: &Frame, factor: f32) -> Result<Frame, PrimitiveError> {
        Ok(adjust::contrast(frame, factor))
    }
}
