//! Backend built on the `image` crate's `imageops`

use image::RgbaImage;
use image::imageops::{self, FilterType};

use super::{Capabilities, EnhancementPrimitives, Operation};
use crate::config::UpscaleFilter;
use crate::error::PrimitiveError;
use crate::models::frame::CHANNELS;
use crate::models::{Frame, Rect};

fn filter_type(filter: UpscaleFilter) -> FilterType {
    match filter {
        UpscaleFilter::Nearest => FilterType::Nearest,
        UpscaleFilter::Triangle => FilterType::Triangle,
        UpscaleFilter::CatmullRom => FilterType::CatmullRom,
        UpscaleFilter::Lanczos3 => FilterType::Lanczos3,
    }
}

fn to_image(frame: &Frame) -> Result<RgbaImage, PrimitiveError> {
    RgbaImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
        .ok_or_else(|| PrimitiveError::Failed("failed to create image from buffer".into()))
}

fn from_image(img: RgbaImage) -> Result<Frame, PrimitiveError> {
    let (w, h) = img.dimensions();
    Frame::new(w, h, img.into_raw()).map_err(|e| PrimitiveError::Failed(e.to_string()))
}

/// `imageops`-backed primitives.
///
/// There is no gamma or adaptive threshold in `imageops`; those report
/// unsupported and the enhancer uses its own implementations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl EnhancementPrimitives for NativeBackend {
    fn name(&self) -> &'static str {
        "image"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
            .with(Operation::Crop)
            .with(Operation::Sharpen)
            .with(Operation::Upscale)
            .with(Operation::Resize)
            .with(Operation::Contrast)
    }

    fn crop(&self, frame: &Frame, rect: Rect) -> Result<Frame, PrimitiveError> {
        if rect.x + rect.width > frame.width() || rect.y + rect.height > frame.height() {
            return Err(PrimitiveError::Failed(format!("crop {rect:?} outside frame")));
        }
        let img = to_image(frame)?;
        from_image(imageops::crop_imm(&img, rect.x, rect.y, rect.width, rect.height).to_image())
    }

    fn sharpen(
        &self,
        frame: &Frame,
        sigma: f32,
        amount: f32,
        threshold: i32,
    ) -> Result<Frame, PrimitiveError> {
        let img = to_image(frame)?;
        let blurred = imageops::blur(&img, sigma);
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        let src = frame.data();
        let soft = blurred.as_raw();
        let mut data = src.to_vec();
        if w >= 3 && h >= 3 {
            for y in 1..h - 1 {
                for x in 1..w - 1 {
                    let idx = (y * w + x) * CHANNELS;
                    for c in 0..3 {
                        let orig = src[idx + c] as f32;
                        let detail = orig - soft[idx + c] as f32;
                        if detail.abs() > threshold as f32 {
                            data[idx + c] =
                                (orig + amount * detail).round().clamp(0.0, 255.0) as u8;
                        }
                    }
                }
            }
        }
        Frame::new(frame.width(), frame.height(), data)
            .map_err(|e| PrimitiveError::Failed(e.to_string()))
    }

    fn upscale(
        &self,
        frame: &Frame,
        factor: f32,
        filter: UpscaleFilter,
    ) -> Result<Frame, PrimitiveError> {
        let (nw, nh) = super::resample::scaled_size(frame.width(), frame.height(), factor);
        self.resize_exact(frame, nw, nh, filter)
    }

    fn resize_exact(
        &self,
        frame: &Frame,
        width: u32,
        height: u32,
        filter: UpscaleFilter,
    ) -> Result<Frame, PrimitiveError> {
        if width == 0 || height == 0 {
            return Err(PrimitiveError::Failed(format!("resize to {width}x{height}")));
        }
        let img = to_image(frame)?;
        from_image(imageops::resize(&img, width, height, filter_type(filter)))
    }

    fn contrast(&self, frame: &Frame, factor: f32) -> Result<Frame, PrimitiveError> {
        if factor < 0.0 {
            return Err(PrimitiveError::Failed(format!("negative contrast {factor}")));
        }
        // imageops squares ((100 + c) / 100), so invert that to get a linear factor
        let percent = (factor.sqrt() - 1.0) * 100.0;
        let img = to_image(frame)?;
        let mut out = imageops::contrast(&img, percent).into_raw();
        // imageops maps alpha along with colour
        for (dst, src) in out
            .chunks_exact_mut(CHANNELS)
            .zip(frame.data().chunks_exact(CHANNELS))
        {
            dst[3] = src[3];
        }
        Frame::new(frame.width(), frame.height(), out)
            .map_err(|e| PrimitiveError::Failed(e.to_string()))
    }
}
