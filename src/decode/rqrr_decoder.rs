//! Decode primitive backed by `rqrr`

use std::collections::HashSet;

use image::GrayImage;
use image::imageops::{self, FilterType};
use rqrr::PreparedImage;
use tracing::debug;

use super::DecodePrimitive;
use crate::error::{ScanError, ScanResult};
use crate::models::{DetectionResult, Frame, Point};
use crate::utils::grayscale::frame_luma;

/// Frames smaller than this on either side skip the region scan
const REGION_SCAN_MIN_DIM: u32 = 400;
const REGION_SCALES: [f32; 3] = [1.5, 2.0, 2.5];

/// `rqrr` grid detection and decoding.
///
/// With the region scan enabled, a frame with no hit is retried as four
/// overlapping quadrants (each 2/3 of the frame) upscaled 1.5x, 2x and 2.5x,
/// which recovers codes too small for a full-frame pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDecoder {
    region_scan: bool,
}

impl RqrrDecoder {
    /// Full-frame decoding only
    pub fn new() -> Self {
        Self { region_scan: false }
    }

    /// Full-frame decoding with the quadrant fallback
    pub fn with_region_scan() -> Self {
        Self { region_scan: true }
    }

    fn detect(gray: &GrayImage, scale: f32, offset_x: f32, offset_y: f32) -> Vec<DetectionResult> {
        let (w, h) = (gray.width() as usize, gray.height() as usize);
        let raw = gray.as_raw();
        let mut prepared = PreparedImage::prepare_from_greyscale(w, h, |x, y| raw[y * w + x]);
        let grids = prepared.detect_grids();

        let mut results = Vec::new();
        for grid in grids {
            match grid.decode() {
                Ok((meta, content)) => {
                    let bounds = grid
                        .bounds
                        .iter()
                        .map(|p| {
                            Point::new(p.x as f32 / scale + offset_x, p.y as f32 / scale + offset_y)
                        })
                        .collect();
                    results.push(DetectionResult::new(content, meta.version.0 as u32, bounds));
                }
                Err(err) => debug!(error = ?err, "grid found but failed to decode"),
            }
        }
        results
    }

    fn scan_regions(gray: &GrayImage) -> Vec<DetectionResult> {
        let (width, height) = gray.dimensions();
        let mut results = Vec::new();
        if width < REGION_SCAN_MIN_DIM || height < REGION_SCAN_MIN_DIM {
            return results;
        }

        let region_w = width * 2 / 3;
        let region_h = height * 2 / 3;
        let (step_x, step_y) = (width / 3, height / 3);
        let mut seen = HashSet::new();

        for row in 0..2 {
            for col in 0..2 {
                let (x, y) = (col * step_x, row * step_y);
                let rw = (x + region_w).min(width) - x;
                let rh = (y + region_h).min(height) - y;
                let region = imageops::crop_imm(gray, x, y, rw, rh).to_image();

                for scale in REGION_SCALES {
                    let nw = (rw as f32 * scale) as u32;
                    let nh = (rh as f32 * scale) as u32;
                    let upscaled = imageops::resize(&region, nw, nh, FilterType::Lanczos3);
                    for r in Self::detect(&upscaled, scale, x as f32, y as f32) {
                        if seen.insert(r.data.clone()) {
                            results.push(r);
                        }
                    }
                    if !results.is_empty() {
                        return results;
                    }
                }
            }
        }
        results
    }
}

impl DecodePrimitive for RqrrDecoder {
    fn decode(&self, frame: &Frame) -> ScanResult<Vec<DetectionResult>> {
        let gray = GrayImage::from_raw(frame.width(), frame.height(), frame_luma(frame))
            .ok_or_else(|| ScanError::Decode("luma plane does not match frame size".into()))?;

        let results = Self::detect(&gray, 1.0, 0.0, 0.0);
        if !results.is_empty() || !self.region_scan {
            return Ok(results);
        }
        debug!("full-frame pass found nothing, scanning regions");
        Ok(Self::scan_regions(&gray))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_frame_has_no_codes() {
        let frame = Frame::filled(64, 48, [255, 255, 255, 255]).unwrap();
        assert!(RqrrDecoder::new().decode(&frame).unwrap().is_empty());
    }

    #[test]
    fn region_scan_skips_small_frames() {
        let frame = Frame::filled(120, 120, [255, 255, 255, 255]).unwrap();
        assert!(RqrrDecoder::with_region_scan().decode(&frame).unwrap().is_empty());
    }
}
