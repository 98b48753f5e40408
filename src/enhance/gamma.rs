//! Power-law intensity remap

use crate::models::Frame;
use crate::models::frame::CHANNELS;
use crate::utils::grayscale::mean_luma;

/// Smallest gamma chosen automatically
pub const MIN_AUTO_GAMMA: f32 = 0.4;
/// Largest gamma chosen automatically
pub const MAX_AUTO_GAMMA: f32 = 2.5;

/// Gamma that maps the frame's mean luma onto mid-grey.
///
/// Dark frames get gamma < 1 (brightening), bright frames gamma > 1.
pub fn auto_gamma(frame: &Frame) -> f32 {
    let mean = mean_luma(frame);
    if mean <= 0.0 || mean >= 1.0 {
        return if mean <= 0.0 { MIN_AUTO_GAMMA } else { MAX_AUTO_GAMMA };
    }
    let gamma = 0.5f32.ln() / mean.ln();
    gamma.clamp(MIN_AUTO_GAMMA, MAX_AUTO_GAMMA)
}

/// `out = 255 * (in / 255) ^ gamma` on the colour channels
pub fn apply(frame: &Frame, gamma: f32) -> Frame {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let v = (i as f32 / 255.0).powf(gamma) * 255.0;
        *slot = v.round().clamp(0.0, 255.0) as u8;
    }

    let mut data = frame.data().to_vec();
    for px in data.chunks_exact_mut(CHANNELS) {
        px[0] = lut[px[0] as usize];
        px[1] = lut[px[1] as usize];
        px[2] = lut[px[2] as usize];
    }
    Frame::from_parts(frame.width(), frame.height(), data)
}
