//! RGBA to luminance conversion
//!
//! Y = 0.299*R + 0.587*G + 0.114*B, computed with integer weights:
//! Y = (76*R + 150*G + 29*B) >> 8

use crate::models::Frame;
use crate::models::frame::CHANNELS;

const COEF_R: u32 = 76;
const COEF_G: u32 = 150;
const COEF_B: u32 = 29;

/// Luma of one pixel
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((COEF_R * r as u32 + COEF_G * g as u32 + COEF_B * b as u32) >> 8) as u8
}

/// Convert an RGBA buffer to one luma byte per pixel (alpha ignored)
pub fn rgba_to_luma(rgba: &[u8]) -> Vec<u8> {
    let pixel_count = rgba.len() / CHANNELS;
    let mut gray = Vec::with_capacity(pixel_count);

    // 4x unrolled main loop
    let chunks = rgba.chunks_exact(CHANNELS * 4);
    let remainder = chunks.remainder();
    for block in chunks {
        gray.push(luma(block[0], block[1], block[2]));
        gray.push(luma(block[4], block[5], block[6]));
        gray.push(luma(block[8], block[9], block[10]));
        gray.push(luma(block[12], block[13], block[14]));
    }
    for px in remainder.chunks_exact(CHANNELS) {
        gray.push(luma(px[0], px[1], px[2]));
    }
    gray
}

/// Luma plane of a frame
pub fn frame_luma(frame: &Frame) -> Vec<u8> {
    rgba_to_luma(frame.data())
}

/// Mean luma of a frame normalized to `[0, 1]`
pub fn mean_luma(frame: &Frame) -> f32 {
    let mut sum: u64 = 0;
    let mut count: u64 = 0;
    for px in frame.data().chunks_exact(CHANNELS) {
        sum += luma(px[0], px[1], px[2]) as u64;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    (sum as f64 / count as f64 / 255.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_extremes() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
    }

    #[test]
    fn unrolled_and_remainder_paths_agree() {
        // 5 pixels: one unrolled block plus one remainder pixel
        let mut rgba = Vec::new();
        for i in 0..5u8 {
            rgba.extend_from_slice(&[i * 40, i * 20, i * 10, 255]);
        }
        let gray = rgba_to_luma(&rgba);
        assert_eq!(gray.len(), 5);
        for (i, &g) in gray.iter().enumerate() {
            let i = i as u8;
            assert_eq!(g, luma(i * 40, i * 20, i * 10));
        }
    }

    #[test]
    fn mean_luma_of_uniform_frame() {
        let frame = Frame::filled(4, 4, [255, 255, 255, 255]).unwrap();
        assert!((mean_luma(&frame) - 1.0).abs() < 1e-6);
    }
}
