//! Unsharp-mask sharpening

use crate::models::Frame;
use crate::models::frame::CHANNELS;

/// 3x3 Gaussian weights for `sigma`, normalized to sum 1
fn gaussian_3x3(sigma: f32) -> [[f32; 3]; 3] {
    let sigma = sigma.max(0.1);
    let two_s2 = 2.0 * sigma * sigma;
    let mut k = [[0f32; 3]; 3];
    let mut sum = 0.0;
    for (dy, row) in k.iter_mut().enumerate() {
        for (dx, w) in row.iter_mut().enumerate() {
            let (fx, fy) = (dx as f32 - 1.0, dy as f32 - 1.0);
            *w = (-(fx * fx + fy * fy) / two_s2).exp();
            sum += *w;
        }
    }
    for row in &mut k {
        for w in row {
            *w /= sum;
        }
    }
    k
}

/// `out = in + amount * (in - blur(in))` where the detail exceeds `threshold`.
///
/// Only interior pixels are convolved; the one-pixel border and the alpha
/// channel are copied unchanged.
pub fn apply(frame: &Frame, sigma: f32, amount: f32, threshold: i32) -> Frame {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let src = frame.data();
    let mut data = src.to_vec();
    if w < 3 || h < 3 {
        return Frame::from_parts(frame.width(), frame.height(), data);
    }

    let k = gaussian_3x3(sigma);
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let idx = (y * w + x) * CHANNELS;
            for c in 0..3 {
                let mut blur = 0f32;
                for (ky, row) in k.iter().enumerate() {
                    let sy = y + ky - 1;
                    for (kx, wgt) in row.iter().enumerate() {
                        let sx = x + kx - 1;
                        blur += src[(sy * w + sx) * CHANNELS + c] as f32 * wgt;
                    }
                }
                let orig = src[idx + c] as f32;
                let detail = orig - blur;
                if detail.abs() > threshold as f32 {
                    data[idx + c] = (orig + amount * detail).round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
    Frame::from_parts(frame.width(), frame.height(), data)
}
