//! Local-mean adaptive binarization

use crate::models::Frame;
use crate::models::frame::CHANNELS;
use crate::utils::grayscale::frame_luma;

/// Binarize against the mean of a `(2r+1)^2` neighbourhood minus `bias`.
///
/// The neighbourhood is clipped at the frame edges. Output pixels are pure
/// black or white with the source alpha.
pub fn apply(frame: &Frame, block_radius: u32, bias: i32) -> Frame {
    let w = frame.width() as usize;
    let h = frame.height() as usize;
    let r = block_radius as usize;
    let grey = frame_luma(frame);

    // Integral image with a zero row and column in front
    let iw = w + 1;
    let mut integral = vec![0i64; iw * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0i64;
        for x in 0..w {
            row_sum += grey[y * w + x] as i64;
            integral[(y + 1) * iw + (x + 1)] = row_sum + integral[y * iw + (x + 1)];
        }
    }

    let src = frame.data();
    let mut data = vec![0u8; src.len()];
    for y in 0..h {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(w);
            let area = ((y1 - y0) * (x1 - x0)) as i64;
            let sum = integral[y1 * iw + x1] - integral[y0 * iw + x1] - integral[y1 * iw + x0]
                + integral[y0 * iw + x0];
            let thresh = sum / area - bias as i64;
            let v = if (grey[y * w + x] as i64) < thresh { 0 } else { 255 };

            let idx = (y * w + x) * CHANNELS;
            data[idx] = v;
            data[idx + 1] = v;
            data[idx + 2] = v;
            data[idx + 3] = src[idx + 3];
        }
    }
    Frame::from_parts(frame.width(), frame.height(), data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uneven_lighting_still_separates_dark_module() {
        // Bright gradient background with one dark pixel in the middle
        let (w, h) = (9u32, 9u32);
        let mut data = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let v = if (x, y) == (4, 4) { 60 } else { 150 + (x * 2) as u8 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let frame = Frame::new(w, h, data).unwrap();
        let out = apply(&frame, 2, 8);
        assert_eq!(out.pixel(4, 4), [0, 0, 0, 255]);
        assert_eq!(out.pixel(0, 0), [255, 255, 255, 255]);
        assert_eq!(out.pixel(8, 8), [255, 255, 255, 255]);
    }

    #[test]
    fn uniform_frame_turns_white() {
        let frame = Frame::filled(5, 5, [90, 90, 90, 200]).unwrap();
        let out = apply(&frame, 15, 8);
        assert!(out.data().chunks(4).all(|p| p == [255, 255, 255, 200]));
    }
}
