//! Separable resampling with selectable reconstruction filters

use crate::config::UpscaleFilter;
use crate::models::Frame;
use crate::models::frame::CHANNELS;

fn sinc(x: f32) -> f32 {
    if x == 0.0 {
        1.0
    } else {
        let a = x * std::f32::consts::PI;
        a.sin() / a
    }
}

fn support(filter: UpscaleFilter) -> f32 {
    match filter {
        UpscaleFilter::Nearest => 0.5,
        UpscaleFilter::Triangle => 1.0,
        UpscaleFilter::CatmullRom => 2.0,
        UpscaleFilter::Lanczos3 => 3.0,
    }
}

fn kernel(filter: UpscaleFilter, x: f32) -> f32 {
    let t = x.abs();
    match filter {
        UpscaleFilter::Nearest => {
            if t <= 0.5 {
                1.0
            } else {
                0.0
            }
        }
        UpscaleFilter::Triangle => (1.0 - t).max(0.0),
        UpscaleFilter::CatmullRom => {
            // Keys cubic with a = -0.5
            if t < 1.0 {
                1.5 * t * t * t - 2.5 * t * t + 1.0
            } else if t < 2.0 {
                -0.5 * t * t * t + 2.5 * t * t - 4.0 * t + 2.0
            } else {
                0.0
            }
        }
        UpscaleFilter::Lanczos3 => {
            if t < 3.0 {
                sinc(t) * sinc(t / 3.0)
            } else {
                0.0
            }
        }
    }
}

/// Taps for one output sample: first source index and normalized weights
struct Taps {
    start: usize,
    weights: Vec<f32>,
}

fn compute_taps(src_len: usize, dst_len: usize, filter: UpscaleFilter) -> Vec<Taps> {
    let ratio = src_len as f32 / dst_len as f32;
    // Widen the kernel when shrinking so every source pixel contributes
    let filter_scale = ratio.max(1.0);
    let radius = support(filter) * filter_scale;

    (0..dst_len)
        .map(|out| {
            let center = (out as f32 + 0.5) * ratio;
            let mut start = ((center - radius).floor().max(0.0) as usize).min(src_len - 1);
            let mut end = ((center + radius).ceil() as usize).min(src_len);
            if end <= start {
                end = start + 1;
            }

            let mut weights: Vec<f32> = (start..end)
                .map(|i| kernel(filter, (i as f32 + 0.5 - center) / filter_scale))
                .collect();
            let sum: f32 = weights.iter().sum();
            if sum.abs() < f32::EPSILON {
                let nearest = (center.floor() as usize).min(src_len - 1);
                start = nearest;
                weights = vec![1.0];
            } else {
                for w in &mut weights {
                    *w /= sum;
                }
            }
            Taps { start, weights }
        })
        .collect()
}

#[inline]
fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Resample `frame` to exactly `new_width x new_height`
pub fn resize_exact(frame: &Frame, new_width: u32, new_height: u32, filter: UpscaleFilter) -> Frame {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    let (nw, nh) = (new_width.max(1) as usize, new_height.max(1) as usize);
    if (nw, nh) == (w, h) {
        return frame.clone();
    }
    let src = frame.data();

    // Horizontal pass into a float buffer of nw x h
    let h_taps = compute_taps(w, nw, filter);
    let mut tmp = vec![0f32; nw * h * CHANNELS];
    for y in 0..h {
        let row = y * w * CHANNELS;
        for (x, taps) in h_taps.iter().enumerate() {
            let mut acc = [0f32; CHANNELS];
            for (k, wgt) in taps.weights.iter().enumerate() {
                let idx = row + (taps.start + k) * CHANNELS;
                for c in 0..CHANNELS {
                    acc[c] += src[idx + c] as f32 * wgt;
                }
            }
            let out = (y * nw + x) * CHANNELS;
            tmp[out..out + CHANNELS].copy_from_slice(&acc);
        }
    }

    // Vertical pass
    let v_taps = compute_taps(h, nh, filter);
    let mut dst = vec![0u8; nw * nh * CHANNELS];
    for (y, taps) in v_taps.iter().enumerate() {
        for x in 0..nw {
            let mut acc = [0f32; CHANNELS];
            for (k, wgt) in taps.weights.iter().enumerate() {
                let idx = ((taps.start + k) * nw + x) * CHANNELS;
                for c in 0..CHANNELS {
                    acc[c] += tmp[idx + c] * wgt;
                }
            }
            let out = (y * nw + x) * CHANNELS;
            for c in 0..CHANNELS {
                dst[out + c] = to_u8(acc[c]);
            }
        }
    }

    Frame::from_parts(nw as u32, nh as u32, dst)
}

/// Output size when scaling `(width, height)` by `factor`
pub fn scaled_size(width: u32, height: u32, factor: f32) -> (u32, u32) {
    let w = ((width as f32 * factor).round() as u32).max(1);
    let h = ((height as f32 * factor).round() as u32).max(1);
    (w, h)
}

/// Scale `frame` by `factor` in both directions
pub fn upscale(frame: &Frame, factor: f32, filter: UpscaleFilter) -> Frame {
    let (nw, nh) = scaled_size(frame.width(), frame.height(), factor);
    resize_exact(frame, nw, nh, filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILTERS: [UpscaleFilter; 4] = [
        UpscaleFilter::Nearest,
        UpscaleFilter::Triangle,
        UpscaleFilter::CatmullRom,
        UpscaleFilter::Lanczos3,
    ];

    #[test]
    fn uniform_frame_stays_uniform_for_every_filter() {
        let frame = Frame::filled(8, 6, [120, 60, 30, 255]).unwrap();
        for filter in FILTERS {
            let up = upscale(&frame, 2.5, filter);
            assert_eq!(up.dimensions(), (20, 15));
            assert!(up.data().chunks(4).all(|p| p == [120, 60, 30, 255]), "{filter:?}");
        }
    }

    #[test]
    fn nearest_doubles_pixels() {
        let frame = Frame::new(2, 1, vec![0, 0, 0, 255, 255, 255, 255, 255]).unwrap();
        let up = upscale(&frame, 2.0, UpscaleFilter::Nearest);
        assert_eq!(up.dimensions(), (4, 2));
        assert_eq!(up.pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(up.pixel(1, 1), [0, 0, 0, 255]);
        assert_eq!(up.pixel(2, 0), [255, 255, 255, 255]);
        assert_eq!(up.pixel(3, 1), [255, 255, 255, 255]);
    }

    #[test]
    fn downscale_averages() {
        let mut data = Vec::new();
        for x in 0..4 {
            let v = if x % 2 == 0 { 0 } else { 200 };
            data.extend_from_slice(&[v, v, v, 255]);
        }
        let frame = Frame::new(4, 1, data).unwrap();
        let down = resize_exact(&frame, 2, 1, UpscaleFilter::Triangle);
        for px in down.data().chunks(4) {
            assert!((60..=140).contains(&px[0]), "{px:?}");
        }
    }

    #[test]
    fn same_size_is_identity() {
        let frame = Frame::filled(3, 3, [1, 2, 3, 4]).unwrap();
        assert_eq!(resize_exact(&frame, 3, 3, UpscaleFilter::Lanczos3), frame);
    }
}
