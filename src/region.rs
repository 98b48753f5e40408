//! Region Extractor: crop clamping, center crop and sliding windows

use crate::models::{Rect, Window};

/// Clip a caller-supplied crop to the frame; `None` when nothing is left
pub fn clamp_crop(crop: Rect, frame_width: u32, frame_height: u32) -> Option<Rect> {
    crop.clamp_to(frame_width, frame_height)
}

/// Centered rectangle covering `area_fraction` of the frame area
pub fn center_crop(frame_width: u32, frame_height: u32, area_fraction: f32) -> Rect {
    let side = area_fraction.clamp(0.0, 1.0).sqrt();
    let width = ((frame_width as f32 * side).floor() as u32).clamp(1, frame_width);
    let height = ((frame_height as f32 * side).floor() as u32).clamp(1, frame_height);
    Rect::new(
        (frame_width - width) / 2,
        (frame_height - height) / 2,
        width,
        height,
    )
}

/// Enumerate search windows, largest scale first.
///
/// For each scale the window is `floor(dim * scale)` and the step is
/// `max(1, floor(window * stride))`. Windows run left-to-right then
/// top-to-bottom, and generation stops across all scales once `max_windows`
/// have been produced. Scales are visited in descending order whatever order
/// they are given in; scales that yield an empty or oversized window are skipped.
pub fn generate_windows(
    frame_width: u32,
    frame_height: u32,
    scales: &[f32],
    stride: f32,
    max_windows: usize,
) -> Vec<Window> {
    let mut ordered: Vec<f32> = scales.iter().copied().filter(|s| *s > 0.0).collect();
    ordered.sort_by(|a, b| b.total_cmp(a));

    let mut windows = Vec::with_capacity(max_windows.min(64));
    if max_windows == 0 {
        return windows;
    }

    for scale in ordered {
        let width = (frame_width as f32 * scale).floor() as u32;
        let height = (frame_height as f32 * scale).floor() as u32;
        if width == 0 || height == 0 || width > frame_width || height > frame_height {
            continue;
        }
        let step_x = ((width as f32 * stride).floor() as u32).max(1);
        let step_y = ((height as f32 * stride).floor() as u32).max(1);

        let mut y = 0;
        while y + height <= frame_height {
            let mut x = 0;
            while x + width <= frame_width {
                windows.push(Window {
                    x,
                    y,
                    width,
                    height,
                    scale,
                });
                if windows.len() >= max_windows {
                    return windows;
                }
                x += step_x;
            }
            y += step_y;
        }
    }
    windows
}
