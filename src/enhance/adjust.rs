//! Contrast stretch and crop

use crate::models::frame::CHANNELS;
use crate::models::{Frame, Rect};

/// Linear stretch around mid-grey: `out = (in - 127.5) * factor + 127.5`
pub fn contrast(frame: &Frame, factor: f32) -> Frame {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        let v = (i as f32 - 127.5) * factor + 127.5;
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

/// Copy out `rect`; the caller has clamped it to the frame
pub fn crop(frame: &Frame, rect: Rect) -> Frame {
    let fw = frame.width() as usize;
    let (x, y) = (rect.x as usize, rect.y as usize);
    let (cw, ch) = (rect.width as usize, rect.height as usize);
    let src = frame.data();
    let mut data = Vec::with_capacity(cw * ch * CHANNELS);
    for row in y..y + ch {
        let start = (row * fw + x) * CHANNELS;
        data.extend_from_slice(&src[start..start + cw * CHANNELS]);
    }
    Frame::from_parts(rect.width, rect.height, data)
}
