//! Sliding-Window Search and Deduplicator

use tracing::trace;

use crate::decode::DecodeInvoker;
use crate::enhance::Enhancer;
use crate::models::{DetectionResult, Frame, Rect, Window};
use crate::region::generate_windows;

/// Share of the smaller box two same-payload results must overlap to collapse
pub const DUPLICATE_OVERLAP: f32 = 0.5;

/// Parameters for [`generate_windows`]
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPlan {
    pub scales: Vec<f32>,
    pub stride: f32,
    pub max_windows: usize,
}

impl WindowPlan {
    /// Windows for a `width x height` frame
    pub fn windows(&self, width: u32, height: u32) -> Vec<Window> {
        generate_windows(width, height, &self.scales, self.stride, self.max_windows)
    }
}

/// True when `a` and `b` report the same code.
///
/// Payloads must match. Then either result lacking bounds is enough, otherwise
/// the bounding boxes must overlap by at least half of the smaller one. A box
/// with no area (a point or a line) only matches a box that contains it.
pub fn is_duplicate(a: &DetectionResult, b: &DetectionResult) -> bool {
    if a.data != b.data {
        return false;
    }
    match (a.bounding_box(), b.bounding_box()) {
        (Some(ba), Some(bb)) => {
            let smaller = ba.area().min(bb.area());
            if smaller > 0.0 {
                ba.intersection_area(&bb) >= DUPLICATE_OVERLAP * smaller
            } else {
                ba.contains(&bb) || bb.contains(&ba)
            }
        }
        _ => true,
    }
}

/// Keep the first of every group of duplicates, preserving order
pub fn dedup(results: Vec<DetectionResult>) -> Vec<DetectionResult> {
    let mut kept: Vec<DetectionResult> = Vec::with_capacity(results.len());
    for r in results {
        if !kept.iter().any(|k| is_duplicate(k, &r)) {
            kept.push(r);
        }
    }
    kept
}

/// Full frame first, then windows in order until one yields a result.
///
/// Window results are moved into frame coordinates by the window offset.
/// Windows are never generated when the full-frame pass hits.
pub fn search(
    frame: &Frame,
    plan: &WindowPlan,
    invoker: &DecodeInvoker,
    enhancer: &Enhancer,
) -> Vec<DetectionResult> {
    let full = invoker.decode_frame(frame);
    if !full.is_empty() {
        return dedup(full);
    }

    let full_rect = Rect::new(0, 0, frame.width(), frame.height());
    let mut found = Vec::new();
    for window in plan.windows(frame.width(), frame.height()) {
        // The full-size window is the pass above
        if window.rect() == full_rect {
            continue;
        }
        let region = enhancer.crop(frame, window.rect());
        let hits = invoker.decode_frame(&region);
        trace!(?window, found = hits.len(), "window decoded");
        if hits.is_empty() {
            continue;
        }
        found.extend(
            hits.into_iter()
                .map(|r| r.translated(window.x as f32, window.y as f32)),
        );
        break;
    }
    dedup(found)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::ScanResult;
    use crate::models::Point;

    fn square(data: &str, x: f32, y: f32, side: f32) -> DetectionResult {
        DetectionResult::new(
            data,
            1,
            vec![
                Point::new(x, y),
                Point::new(x + side, y),
                Point::new(x + side, y + side),
                Point::new(x, y + side),
            ],
        )
    }

    #[test]
    fn overlapping_same_payload_collapses() {
        let a = square("hello", 0.0, 0.0, 10.0);
        let b = square("hello", 5.0, 0.0, 10.0);
        assert!(is_duplicate(&a, &b));
        assert_eq!(dedup(vec![a, b]).len(), 1);
    }

    #[test]
    fn distant_same_payload_is_kept() {
        let a = square("hello", 0.0, 0.0, 10.0);
        let b = square("hello", 50.0, 50.0, 10.0);
        assert_eq!(dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn different_payloads_never_collapse() {
        let a = square("one", 0.0, 0.0, 10.0);
        let b = square("two", 0.0, 0.0, 10.0);
        assert!(!is_duplicate(&a, &b));
        assert_eq!(dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn missing_bounds_collapse_on_payload() {
        let a = square("same", 0.0, 0.0, 10.0);
        let b = DetectionResult::new("same", 1, Vec::new());
        assert!(is_duplicate(&a, &b));
    }

    #[test]
    fn small_box_inside_large_box_collapses() {
        let a = square("x", 0.0, 0.0, 100.0);
        let b = square("x", 10.0, 10.0, 10.0);
        assert!(is_duplicate(&a, &b));
    }

    #[test]
    fn distant_point_results_are_kept() {
        let a = DetectionResult::new("same", 1, vec![Point::new(0.0, 0.0)]);
        let b = DetectionResult::new("same", 1, vec![Point::new(500.0, 500.0)]);
        assert!(!is_duplicate(&a, &b));
        assert_eq!(dedup(vec![a, b]).len(), 2);
    }

    #[test]
    fn coincident_or_contained_points_collapse() {
        let a = DetectionResult::new("same", 1, vec![Point::new(3.0, 4.0)]);
        let b = DetectionResult::new("same", 1, vec![Point::new(3.0, 4.0)]);
        assert!(is_duplicate(&a, &b));
        let inside = square("same", 0.0, 0.0, 10.0);
        assert!(is_duplicate(&inside, &a));
        let far_line = DetectionResult::new(
            "same",
            1,
            vec![Point::new(20.0, 0.0), Point::new(20.0, 10.0)],
        );
        assert!(!is_duplicate(&inside, &far_line));
    }

    /// 640x480 frame, black except for the listed marker pixels
    fn marked_frame(markers: &[(u32, u32)]) -> Frame {
        let (w, h) = (640u32, 480u32);
        let mut data = vec![0u8; (w * h * 4) as usize];
        for px in data.chunks_exact_mut(4) {
            px[3] = 255;
        }
        for &(x, y) in markers {
            let i = ((y * w + x) * 4) as usize;
            data[i..i + 3].copy_from_slice(&[255, 255, 255]);
        }
        Frame::new(w, h, data).unwrap()
    }

    /// Decoder that hits when local `(10, 10)` is white, recording every input size
    fn marker_invoker(calls: Arc<Mutex<Vec<(u32, u32)>>>) -> DecodeInvoker {
        DecodeInvoker::new(Box::new(
            move |frame: &Frame| -> ScanResult<Vec<DetectionResult>> {
                calls.lock().unwrap().push(frame.dimensions());
                if frame.pixel(10, 10)[0] == 255 {
                    Ok(vec![DetectionResult::new("marker", 1, vec![Point::new(1.0, 2.0)])])
                } else {
                    Ok(Vec::new())
                }
            },
        ))
    }

    fn quarter_plan() -> WindowPlan {
        WindowPlan {
            scales: vec![0.5],
            stride: 0.5,
            max_windows: 9,
        }
    }

    #[test]
    fn full_frame_hit_generates_no_windows() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let invoker = marker_invoker(calls.clone());
        let frame = marked_frame(&[(10, 10)]);
        let found = search(&frame, &quarter_plan(), &invoker, &Enhancer::pure_only());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bounds[0], Point::new(1.0, 2.0));
        assert_eq!(*calls.lock().unwrap(), vec![(640, 480)]);
    }

    #[test]
    fn window_hit_is_offset_and_stops_the_search() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let invoker = marker_invoker(calls.clone());
        // Windows are 320x240 on a 160x120 step; (160, 120) is the fifth and
        // (320, 240) the ninth
        let frame = marked_frame(&[(170, 130), (330, 250)]);
        let found = search(&frame, &quarter_plan(), &invoker, &Enhancer::pure_only());

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].bounds[0], Point::new(161.0, 122.0));
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1 + 5);
        assert!(calls[1..].iter().all(|&d| d == (320, 240)));
    }

    #[test]
    fn no_hit_tries_every_window() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let invoker = marker_invoker(calls.clone());
        let found = search(&marked_frame(&[]), &quarter_plan(), &invoker, &Enhancer::pure_only());
        assert!(found.is_empty());
        assert_eq!(calls.lock().unwrap().len(), 1 + 9);
    }
}
