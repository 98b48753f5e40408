//! End-to-end scheduling behaviour: stage ordering, the adaptive gate, budget
//! skips and coordinate mapping back to the submitted frame.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use rust_qr_live::config::{PreprocessingConfig, ProcessingConfig, UpscaleFilter};
use rust_qr_live::enhance::{Capabilities, EnhancementPrimitives, Enhancer, PureBackend};
use rust_qr_live::error::PrimitiveError;
use rust_qr_live::models::{Point, Rect};
use rust_qr_live::{DecodeSession, DetectionResult, Frame, RqrrDecoder, ScanResult};

fn relaxed() -> ProcessingConfig {
    ProcessingConfig {
        target_fps: 1,
        ..Default::default()
    }
}

fn white(width: u32, height: u32) -> Frame {
    Frame::filled(width, height, [255, 255, 255, 255]).unwrap()
}

fn corner_hit(frame: &Frame) -> DetectionResult {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    DetectionResult::new("hit", 3, vec![Point::new(0.0, 0.0), Point::new(w, h)])
}

#[derive(Default)]
struct Calls {
    sharpen: AtomicUsize,
    upscale: AtomicUsize,
}

/// Pure backend that counts the expensive transforms
struct Counting(Arc<Calls>);

impl EnhancementPrimitives for Counting {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn crop(&self, frame: &Frame, rect: Rect) -> Result<Frame, PrimitiveError> {
        PureBackend.crop(frame, rect)
    }

    fn sharpen(
        &self,
        frame: &Frame,
        sigma: f32,
        amount: f32,
        threshold: i32,
    ) -> Result<Frame, PrimitiveError> {
        self.0.sharpen.fetch_add(1, Ordering::SeqCst);
        PureBackend.sharpen(frame, sigma, amount, threshold)
    }

    fn upscale(
        &self,
        frame: &Frame,
        factor: f32,
        filter: UpscaleFilter,
    ) -> Result<Frame, PrimitiveError> {
        self.0.upscale.fetch_add(1, Ordering::SeqCst);
        PureBackend.upscale(frame, factor, filter)
    }

    fn resize_exact(
        &self,
        frame: &Frame,
        width: u32,
        height: u32,
        filter: UpscaleFilter,
    ) -> Result<Frame, PrimitiveError> {
        PureBackend.resize_exact(frame, width, height, filter)
    }

    fn gamma(&self, frame: &Frame, gamma: f32) -> Result<Frame, PrimitiveError> {
        PureBackend.gamma(frame, gamma)
    }

    fn adaptive_threshold(
        &self,
        frame: &Frame,
        block_radius: u32,
        bias: i32,
    ) -> Result<Frame, PrimitiveError> {
        PureBackend.adaptive_threshold(frame, block_radius, bias)
    }

    fn contrast(&self, frame: &Frame, factor: f32) -> Result<Frame, PrimitiveError> {
        PureBackend.contrast(frame, factor)
    }
}

#[test]
fn blank_frame_with_rqrr_reaches_stage_three() {
    let mut session =
        DecodeSession::new(ProcessingConfig::default(), Box::new(RqrrDecoder::new())).unwrap();
    session.set_surface(640, 480).unwrap();
    let outcome = session.process_frame(&white(640, 480));
    assert_eq!(outcome.stage_used, 3);
    assert!(outcome.results.is_empty());
    assert_eq!(session.tracker().stage1_total_count(), 1);
    assert_eq!(session.tracker().stage1_success_count(), 0);
}

#[test]
fn stage_one_hit_skips_enhancement() {
    let calls = Arc::new(Calls::default());
    let enhancer = Enhancer::with_backend(Box::new(Counting(calls.clone())));
    let primitive = |f: &Frame| -> ScanResult<Vec<DetectionResult>> { Ok(vec![corner_hit(f)]) };
    let mut session = DecodeSession::with_enhancer(relaxed(), Box::new(primitive), enhancer).unwrap();

    let outcome = session.process_frame(&white(320, 240));
    assert_eq!(outcome.stage_used, 1);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(calls.sharpen.load(Ordering::SeqCst), 0);
    assert_eq!(calls.upscale.load(Ordering::SeqCst), 0);
    assert_eq!(session.tracker().consecutive_stage1_success(), 1);
}

#[test]
fn window_hit_is_reported_as_stage_two() {
    // Only the 0.8 window of a 640x480 frame decodes
    let primitive = |f: &Frame| -> ScanResult<Vec<DetectionResult>> {
        if f.dimensions() == (512, 384) {
            Ok(vec![DetectionResult::new(
                "window",
                1,
                vec![Point::new(100.0, 50.0), Point::new(200.0, 150.0)],
            )])
        } else {
            Ok(Vec::new())
        }
    };
    let calls = Arc::new(Calls::default());
    let enhancer = Enhancer::with_backend(Box::new(Counting(calls.clone())));
    let mut session = DecodeSession::with_enhancer(relaxed(), Box::new(primitive), enhancer).unwrap();

    let outcome = session.process_frame(&white(640, 480));
    assert_eq!(outcome.stage_used, 2);
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].bounds[0], Point::new(100.0, 50.0));
    assert_eq!(calls.sharpen.load(Ordering::SeqCst), 1);
    assert_eq!(calls.upscale.load(Ordering::SeqCst), 0);
    assert_eq!(session.tracker().stage1_success_count(), 0);
}

#[test]
fn stage_three_bounds_map_to_frame_coordinates() {
    // Hits only on the upscaled center crop, at its middle
    let primitive = |f: &Frame| -> ScanResult<Vec<DetectionResult>> {
        if f.width() > 1000 {
            let (cx, cy) = (f.width() as f32 / 2.0, f.height() as f32 / 2.0);
            Ok(vec![DetectionResult::new("center", 1, vec![Point::new(cx, cy)])])
        } else {
            Ok(Vec::new())
        }
    };
    let mut session = DecodeSession::new(relaxed(), Box::new(primitive)).unwrap();
    let outcome = session.process_frame(&white(640, 480));
    assert_eq!(outcome.stage_used, 3);
    let p = outcome.results[0].bounds[0];
    assert!((p.x - 320.0).abs() <= 1.0, "x = {}", p.x);
    assert!((p.y - 240.0).abs() <= 1.0, "y = {}", p.y);
}

#[test]
fn spent_budget_skips_later_stages() {
    let slow_miss = |_: &Frame| -> ScanResult<Vec<DetectionResult>> {
        std::thread::sleep(Duration::from_millis(3));
        Ok(Vec::new())
    };
    let cfg = ProcessingConfig {
        target_fps: 1000,
        ..Default::default()
    };
    let mut session = DecodeSession::new(cfg, Box::new(slow_miss)).unwrap();
    let outcome = session.process_frame(&white(64, 48));
    assert_eq!(outcome.stage_used, 3);
    assert_eq!(outcome.skipped_stages, vec![2, 3]);
    assert!(outcome.results.is_empty());
}

#[test]
fn non_adaptive_session_runs_every_stage() {
    let slow_miss = |_: &Frame| -> ScanResult<Vec<DetectionResult>> {
        std::thread::sleep(Duration::from_millis(3));
        Ok(Vec::new())
    };
    let cfg = ProcessingConfig {
        target_fps: 1000,
        adaptive_processing: false,
        ..Default::default()
    };
    let mut session = DecodeSession::new(cfg, Box::new(slow_miss)).unwrap();
    let outcome = session.process_frame(&white(64, 48));
    assert_eq!(outcome.stage_used, 3);
    assert!(outcome.skipped_stages.is_empty());
}

fn gamma_config(adaptive: bool) -> ProcessingConfig {
    ProcessingConfig {
        adaptive_processing: adaptive,
        preprocessing_config: PreprocessingConfig {
            enable_gamma: true,
            ..Default::default()
        },
        ..relaxed()
    }
}

#[test]
fn confident_history_closes_the_preprocessing_gate() {
    let hitting = Arc::new(AtomicBool::new(true));
    let flag = hitting.clone();
    let primitive = move |f: &Frame| -> ScanResult<Vec<DetectionResult>> {
        if flag.load(Ordering::SeqCst) {
            Ok(vec![corner_hit(f)])
        } else {
            Ok(Vec::new())
        }
    };
    let mut session = DecodeSession::new(gamma_config(true), Box::new(primitive)).unwrap();
    let frame = Frame::filled(32, 32, [60, 60, 60, 255]).unwrap();

    for _ in 0..3 {
        assert!(session.process_frame(&frame).preprocessed);
    }
    for _ in 0..7 {
        let outcome = session.process_frame(&frame);
        assert_eq!(outcome.stage_used, 1);
        assert!(!outcome.preprocessed);
    }
    assert_eq!(session.stats().success_rate, 1.0);
    assert_eq!(session.stats().consecutive_stage1_success, 10);

    // A single miss breaks the streak and reopens the gate
    hitting.store(false, Ordering::SeqCst);
    assert_eq!(session.process_frame(&frame).stage_used, 3);
    assert_eq!(session.tracker().consecutive_stage1_success(), 0);
    hitting.store(true, Ordering::SeqCst);
    assert!(session.process_frame(&frame).preprocessed);
}

#[test]
fn non_adaptive_session_always_preprocesses() {
    let primitive = |f: &Frame| -> ScanResult<Vec<DetectionResult>> { Ok(vec![corner_hit(f)]) };
    let mut session = DecodeSession::new(gamma_config(false), Box::new(primitive)).unwrap();
    let frame = Frame::filled(16, 16, [60, 60, 60, 255]).unwrap();
    for _ in 0..6 {
        assert!(session.process_frame(&frame).preprocessed);
    }
}

#[test]
fn surface_scale_maps_bounds_back() {
    let primitive = |f: &Frame| -> ScanResult<Vec<DetectionResult>> { Ok(vec![corner_hit(f)]) };
    let cfg = ProcessingConfig {
        resolution_scale: 0.5,
        ..relaxed()
    };
    let mut session = DecodeSession::new(cfg, Box::new(primitive)).unwrap();
    session.set_surface(400, 300).unwrap();
    let outcome = session.process_frame(&white(400, 300));
    let far = outcome.results[0].bounds[1];
    assert!((far.x - 400.0).abs() < 1e-3);
    assert!((far.y - 300.0).abs() < 1e-3);
}

#[test]
fn merged_frames_are_decoded() {
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = seen.clone();
    let primitive = move |f: &Frame| -> ScanResult<Vec<DetectionResult>> {
        sink.lock().unwrap().push(f.pixel(0, 0));
        Ok(vec![corner_hit(f)])
    };
    let cfg = ProcessingConfig {
        enable_frame_merging: true,
        frame_merge_count: 2,
        ..relaxed()
    };
    let mut session = DecodeSession::new(cfg, Box::new(primitive)).unwrap();
    session.process_frame(&Frame::filled(4, 4, [0, 0, 0, 255]).unwrap());
    session.process_frame(&Frame::filled(4, 4, [100, 100, 100, 255]).unwrap());
    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], [0, 0, 0, 255]);
    assert_eq!(seen[1], [50, 50, 50, 255]);
}
