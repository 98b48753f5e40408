//! Multi-stage decode scheduler
//!
//! A [`DecodeSession`] owns everything one scanning session needs and turns
//! each submitted frame into a [`FrameOutcome`]:
//!
//! 1. draw onto the scaling surface at `resolutionScale`
//! 2. optionally merge with recent frames
//! 3. optionally apply the Safari downscale and contrast boost
//! 4. Stage 0 preprocessing, gated on Stage 1 history
//! 5. Stage 1 direct decode, Stage 2 sharpen plus sliding windows, Stage 3
//!    center crop with upscale, escalating only on a miss and only while the
//!    frame budget allows
//!
//! Bounds in the outcome are in the coordinates of the submitted frame.

use std::borrow::Cow;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::config::{ConfigPatch, ProcessingConfig, UpscaleFilter};
use crate::decode::{DecodeInvoker, DecodeOptions, DecodePrimitive};
use crate::enhance::Enhancer;
use crate::error::ScanResult;
use crate::frame_buffer::FrameBuffer;
use crate::models::{DetectionResult, Frame};
use crate::region::center_crop;
use crate::search::{WindowPlan, search};
use crate::stats::{PerformanceSnapshot, PerformanceTracker};
use crate::utils::ScalingSurface;

/// Longest side produced by the Safari path
pub const SAFARI_MAX_DIM: u32 = 640;
/// Contrast factor applied by the Safari path
pub const SAFARI_CONTRAST: f32 = 1.2;

/// Result of scheduling one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameOutcome {
    /// Detections in submitted-frame coordinates
    pub results: Vec<DetectionResult>,
    /// Terminal stage: 1, 2 or 3
    pub stage_used: u8,
    /// Wall time from submission to outcome
    pub elapsed_ms: f64,
    /// Whether Stage 0 ran
    pub preprocessed: bool,
    /// Stages skipped because the frame budget was spent
    pub skipped_stages: Vec<u8>,
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

/// One scanning session
pub struct DecodeSession {
    config: ProcessingConfig,
    buffer: FrameBuffer,
    tracker: PerformanceTracker,
    enhancer: Enhancer,
    invoker: DecodeInvoker,
    direct: Option<DecodeInvoker>,
    surface: Option<ScalingSurface>,
}

impl std::fmt::Debug for DecodeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeSession")
            .field("config", &self.config)
            .field("buffered", &self.buffer.len())
            .field("surface", &self.surface)
            .finish_non_exhaustive()
    }
}

impl DecodeSession {
    /// Session using the `image`-backed enhancer
    pub fn new(config: ProcessingConfig, primitive: Box<dyn DecodePrimitive>) -> ScanResult<Self> {
        Self::with_enhancer(config, primitive, Enhancer::new())
    }

    /// Session with an explicit enhancer
    pub fn with_enhancer(
        config: ProcessingConfig,
        primitive: Box<dyn DecodePrimitive>,
        enhancer: Enhancer,
    ) -> ScanResult<Self> {
        config.validate()?;
        info!(
            target_fps = config.target_fps,
            adaptive = config.adaptive_processing,
            "decode session started"
        );
        Ok(Self {
            buffer: FrameBuffer::new(config.frame_merge_count),
            config,
            tracker: PerformanceTracker::new(),
            enhancer,
            invoker: DecodeInvoker::new(primitive),
            direct: None,
            surface: None,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    pub fn surface(&self) -> Option<ScalingSurface> {
        self.surface
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn stats(&self) -> PerformanceSnapshot {
        self.tracker.snapshot()
    }

    pub fn reset_stats(&mut self) {
        self.tracker.reset();
    }

    /// Frames currently held for merging
    pub fn buffered_frames(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Overlay `patch` onto the configuration.
    ///
    /// Any effective change resets the statistics. Turning merging off or
    /// changing its depth empties the frame buffer.
    pub fn update_config(&mut self, patch: &ConfigPatch) -> ScanResult<()> {
        let previous = self.config.clone();
        self.config.apply(patch)?;
        if self.config == previous {
            return Ok(());
        }

        self.tracker.reset();
        let merge_disabled = previous.enable_frame_merging && !self.config.enable_frame_merging;
        if merge_disabled || previous.frame_merge_count != self.config.frame_merge_count {
            self.buffer.clear();
        }
        self.buffer.set_max_frames(self.config.frame_merge_count);
        debug!(config = ?self.config, "configuration updated");
        Ok(())
    }

    /// Create the scaling surface or change its size
    pub fn set_surface(&mut self, width: u32, height: u32) -> ScanResult<()> {
        let next = ScalingSurface::new(width, height)?;
        if self.surface != Some(next) {
            // Buffered frames were drawn at the old size
            self.buffer.clear();
            debug!(width, height, "scaling surface ready");
        }
        self.surface = Some(next);
        Ok(())
    }

    /// Primitive used by [`decode_direct`](Self::decode_direct) instead of the
    /// staged one, typically a slower exhaustive decoder for still images
    pub fn set_direct_primitive(&mut self, primitive: Box<dyn DecodePrimitive>) {
        self.direct = Some(DecodeInvoker::new(primitive));
    }

    pub fn has_direct_primitive(&self) -> bool {
        self.direct.is_some()
    }

    /// Single-shot decode with the configured crop and sharpen, bypassing the
    /// stages. Bounds are in `frame` coordinates.
    pub fn decode_direct(&self, frame: &Frame) -> Vec<DetectionResult> {
        let options = self.decode_options();
        let offset = options.effective_crop(frame.width(), frame.height());
        let invoker = self.direct.as_ref().unwrap_or(&self.invoker);
        let results =
            invoker.decode(frame, &options, &self.enhancer, &self.config.preprocessing_config);
        match offset {
            Some(rect) => results
                .into_iter()
                .map(|r| r.translated(rect.x as f32, rect.y as f32))
                .collect(),
            None => results,
        }
    }

    /// Draw, merge, optimize and schedule one submitted frame
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutcome {
        let started = Instant::now();
        let (orig_w, orig_h) = frame.dimensions();

        let drawn = self.draw(frame);
        let merged = if self.config.enable_frame_merging {
            self.buffer.add(drawn)
        } else {
            drawn
        };
        let prepared = if self.config.optimize_for_safari {
            self.optimize_for_safari(&merged)
        } else {
            merged
        };

        let fx = orig_w as f32 / prepared.width() as f32;
        let fy = orig_h as f32 / prepared.height() as f32;
        let mut outcome = self.run_stages(&prepared, started);
        if fx != 1.0 || fy != 1.0 {
            outcome.results = outcome
                .results
                .into_iter()
                .map(|r| r.scaled_xy(fx, fy))
                .collect();
        }
        outcome
    }

    /// Schedule a frame that is already drawn, merged and optimized.
    ///
    /// Bounds are in `frame` coordinates.
    pub fn schedule(&mut self, frame: &Frame) -> FrameOutcome {
        self.run_stages(frame, Instant::now())
    }

    fn draw(&self, frame: &Frame) -> Frame {
        let scale = self.config.resolution_scale;
        let (w, h) = match self.surface {
            Some(surface) => surface.target_size(scale),
            None => (
                ((frame.width() as f32 * scale).floor() as u32).max(1),
                ((frame.height() as f32 * scale).floor() as u32).max(1),
            ),
        };
        self.enhancer
            .resize_exact(frame, w, h, UpscaleFilter::Triangle)
    }

    /// Cap the longest side at [`SAFARI_MAX_DIM`], then boost contrast
    fn optimize_for_safari(&self, frame: &Frame) -> Frame {
        let (w, h) = frame.dimensions();
        let longest = w.max(h);
        let scaled = if longest > SAFARI_MAX_DIM {
            let ratio = SAFARI_MAX_DIM as f32 / longest as f32;
            let nw = ((w as f32 * ratio).round() as u32).max(1);
            let nh = ((h as f32 * ratio).round() as u32).max(1);
            Cow::Owned(
                self.enhancer
                    .resize_exact(frame, nw, nh, UpscaleFilter::Triangle),
            )
        } else {
            Cow::Borrowed(frame)
        };
        self.enhancer.contrast(&scaled, SAFARI_CONTRAST)
    }

    fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            crop: self.config.crop,
            sharpen: self.config.sharpen_amount(),
        }
    }

    fn stage0_gate_open(&self) -> bool {
        if !self.config.adaptive_processing {
            return true;
        }
        let tuning = &self.config.tuning;
        self.tracker.success_rate() < tuning.min_success_rate as f64
            || self.tracker.consecutive_stage1_success() < tuning.min_consecutive_hits
    }

    fn run_stages(&mut self, frame: &Frame, started: Instant) -> FrameOutcome {
        let mut outcome = self.stages(frame, started);
        outcome.elapsed_ms = elapsed_ms(started);
        self.tracker
            .record_attempt(outcome.stage_used == 1, outcome.elapsed_ms);
        trace!(
            stage = outcome.stage_used,
            found = outcome.results.len(),
            elapsed_ms = outcome.elapsed_ms,
            "frame scheduled"
        );
        outcome
    }

    fn stages(&self, frame: &Frame, started: Instant) -> FrameOutcome {
        let cfg = &self.config;
        let pre = &cfg.preprocessing_config;
        let budget = cfg.frame_budget_ms();
        let mut outcome = FrameOutcome {
            results: Vec::new(),
            stage_used: 1,
            elapsed_ms: 0.0,
            preprocessed: false,
            skipped_stages: Vec::new(),
        };

        // Stage 0
        let mut work = Cow::Borrowed(frame);
        if (pre.enable_gamma || pre.enable_adaptive_threshold) && self.stage0_gate_open() {
            if pre.enable_gamma {
                work = Cow::Owned(self.enhancer.gamma(&work, pre.gamma));
            }
            if pre.enable_adaptive_threshold {
                work = Cow::Owned(self.enhancer.adaptive_threshold(
                    &work,
                    pre.block_radius,
                    pre.threshold_bias,
                ));
            }
            outcome.preprocessed = true;
        }

        // Stage 1
        let options = self.decode_options();
        let crop = options.effective_crop(work.width(), work.height());
        let hits = self.invoker.decode(&work, &options, &self.enhancer, pre);
        if !hits.is_empty() {
            outcome.results = match crop {
                Some(rect) => hits
                    .into_iter()
                    .map(|r| r.translated(rect.x as f32, rect.y as f32))
                    .collect(),
                None => hits,
            };
            return outcome;
        }

        // Stage 2
        let spent = elapsed_ms(started);
        if cfg.adaptive_processing && spent > budget * cfg.tuning.stage2_budget_fraction as f64 {
            debug!(spent, budget, "skipping stage 2");
            outcome.skipped_stages.push(2);
        } else {
            let sharpened = self.enhancer.sharpen(
                &work,
                pre.sharpen_sigma,
                pre.sharpen_amount,
                pre.sharpen_threshold,
            );
            let plan = WindowPlan {
                scales: cfg.search.stage2_scales.clone(),
                stride: cfg.search.window_stride,
                max_windows: cfg.search.stage2_max_windows,
            };
            let hits = search(&sharpened, &plan, &self.invoker, &self.enhancer);
            if !hits.is_empty() {
                outcome.stage_used = 2;
                outcome.results = hits;
                return outcome;
            }
        }

        // Stage 3 is terminal whether or not it runs
        outcome.stage_used = 3;
        let spent = elapsed_ms(started);
        if cfg.adaptive_processing && spent >= budget * cfg.tuning.stage3_budget_fraction as f64 {
            debug!(spent, budget, "skipping stage 3");
            outcome.skipped_stages.push(3);
            return outcome;
        }

        let rect = center_crop(work.width(), work.height(), cfg.search.stage3_center_area);
        let region = self.enhancer.crop(&work, rect);
        let upscaled = self.enhancer.upscale(
            &region,
            cfg.search.stage3_upscale_factor,
            pre.upscale_filter,
        );
        let contrasted = self.enhancer.contrast(&upscaled, cfg.search.stage3_contrast);
        let enhanced = self.enhancer.sharpen(
            &contrasted,
            pre.sharpen_sigma,
            pre.sharpen_amount,
            pre.sharpen_threshold,
        );

        // Use the realized factor per axis; rounding makes it differ slightly
        let fx = region.width() as f32 / enhanced.width() as f32;
        let fy = region.height() as f32 / enhanced.height() as f32;
        outcome.results = self
            .invoker
            .decode_frame(&enhanced)
            .into_iter()
            .map(|r| r.scaled_xy(fx, fy).translated(rect.x as f32, rect.y as f32))
            .collect();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScanResult;
    use crate::models::Point;

    fn never(_: &Frame) -> ScanResult<Vec<DetectionResult>> {
        Ok(Vec::new())
    }

    fn always(frame: &Frame) -> ScanResult<Vec<DetectionResult>> {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        Ok(vec![DetectionResult::new(
            "code",
            2,
            vec![Point::new(0.0, 0.0), Point::new(w, h)],
        )])
    }

    fn relaxed() -> ProcessingConfig {
        ProcessingConfig {
            target_fps: 1,
            ..Default::default()
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = ProcessingConfig {
            target_fps: 0,
            ..Default::default()
        };
        assert!(DecodeSession::new(cfg, Box::new(never)).is_err());
    }

    #[test]
    fn miss_everywhere_ends_in_stage_three() {
        let mut session = DecodeSession::new(relaxed(), Box::new(never)).unwrap();
        let frame = Frame::filled(64, 48, [255, 255, 255, 255]).unwrap();
        let outcome = session.process_frame(&frame);
        assert_eq!(outcome.stage_used, 3);
        assert!(outcome.results.is_empty());
        assert!(outcome.skipped_stages.is_empty());
        assert_eq!(session.tracker().stage1_total_count(), 1);
        assert_eq!(session.tracker().consecutive_stage1_success(), 0);
    }

    #[test]
    fn resolution_scale_bounds_map_back() {
        let cfg = ProcessingConfig {
            resolution_scale: 0.5,
            ..relaxed()
        };
        let mut session = DecodeSession::new(cfg, Box::new(always)).unwrap();
        let frame = Frame::filled(80, 60, [0, 0, 0, 255]).unwrap();
        let outcome = session.process_frame(&frame);
        assert_eq!(outcome.stage_used, 1);
        let far = outcome.results[0].bounds[1];
        assert!((far.x - 80.0).abs() < 1e-3 && (far.y - 60.0).abs() < 1e-3);
    }

    #[test]
    fn config_crop_offsets_stage_one_bounds() {
        let cfg = ProcessingConfig {
            crop: Some(crate::models::Rect::new(10, 5, 20, 20)),
            ..relaxed()
        };
        let mut session = DecodeSession::new(cfg, Box::new(always)).unwrap();
        let frame = Frame::filled(64, 48, [0, 0, 0, 255]).unwrap();
        let outcome = session.process_frame(&frame);
        assert_eq!(outcome.results[0].bounds[0], Point::new(10.0, 5.0));
        assert_eq!(outcome.results[0].bounds[1], Point::new(30.0, 25.0));
    }

    #[test]
    fn safari_path_caps_the_longest_side() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let primitive = move |frame: &Frame| -> ScanResult<Vec<DetectionResult>> {
            sink.lock().unwrap().push(frame.dimensions());
            Ok(vec![DetectionResult::new("s", 1, Vec::new())])
        };
        let cfg = ProcessingConfig {
            optimize_for_safari: true,
            ..relaxed()
        };
        let mut session = DecodeSession::new(cfg, Box::new(primitive)).unwrap();
        session.set_surface(1280, 720).unwrap();
        let frame = Frame::filled(1280, 720, [90, 90, 90, 255]).unwrap();
        session.process_frame(&frame);
        assert_eq!(seen.lock().unwrap()[0], (640, 360));
    }

    #[test]
    fn merge_toggle_and_depth_clear_the_buffer() {
        let cfg = ProcessingConfig {
            enable_frame_merging: true,
            ..relaxed()
        };
        let mut session = DecodeSession::new(cfg, Box::new(always)).unwrap();
        let frame = Frame::filled(8, 8, [1, 2, 3, 255]).unwrap();
        session.process_frame(&frame);
        session.process_frame(&frame);
        assert_eq!(session.buffered_frames(), 2);
        assert_eq!(session.tracker().stage1_total_count(), 2);

        session
            .update_config(&ConfigPatch {
                frame_merge_count: Some(5),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(session.buffered_frames(), 0);
        assert_eq!(session.tracker().stage1_total_count(), 0);

        session.process_frame(&frame);
        session
            .update_config(&ConfigPatch {
                enable_frame_merging: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(session.buffered_frames(), 0);
    }

    #[test]
    fn unchanged_config_keeps_stats() {
        let mut session = DecodeSession::new(relaxed(), Box::new(always)).unwrap();
        let frame = Frame::filled(8, 8, [1, 2, 3, 255]).unwrap();
        session.process_frame(&frame);
        session
            .update_config(&ConfigPatch {
                target_fps: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(session.tracker().stage1_total_count(), 1);
    }

    #[test]
    fn direct_decode_prefers_the_direct_primitive() {
        let mut session = DecodeSession::new(relaxed(), Box::new(never)).unwrap();
        let frame = Frame::filled(8, 8, [0, 0, 0, 255]).unwrap();
        assert!(session.decode_direct(&frame).is_empty());

        session.set_direct_primitive(Box::new(always));
        assert_eq!(session.decode_direct(&frame).len(), 1);
        // Staged scheduling still uses the original primitive
        assert_eq!(session.process_frame(&frame).stage_used, 3);
    }

    #[test]
    fn merged_frame_keeps_the_drawn_size() {
        let cfg = ProcessingConfig {
            enable_frame_merging: true,
            resolution_scale: 0.5,
            ..relaxed()
        };
        let seen = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let primitive = move |frame: &Frame| -> ScanResult<Vec<DetectionResult>> {
            sink.lock().unwrap().push(frame.dimensions());
            Ok(vec![DetectionResult::new("m", 1, Vec::new())])
        };
        let mut session = DecodeSession::new(cfg, Box::new(primitive)).unwrap();
        let frame = Frame::filled(40, 20, [9, 9, 9, 255]).unwrap();
        session.process_frame(&frame);
        session.process_frame(&frame);
        assert_eq!(*seen.lock().unwrap(), vec![(20, 10), (20, 10)]);
    }
}
