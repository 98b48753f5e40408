//! Session configuration
//!
//! `ProcessingConfig` is supplied once per session and changed only through
//! [`ConfigPatch`], a field-wise overlay. The adaptive thresholds are tuned
//! values, exposed as defaults rather than fixed constants.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ScanError, ScanResult};
use crate::models::Rect;

fn parse_env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

fn parse_env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

/// Resampling filter used when upscaling.
///
/// Accepted on the wire either by name or by the native primitive's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", try_from = "FilterRepr")]
pub enum UpscaleFilter {
    /// Nearest neighbour
    Nearest,
    /// Bilinear
    Triangle,
    /// Bicubic (Catmull-Rom)
    CatmullRom,
    /// Lanczos with a window of 3
    #[default]
    Lanczos3,
}

impl UpscaleFilter {
    /// Filter for the native `upscale(pixels, w, h, factor, filterIndex)` index
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(UpscaleFilter::Nearest),
            1 => Some(UpscaleFilter::Triangle),
            2 => Some(UpscaleFilter::CatmullRom),
            3 => Some(UpscaleFilter::Lanczos3),
            _ => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "nearest" => Some(UpscaleFilter::Nearest),
            "triangle" => Some(UpscaleFilter::Triangle),
            "catmull-rom" => Some(UpscaleFilter::CatmullRom),
            "lanczos3" => Some(UpscaleFilter::Lanczos3),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FilterRepr {
    Index(u8),
    Name(String),
}

impl TryFrom<FilterRepr> for UpscaleFilter {
    type Error = String;

    fn try_from(repr: FilterRepr) -> Result<Self, Self::Error> {
        match repr {
            FilterRepr::Index(i) => {
                UpscaleFilter::from_index(i).ok_or_else(|| format!("unknown filter index {i}"))
            }
            FilterRepr::Name(n) => {
                UpscaleFilter::from_name(&n).ok_or_else(|| format!("unknown filter {n:?}"))
            }
        }
    }
}

/// Stage 0 toggles and enhancement parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreprocessingConfig {
    /// Apply gamma correction in Stage 0
    pub enable_gamma: bool,
    /// Fixed gamma; `None` selects one from frame brightness
    pub gamma: Option<f32>,
    /// Apply adaptive thresholding in Stage 0
    pub enable_adaptive_threshold: bool,
    /// Half-size of the local neighbourhood
    pub block_radius: u32,
    /// Subtracted from the local mean before comparing
    pub threshold_bias: i32,
    /// Gaussian sigma of the unsharp mask
    pub sharpen_sigma: f32,
    /// Unsharp mask gain
    pub sharpen_amount: f32,
    /// Minimum detail magnitude that gets sharpened
    pub sharpen_threshold: i32,
    /// Filter used by the Stage 3 upscale
    pub upscale_filter: UpscaleFilter,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            enable_gamma: false,
            gamma: None,
            enable_adaptive_threshold: false,
            block_radius: 15,
            threshold_bias: 8,
            sharpen_sigma: 1.0,
            sharpen_amount: 1.5,
            sharpen_threshold: 0,
            upscale_filter: UpscaleFilter::Lanczos3,
        }
    }
}

/// Thresholds of the adaptive control loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdaptiveTuning {
    /// Stage 0 keeps running while the Stage 1 hit rate is below this
    pub min_success_rate: f32,
    /// Stage 0 keeps running while the hit streak is shorter than this
    pub min_consecutive_hits: u32,
    /// Stage 2 is skipped once elapsed time exceeds this share of the frame budget
    pub stage2_budget_fraction: f32,
    /// Stage 3 runs only while elapsed time is below this share of the frame budget
    pub stage3_budget_fraction: f32,
}

impl Default for AdaptiveTuning {
    fn default() -> Self {
        Self {
            min_success_rate: 0.7,
            min_consecutive_hits: 3,
            stage2_budget_fraction: 0.6,
            stage3_budget_fraction: 0.8,
        }
    }
}

impl AdaptiveTuning {
    /// Defaults overridden by `QR_LIVE_MIN_SUCCESS_RATE`, `QR_LIVE_MIN_CONSECUTIVE_HITS`,
    /// `QR_LIVE_STAGE2_BUDGET` and `QR_LIVE_STAGE3_BUDGET`
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            min_success_rate: parse_env_f32("QR_LIVE_MIN_SUCCESS_RATE", d.min_success_rate)
                .clamp(0.0, 1.0),
            min_consecutive_hits: parse_env_u32(
                "QR_LIVE_MIN_CONSECUTIVE_HITS",
                d.min_consecutive_hits,
            ),
            stage2_budget_fraction: parse_env_f32("QR_LIVE_STAGE2_BUDGET", d.stage2_budget_fraction)
                .max(0.0),
            stage3_budget_fraction: parse_env_f32("QR_LIVE_STAGE3_BUDGET", d.stage3_budget_fraction)
                .max(0.0),
        }
    }
}

/// Search effort of Stage 2 and Stage 3
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchTuning {
    /// Window scales tried by Stage 2, largest first
    pub stage2_scales: Vec<f32>,
    /// Upper bound on Stage 2 windows
    pub stage2_max_windows: usize,
    /// Window step as a fraction of window size
    pub window_stride: f32,
    /// Share of the frame area kept by the Stage 3 center crop
    pub stage3_center_area: f32,
    /// Stage 3 upscale factor
    pub stage3_upscale_factor: f32,
    /// Stage 3 contrast factor
    pub stage3_contrast: f32,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            stage2_scales: vec![1.0, 0.8],
            stage2_max_windows: 6,
            window_stride: 0.5,
            stage3_center_area: 0.5,
            stage3_upscale_factor: 2.5,
            stage3_contrast: 1.5,
        }
    }
}

/// Per-session processing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessingConfig {
    /// Scale applied when drawing frames onto the scaling surface, in (0, 1]
    pub resolution_scale: f32,
    /// Region decoded by Stage 1 and direct decodes
    pub crop: Option<Rect>,
    /// Sharpen amount applied by Stage 1 and direct decodes
    pub sharpen: Option<f32>,
    /// Average the most recent frames before decoding
    pub enable_frame_merging: bool,
    /// Number of frames averaged when merging
    pub frame_merge_count: usize,
    /// Downscale and boost contrast before decoding
    pub optimize_for_safari: bool,
    /// Stage 0 and enhancement parameters
    pub preprocessing_config: PreprocessingConfig,
    /// Frame rate the scheduler budgets for
    #[serde(rename = "targetFPS")]
    pub target_fps: u32,
    /// Gate Stage 0 on hit history and skip stages that cannot fit the budget
    pub adaptive_processing: bool,
    /// Adaptive thresholds
    pub tuning: AdaptiveTuning,
    /// Stage 2/3 search effort
    pub search: SearchTuning,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            resolution_scale: 1.0,
            crop: None,
            sharpen: None,
            enable_frame_merging: false,
            frame_merge_count: 3,
            optimize_for_safari: false,
            preprocessing_config: PreprocessingConfig::default(),
            target_fps: 60,
            adaptive_processing: true,
            tuning: AdaptiveTuning::default(),
            search: SearchTuning::default(),
        }
    }
}

impl ProcessingConfig {
    /// Time available per frame in milliseconds
    pub fn frame_budget_ms(&self) -> f64 {
        1000.0 / self.target_fps.max(1) as f64
    }

    /// Sharpen amount when positive
    pub fn sharpen_amount(&self) -> Option<f32> {
        self.sharpen.filter(|a| *a > 0.0)
    }

    /// Reject values outside their documented ranges
    pub fn validate(&self) -> ScanResult<()> {
        if !(self.resolution_scale > 0.0 && self.resolution_scale <= 1.0) {
            return Err(ScanError::InvalidConfig(format!(
                "resolutionScale must be in (0, 1], got {}",
                self.resolution_scale
            )));
        }
        if self.target_fps == 0 {
            return Err(ScanError::InvalidConfig("targetFPS must be positive".into()));
        }
        if self.frame_merge_count == 0 {
            return Err(ScanError::InvalidConfig(
                "frameMergeCount must be at least 1".into(),
            ));
        }
        if let Some(crop) = self.crop {
            if !crop.has_area() {
                return Err(ScanError::InvalidConfig(
                    "crop must have positive width and height".into(),
                ));
            }
        }
        if self.search.stage3_upscale_factor <= 0.0 || self.search.window_stride <= 0.0 {
            return Err(ScanError::InvalidConfig(
                "upscale factor and window stride must be positive".into(),
            ));
        }
        if !(self.search.stage3_center_area > 0.0 && self.search.stage3_center_area <= 1.0) {
            return Err(ScanError::InvalidConfig(
                "stage3CenterArea must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Overlay `patch` and validate; on error `self` is left unchanged
    pub fn apply(&mut self, patch: &ConfigPatch) -> ScanResult<()> {
        let mut next = self.clone();
        patch.overlay(&mut next);
        next.validate()?;
        *self = next;
        Ok(())
    }
}

// Present-but-null becomes `Some(None)`, absent stays `None` via `#[serde(default)]`.
fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Partial preprocessing update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreprocessingPatch {
    pub enable_gamma: Option<bool>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub gamma: Option<Option<f32>>,
    pub enable_adaptive_threshold: Option<bool>,
    pub block_radius: Option<u32>,
    pub threshold_bias: Option<i32>,
    pub sharpen_sigma: Option<f32>,
    pub sharpen_amount: Option<f32>,
    pub sharpen_threshold: Option<i32>,
    pub upscale_filter: Option<UpscaleFilter>,
}

/// Partial configuration update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigPatch {
    pub resolution_scale: Option<f32>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub crop: Option<Option<Rect>>,
    #[serde(deserialize_with = "double_option", skip_serializing_if = "Option::is_none")]
    pub sharpen: Option<Option<f32>>,
    pub enable_frame_merging: Option<bool>,
    pub frame_merge_count: Option<usize>,
    pub optimize_for_safari: Option<bool>,
    pub preprocessing_config: Option<PreprocessingPatch>,
    #[serde(rename = "targetFPS")]
    pub target_fps: Option<u32>,
    pub adaptive_processing: Option<bool>,
    pub tuning: Option<AdaptiveTuning>,
    pub search: Option<SearchTuning>,
}

impl ConfigPatch {
    fn overlay(&self, cfg: &mut ProcessingConfig) {
        if let Some(v) = self.resolution_scale {
            cfg.resolution_scale = v;
        }
        if let Some(v) = self.crop {
            cfg.crop = v;
        }
        if let Some(v) = self.sharpen {
            cfg.sharpen = v;
        }
        if let Some(v) = self.enable_frame_merging {
            cfg.enable_frame_merging = v;
        }
        if let Some(v) = self.frame_merge_count {
            cfg.frame_merge_count = v;
        }
        if let Some(v) = self.optimize_for_safari {
            cfg.optimize_for_safari = v;
        }
        if let Some(pre) = &self.preprocessing_config {
            pre.overlay(&mut cfg.preprocessing_config);
        }
        if let Some(v) = self.target_fps {
            cfg.target_fps = v;
        }
        if let Some(v) = self.adaptive_processing {
            cfg.adaptive_processing = v;
        }
        if let Some(v) = self.tuning {
            cfg.tuning = v;
        }
        if let Some(v) = &self.search {
            cfg.search = v.clone();
        }
    }
}

impl PreprocessingPatch {
    fn overlay(&self, pre: &mut PreprocessingConfig) {
        if let Some(v) = self.enable_gamma {
            pre.enable_gamma = v;
        }
        if let Some(v) = self.gamma {
            pre.gamma = v;
        }
        if let Some(v) = self.enable_adaptive_threshold {
            pre.enable_adaptive_threshold = v;
        }
        if let Some(v) = self.block_radius {
            pre.block_radius = v;
        }
        if let Some(v) = self.threshold_bias {
            pre.threshold_bias = v;
        }
        if let Some(v) = self.sharpen_sigma {
            pre.sharpen_sigma = v;
        }
        if let Some(v) = self.sharpen_amount {
            pre.sharpen_amount = v;
        }
        if let Some(v) = self.sharpen_threshold {
            pre.sharpen_threshold = v;
        }
        if let Some(v) = self.upscale_filter {
            pre.upscale_filter = v;
        }
    }
}
