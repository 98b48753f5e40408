//! Performance Tracker: rolling statistics behind the adaptive decisions

use std::collections::VecDeque;

use serde::Serialize;

/// Number of frame-time samples kept
pub const TIMING_WINDOW: usize = 10;

/// Stage 1 hit history and recent frame times
#[derive(Debug, Clone, Default)]
pub struct PerformanceTracker {
    stage1_success_count: u64,
    stage1_total_count: u64,
    consecutive_stage1_success: u32,
    frame_times: VecDeque<f64>,
}

/// Point-in-time copy of the tracker, as reported over the worker protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSnapshot {
    pub stage1_success_count: u64,
    pub stage1_total_count: u64,
    pub consecutive_stage1_success: u32,
    pub success_rate: f64,
    pub average_frame_time: f64,
    pub frame_times: Vec<f64>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one processed frame
    pub fn record_attempt(&mut self, stage1_hit: bool, elapsed_ms: f64) {
        self.stage1_total_count += 1;
        if stage1_hit {
            self.stage1_success_count += 1;
            self.consecutive_stage1_success += 1;
        } else {
            self.consecutive_stage1_success = 0;
        }
        self.frame_times.push_back(elapsed_ms);
        while self.frame_times.len() > TIMING_WINDOW {
            self.frame_times.pop_front();
        }
    }

    /// Stage 1 hits over attempts; 0 before any attempt
    pub fn success_rate(&self) -> f64 {
        if self.stage1_total_count == 0 {
            0.0
        } else {
            self.stage1_success_count as f64 / self.stage1_total_count as f64
        }
    }

    /// Mean of the retained frame times; 0 when none
    pub fn average_frame_time(&self) -> f64 {
        if self.frame_times.is_empty() {
            0.0
        } else {
            self.frame_times.iter().sum::<f64>() / self.frame_times.len() as f64
        }
    }

    /// Current Stage 1 hit streak
    pub fn consecutive_stage1_success(&self) -> u32 {
        self.consecutive_stage1_success
    }

    pub fn stage1_total_count(&self) -> u64 {
        self.stage1_total_count
    }

    pub fn stage1_success_count(&self) -> u64 {
        self.stage1_success_count
    }

    /// Forget all history
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        PerformanceSnapshot {
            stage1_success_count: self.stage1_success_count,
            stage1_total_count: self.stage1_total_count,
            consecutive_stage1_success: self.consecutive_stage1_success,
            success_rate: self.success_rate(),
            average_frame_time: self.average_frame_time(),
            frame_times: self.frame_times.iter().copied().collect(),
        }
    }
}
