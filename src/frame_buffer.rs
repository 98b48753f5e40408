//! Frame Buffer: recent frames averaged to suppress sensor noise

use std::collections::VecDeque;

use tracing::debug;

use crate::models::Frame;

/// Depth used when none is configured
pub const DEFAULT_MAX_FRAMES: usize = 3;

/// FIFO of the most recent frames, capped at `max_frames`
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    frames: VecDeque<Frame>,
    max_frames: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAMES)
    }
}

impl FrameBuffer {
    /// Buffer holding at most `max_frames` frames (at least one)
    pub fn new(max_frames: usize) -> Self {
        let max_frames = max_frames.max(1);
        Self {
            frames: VecDeque::with_capacity(max_frames + 1),
            max_frames,
        }
    }

    /// Capacity
    pub fn max_frames(&self) -> usize {
        self.max_frames
    }

    /// Change the capacity, evicting the oldest frames if needed
    pub fn set_max_frames(&mut self, max_frames: usize) {
        self.max_frames = max_frames.max(1);
        while self.frames.len() > self.max_frames {
            self.frames.pop_front();
        }
    }

    /// Frames currently held
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Push `frame`, evicting the oldest when over capacity, and return the
    /// merge of the held frames including it.
    ///
    /// A frame with different dimensions from the buffered ones clears the
    /// buffer first, so the held frames always share one size.
    pub fn add(&mut self, frame: Frame) -> Frame {
        if let Some(front) = self.frames.front() {
            if !front.same_size(&frame) {
                debug!(
                    old = ?front.dimensions(),
                    new = ?frame.dimensions(),
                    "frame size changed, clearing merge buffer"
                );
                self.frames.clear();
            }
        }
        while self.frames.len() >= self.max_frames {
            self.frames.pop_front();
        }
        let merged = if self.frames.is_empty() {
            frame.clone()
        } else {
            average(&frame, self.frames.iter().chain(std::iter::once(&frame)))
        };
        self.frames.push_back(frame);
        merged
    }

    /// Held frames, oldest first
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Per-channel mean of the held frames; `None` when empty.
    ///
    /// A single held frame is returned unchanged.
    pub fn merge(&self) -> Option<Frame> {
        let first = self.frames.front()?;
        if self.frames.len() == 1 {
            return Some(first.clone());
        }
        Some(average(first, self.frames.iter()))
    }

    /// Drop every held frame
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Round-half-up mean, `(sum + n/2) / n`, over frames sized like `like`
fn average<'a>(like: &Frame, frames: impl Iterator<Item = &'a Frame>) -> Frame {
    let mut sums = vec![0u32; like.data().len()];
    let mut count = 0u32;
    for frame in frames {
        for (acc, &v) in sums.iter_mut().zip(frame.data()) {
            *acc += v as u32;
        }
        count += 1;
    }
    let count = count.max(1);
    let data = sums
        .into_iter()
        .map(|s| ((s + count / 2) / count) as u8)
        .collect();
    Frame::from_parts(like.width(), like.height(), data)
}
