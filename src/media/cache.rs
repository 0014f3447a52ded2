//! Reorder cache
//!
//! Audio and video arrive in encoder order, which is not dts order across
//! the two tracks. Frames are held until more than `max_queued_video` video
//! frames are waiting, then the queue is sorted by dts and drained from the
//! front until the bound holds again. Audio can therefore arrive up to about
//! one video frame interval late and still be emitted in order.
//!
//! The latest sequence headers are kept separately so a new connection can
//! be primed with them before any media.

use std::collections::VecDeque;

use super::frame::LogicalFrame;

/// Default number of video frames kept back before a flush
pub const DEFAULT_MAX_QUEUED_VIDEO: usize = 2;

/// Most recent sequence headers, replayed after every connect
#[derive(Debug, Default)]
pub struct SequenceHeaders {
    video: Option<LogicalFrame>,
    audio: Option<LogicalFrame>,
}

impl SequenceHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `frame` if it is a sequence header. Returns true if it was.
    pub fn remember(&mut self, frame: &LogicalFrame) -> bool {
        if frame.is_video_sequence_header() {
            self.video = Some(frame.clone());
            true
        } else if frame.is_audio_sequence_header() {
            self.audio = Some(frame.clone());
            true
        } else {
            false
        }
    }

    pub fn video(&self) -> Option<&LogicalFrame> {
        self.video.as_ref()
    }

    pub fn audio(&self) -> Option<&LogicalFrame> {
        self.audio.as_ref()
    }

    /// Headers to send on a fresh connection, video first.
    pub fn replay(&self) -> impl Iterator<Item = &LogicalFrame> {
        self.video.iter().chain(self.audio.iter())
    }

    pub fn clear(&mut self) {
        self.video = None;
        self.audio = None;
    }
}

/// Pending frames awaiting a dts-ordered flush
#[derive(Debug)]
pub struct ReorderCache {
    frames: VecDeque<LogicalFrame>,
    queued_videos: usize,
    max_queued_video: usize,
}

impl Default for ReorderCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_QUEUED_VIDEO)
    }
}

impl ReorderCache {
    pub fn new(max_queued_video: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            queued_videos: 0,
            max_queued_video,
        }
    }

    pub fn push(&mut self, frame: LogicalFrame) {
        if frame.is_video() {
            self.queued_videos += 1;
        }
        self.frames.push_back(frame);
    }

    /// More video frames are waiting than the bound allows.
    pub fn needs_flush(&self) -> bool {
        self.queued_videos > self.max_queued_video
    }

    /// Stable sort of the pending frames by ascending dts.
    pub fn sort(&mut self) {
        self.frames.make_contiguous().sort_by_key(|f| f.dts);
    }

    /// Take the front frame while the video bound is exceeded.
    ///
    /// Call [`sort`](Self::sort) first; frames come out in queue order.
    pub fn pop_ready(&mut self) -> Option<LogicalFrame> {
        if !self.needs_flush() {
            return None;
        }
        let frame = self.frames.pop_front()?;
        if frame.is_video() {
            self.queued_videos -= 1;
        }
        Some(frame)
    }

    /// Sort and drain everything that must go out now.
    pub fn drain_ready(&mut self) -> Vec<LogicalFrame> {
        self.sort();
        std::iter::from_fn(|| self.pop_ready()).collect()
    }

    pub fn queued_videos(&self) -> usize {
        self.queued_videos
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.queued_videos = 0;
    }
}
