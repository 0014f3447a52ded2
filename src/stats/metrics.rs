//! Push session counters
//!
//! Owned and updated by the worker; a copy is handed back when the session
//! stops.

use std::time::{Duration, Instant};

/// Push session statistics
#[derive(Debug, Clone)]
pub struct PushStats {
    /// Session start time
    pub started_at: Instant,
    /// Frames accepted into the reorder cache
    pub frames_queued: u64,
    /// Tags written to the transport, replayed headers included
    pub frames_sent: u64,
    /// Video tags written
    pub video_frames: u64,
    /// Audio tags written
    pub audio_frames: u64,
    /// Keyframes written
    pub keyframes: u64,
    /// Frames lost to a missing or failed connection
    pub dropped_frames: u64,
    /// Bytes handed to the transport
    pub bytes_sent: u64,
    /// Successful connects
    pub connects: u64,
    /// Connection teardowns after a failure
    pub disconnects: u64,
    /// Dts of the last tag written
    pub last_dts: Option<u32>,
}

impl Default for PushStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PushStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            frames_queued: 0,
            frames_sent: 0,
            video_frames: 0,
            audio_frames: 0,
            keyframes: 0,
            dropped_frames: 0,
            bytes_sent: 0,
            connects: 0,
            disconnects: 0,
            last_dts: None,
        }
    }

    /// Get duration since the session started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Average outbound bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration().as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }

    pub(crate) fn record_sent(&mut self, is_video: bool, is_keyframe: bool, dts: u32, bytes: usize) {
        self.frames_sent += 1;
        if is_video {
            self.video_frames += 1;
        } else {
            self.audio_frames += 1;
        }
        if is_keyframe {
            self.keyframes += 1;
        }
        self.bytes_sent += bytes as u64;
        self.last_dts = Some(dts);
    }
}
