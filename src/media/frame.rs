//! Samples in, tag candidates out
//!
//! An [`EncodedSample`] is what the encoder hands over for one track; the
//! packagers turn it into zero or more [`LogicalFrame`]s, which the worker
//! reorders and finally serializes as FLV tags.

use bytes::Bytes;

use super::flv::{FlvTag, FlvTagType, VideoFrameType};

/// Elementary stream a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    /// H.264 Annex-B access units
    Video,
    /// AAC, raw or ADTS framed
    Audio,
}

/// One encoder output buffer
#[derive(Debug, Clone)]
pub struct EncodedSample {
    pub track: Track,
    pub data: Bytes,
    /// Presentation timestamp in milliseconds
    pub pts: u32,
}

impl EncodedSample {
    pub fn new(track: Track, data: Bytes, pts: u32) -> Self {
        Self { track, data, pts }
    }

    /// Decode timestamp; the encoders feeding this produce no reordering.
    pub fn dts(&self) -> u32 {
        self.pts
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A packaged tag candidate
///
/// Cheap to clone: the body is reference counted.
#[derive(Debug, Clone)]
pub struct LogicalFrame {
    /// Tag kind
    pub tag_type: FlvTagType,
    /// Decode timestamp in milliseconds
    pub dts: u32,
    /// Tag body (codec headers included)
    pub data: Bytes,
    /// Frame type for video frames
    pub frame_type: Option<VideoFrameType>,
    /// Whether this carries a sequence header rather than media
    pub is_header: bool,
}

impl LogicalFrame {
    /// Create a video frame
    pub fn video(dts: u32, data: Bytes, frame_type: VideoFrameType, is_header: bool) -> Self {
        Self {
            tag_type: FlvTagType::Video,
            dts,
            data,
            frame_type: Some(frame_type),
            is_header,
        }
    }

    /// Create an audio frame
    pub fn audio(dts: u32, data: Bytes, is_header: bool) -> Self {
        Self {
            tag_type: FlvTagType::Audio,
            dts,
            data,
            frame_type: None,
            is_header,
        }
    }

    pub fn is_video(&self) -> bool {
        self.tag_type == FlvTagType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.tag_type == FlvTagType::Audio
    }

    /// A video keyframe carrying media.
    ///
    /// Sequence headers are flagged as keyframes in their tag body but do not
    /// count here: they are replayed from cache on connect instead of
    /// triggering one.
    pub fn is_keyframe(&self) -> bool {
        self.is_video() && !self.is_header && self.frame_type == Some(VideoFrameType::Keyframe)
    }

    pub fn is_video_sequence_header(&self) -> bool {
        self.is_video() && self.is_header
    }

    pub fn is_audio_sequence_header(&self) -> bool {
        self.is_audio() && self.is_header
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn to_flv_tag(&self) -> FlvTag {
        FlvTag {
            tag_type: self.tag_type,
            timestamp: self.dts,
            data: self.data.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyframe_excludes_sequence_header() {
        let header = LogicalFrame::video(0, Bytes::from_static(&[0x17, 0x00]), VideoFrameType::Keyframe, true);
        assert!(!header.is_keyframe());
        assert!(header.is_video_sequence_header());

        let idr = LogicalFrame::video(0, Bytes::from_static(&[0x17, 0x01]), VideoFrameType::Keyframe, false);
        assert!(idr.is_keyframe());

        let inter = LogicalFrame::video(0, Bytes::from_static(&[0x27, 0x01]), VideoFrameType::InterFrame, false);
        assert!(!inter.is_keyframe());
    }

    #[test]
    fn test_audio_frame() {
        let frame = LogicalFrame::audio(40, Bytes::from_static(&[0xAF, 0x00, 0x12, 0x10]), true);
        assert!(frame.is_audio());
        assert!(frame.is_audio_sequence_header());
        assert!(!frame.is_keyframe());
        assert_eq!(frame.size(), 4);

        let tag = frame.to_flv_tag();
        assert_eq!(tag.timestamp, 40);
        assert_eq!(tag.tag_type, FlvTagType::Audio);
        assert_eq!(tag.data, frame.data);
    }

    #[test]
    fn test_sample_dts_equals_pts() {
        let sample = EncodedSample::new(Track::Video, Bytes::from_static(&[0, 0, 1, 0x65]), 1234);
        assert_eq!(sample.dts(), 1234);
        assert_eq!(sample.size(), 4);
    }
}
