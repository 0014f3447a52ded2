//! FLV tag encoding
//!
//! The pushed byte stream is a plain FLV file: a 13-byte file header followed
//! by tags, each tag trailed by a 4-byte size field.
//!
//! FLV Tag Structure:
//! ```text
//! +--------+-------------+-----------+-------------+---------+---------+
//! | Type(1)| DataSize(3) | TS(3+1)   | StreamID(3) | Data(N) | Size(4) |
//! +--------+-------------+-----------+-------------+---------+---------+
//! ```
//!
//! Video Data:
//! ```text
//! +----------+----------+
//! | FrameType| CodecID  | CodecData...
//! | (4 bits) | (4 bits) |
//! +----------+----------+
//! ```
//!
//! Audio Data:
//! ```text
//! +----------+----------+----------+----------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AudioData...
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  |
//! +----------+----------+----------+----------+
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// FLV file header: signature, version 1, no stream flags, data offset 9,
/// followed by the first (zero) previous-tag-size.
pub const FLV_HEADER: [u8; 13] = [
    b'F', b'L', b'V', // signature
    0x01, // version
    0x00, // flags
    0x00, 0x00, 0x00, 0x09, // data offset
    0x00, 0x00, 0x00, 0x00, // previous tag size 0
];

/// Size of the tag header that precedes every payload
pub const TAG_HEADER_SIZE: usize = 11;

/// FLV tag type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlvTagType {
    Audio,
    Video,
}

impl FlvTagType {
    /// The 5-bit TagType code
    pub fn code(&self) -> u8 {
        match self {
            FlvTagType::Audio => 8,
            FlvTagType::Video => 9,
        }
    }
}

/// Video frame type (upper 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// Keyframe (for AVC, a seekable frame)
    Keyframe = 1,
    /// Inter frame (for AVC, a non-seekable frame)
    InterFrame = 2,
}

/// Video codec ID (lower 4 bits of first byte)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// AVC (H.264)
    Avc = 7,
}

/// Sound format (upper 4 bits of the audio tag header)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// AAC
    Aac = 10,
}

/// Audio sample rate as carried in the FLV audio tag header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSampleRate {
    Rate5512 = 0,
    Rate11025 = 1,
    Rate22050 = 2,
    Rate44100 = 3,
}

impl AudioSampleRate {
    /// Map a configured track rate; only the three rates FLV can name below
    /// 44.1 kHz are distinguished, everything else is announced as 44100.
    pub fn from_hz(hz: u32) -> Self {
        match hz {
            22050 => AudioSampleRate::Rate22050,
            11025 => AudioSampleRate::Rate11025,
            _ => AudioSampleRate::Rate44100,
        }
    }

    pub fn to_hz(&self) -> u32 {
        match self {
            AudioSampleRate::Rate5512 => 5512,
            AudioSampleRate::Rate11025 => 11025,
            AudioSampleRate::Rate22050 => 22050,
            AudioSampleRate::Rate44100 => 44100,
        }
    }
}

/// Sample size of the decoded audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundSize {
    Bits8 = 0,
    Bits16 = 1,
}

/// Mono or stereo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundType {
    Mono = 0,
    Stereo = 1,
}

/// Build the first byte of an audio tag body.
pub fn audio_tag_header(
    format: AudioFormat,
    rate: AudioSampleRate,
    size: SoundSize,
    sound_type: SoundType,
) -> u8 {
    (sound_type as u8 & 0x01)
        | ((size as u8) << 1 & 0x02)
        | ((rate as u8) << 2 & 0x0C)
        | ((format as u8) << 4 & 0xF0)
}

/// Build the 11-byte tag header.
///
/// The first word packs the tag type into the high byte above the 24-bit
/// data size. The timestamp is stored as its low 24 bits followed by the
/// extension byte carrying bits 24..32.
pub fn encode_tag_header(tag_type: FlvTagType, data_size: u32, timestamp: u32) -> [u8; 11] {
    let tag_size = (data_size & 0x00FF_FFFF) | ((tag_type.code() as u32 & 0x1F) << 24);
    let time = ((timestamp << 8) & 0xFFFF_FF00) | ((timestamp >> 24) & 0x0000_00FF);

    let mut header = [0u8; TAG_HEADER_SIZE];
    header[0..4].copy_from_slice(&tag_size.to_be_bytes());
    header[4..8].copy_from_slice(&time.to_be_bytes());
    // stream id stays zero
    header
}

/// Trailer written after each tag.
///
/// This is the tag's own size (payload + 11), appended after the tag rather
/// than the previous-tag-size a file reader would expect in that slot. The
/// ingest server consumes it in this form.
pub fn tag_trailer(data_size: u32) -> u32 {
    data_size + TAG_HEADER_SIZE as u32
}

/// A tag ready for serialization
#[derive(Debug, Clone)]
pub struct FlvTag {
    /// Tag type
    pub tag_type: FlvTagType,
    /// Timestamp in milliseconds (the frame's dts)
    pub timestamp: u32,
    /// Tag body (including codec headers)
    pub data: Bytes,
}

impl FlvTag {
    /// Total bytes this tag occupies on the wire
    pub fn encoded_len(&self) -> usize {
        TAG_HEADER_SIZE + self.data.len() + 4
    }

    /// Serialize header, body and trailer into `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        let size = self.data.len() as u32;
        buf.reserve(self.encoded_len());
        buf.put_slice(&encode_tag_header(self.tag_type, size, self.timestamp));
        buf.put_slice(&self.data);
        buf.put_u32(tag_trailer(size));
    }

    /// Serialize into a fresh buffer.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flv_header_layout() {
        assert_eq!(&FLV_HEADER[0..3], b"FLV");
        assert_eq!(FLV_HEADER[3], 1);
        assert_eq!(FLV_HEADER[4], 0);
        assert_eq!(u32::from_be_bytes([FLV_HEADER[5], FLV_HEADER[6], FLV_HEADER[7], FLV_HEADER[8]]), 9);
        assert_eq!(&FLV_HEADER[9..13], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_tag_type_codes() {
        assert_eq!(FlvTagType::Audio.code(), 8);
        assert_eq!(FlvTagType::Video.code(), 9);
    }

    #[test]
    fn test_video_tag_header_reference() {
        // 12345 = 0x003039
        let header = encode_tag_header(FlvTagType::Video, 100, 12345);
        assert_eq!(
            header,
            [0x09, 0x00, 0x00, 0x64, 0x00, 0x30, 0x39, 0x00, 0x00, 0x00, 0x00]
        );
        assert_eq!(tag_trailer(100), 111);
    }

    #[test]
    fn test_timestamp_extension_byte() {
        // bits 24..32 move into the extension byte
        let header = encode_tag_header(FlvTagType::Audio, 2, 0x0112_3456);
        assert_eq!(&header[4..8], &[0x12, 0x34, 0x56, 0x01]);
    }

    #[test]
    fn test_data_size_truncated_to_24_bits() {
        let header = encode_tag_header(FlvTagType::Video, 0x0123_4567, 0);
        assert_eq!(&header[0..4], &[0x09, 0x23, 0x45, 0x67]);
    }

    #[test]
    fn test_encode_full_tag() {
        let tag = FlvTag {
            tag_type: FlvTagType::Audio,
            timestamp: 1000,
            data: Bytes::from_static(&[0xAF, 0x01, 0x21, 0x10]),
        };
        let bytes = tag.encode();

        assert_eq!(bytes.len(), tag.encoded_len());
        assert_eq!(bytes.len(), 11 + 4 + 4);
        assert_eq!(bytes[0], 8);
        assert_eq!(&bytes[1..4], &[0x00, 0x00, 0x04]);
        // 1000 = 0x0003E8
        assert_eq!(&bytes[4..8], &[0x00, 0x03, 0xE8, 0x00]);
        assert_eq!(&bytes[11..15], &[0xAF, 0x01, 0x21, 0x10]);
        assert_eq!(&bytes[15..19], &15u32.to_be_bytes());
    }

    #[test]
    fn test_audio_tag_header_byte() {
        let b = audio_tag_header(
            AudioFormat::Aac,
            AudioSampleRate::Rate44100,
            SoundSize::Bits16,
            SoundType::Stereo,
        );
        assert_eq!(b, 0xAF);

        let b = audio_tag_header(
            AudioFormat::Aac,
            AudioSampleRate::Rate22050,
            SoundSize::Bits16,
            SoundType::Mono,
        );
        assert_eq!(b, 0xAA);
    }

    #[test]
    fn test_sample_rate_from_hz() {
        assert_eq!(AudioSampleRate::from_hz(44100), AudioSampleRate::Rate44100);
        assert_eq!(AudioSampleRate::from_hz(22050), AudioSampleRate::Rate22050);
        assert_eq!(AudioSampleRate::from_hz(11025), AudioSampleRate::Rate11025);
        assert_eq!(AudioSampleRate::from_hz(48000), AudioSampleRate::Rate44100);
        assert_eq!(AudioSampleRate::Rate5512.to_hz(), 5512);
    }
}
