//! ADTS demuxing
//!
//! ADTS frames a raw AAC payload with a 7-byte header (9 with CRC):
//!
//! ```text
//! syncword(12) ID(1) layer(2) protection_absent(1)
//! profile(2) sampling_frequency_index(4) private(1) channel_configuration(3)
//! original(1) home(1) copyright_id(1) copyright_start(1) frame_length(13)
//! buffer_fullness(11) number_of_raw_data_blocks(2)
//! [crc(16)]
//! ```
//!
//! Running short of bytes is not an error here: the demuxer reports "no
//! frame" and the caller decides whether to wait or drop.

use bytes::Bytes;

use super::aac::{AacObjectType, AdtsProfile};
use super::flv::{AudioSampleRate, SoundSize, SoundType};

const ADTS_HEADER_SIZE: usize = 7;
const ADTS_CRC_SIZE: usize = 2;

/// Whether `data` begins with an ADTS sync word
pub fn starts_with_adts(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] & 0xF0 == 0xF0
}

/// Fields of one ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacFrameHeader {
    pub protection_absent: bool,
    /// Object type mapped from the ADTS profile
    pub object_type: AacObjectType,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
    /// Header plus payload length
    pub frame_length: u16,
}

impl AacFrameHeader {
    /// Bytes taken by the header, CRC included
    pub fn header_size(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_SIZE
        } else {
            ADTS_HEADER_SIZE + ADTS_CRC_SIZE
        }
    }

    /// FLV sound rate for this frame's sampling frequency
    pub fn sound_rate(&self) -> AudioSampleRate {
        match self.sampling_frequency_index {
            0x0B..=0x0C => AudioSampleRate::Rate5512,
            0x08..=0x0A => AudioSampleRate::Rate11025,
            0x05..=0x07 => AudioSampleRate::Rate22050,
            0x00..=0x04 => AudioSampleRate::Rate44100,
            other => {
                tracing::warn!(index = other, "adts sample rate not representable in flv");
                AudioSampleRate::Rate44100
            }
        }
    }

    pub fn sound_type(&self) -> SoundType {
        if self.channel_configuration <= 1 {
            SoundType::Mono
        } else {
            SoundType::Stereo
        }
    }

    pub fn sound_size(&self) -> SoundSize {
        SoundSize::Bits16
    }
}

/// One demuxed ADTS frame
#[derive(Debug, Clone)]
pub struct AdtsFrame {
    pub header: AacFrameHeader,
    /// Raw AAC payload, header excluded
    pub raw: Bytes,
}

/// Cursor over the ADTS frames of one sample
#[derive(Debug)]
pub struct AdtsDemuxer {
    data: Bytes,
    pos: usize,
}

impl AdtsDemuxer {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Demux the frame at the cursor.
    ///
    /// `None` means no complete frame is available: too few bytes, no sync
    /// word, or a payload running past the end of the sample. The cursor
    /// only advances past frames that were returned.
    pub fn next_frame(&mut self) -> Option<AdtsFrame> {
        let buf = &self.data[self.pos..];
        if buf.len() < ADTS_HEADER_SIZE || !starts_with_adts(buf) {
            return None;
        }

        let pav = buf[1] & 0x0F;
        let id = (pav >> 3) & 0x01;
        let protection_absent = pav & 0x01 == 1;
        if id != 0x01 {
            // MPEG-4 signalled; the payload is treated as AAC all the same
            tracing::trace!("adts id is 0 (mpeg-4), treating as aac");
        }

        let sfiv = u16::from_be_bytes([buf[2], buf[3]]);
        let profile = ((sfiv >> 14) & 0x03) as u8;
        let sampling_frequency_index = ((sfiv >> 10) & 0x0F) as u8;
        let channel_configuration = ((sfiv >> 6) & 0x07) as u8;

        let abfv = u16::from_be_bytes([buf[4], buf[5]]);
        let frame_length = ((sfiv << 11) & 0x1800) | ((abfv >> 5) & 0x07FF);

        let header = AacFrameHeader {
            protection_absent,
            object_type: AdtsProfile::from_bits(profile).object_type(),
            sampling_frequency_index,
            channel_configuration,
            frame_length,
        };

        let header_size = header.header_size();
        if buf.len() < header_size {
            return None;
        }

        let raw_size = (frame_length as usize).checked_sub(header_size)?;
        if buf.len() - header_size < raw_size {
            return None;
        }

        let start = self.pos + header_size;
        let raw = self.data.slice(start..start + raw_size);
        self.pos = start + raw_size;

        Some(AdtsFrame { header, raw })
    }
}

impl Iterator for AdtsDemuxer {
    type Item = AdtsFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_frame()
    }
}

/// Build an ADTS header for a payload of `raw_len` bytes.
#[cfg(test)]
pub(crate) fn adts_header(
    profile: u8,
    sampling_frequency_index: u8,
    channels: u8,
    raw_len: usize,
    with_crc: bool,
) -> Vec<u8> {
    let header_len = if with_crc { 9 } else { 7 };
    let frame_len = raw_len + header_len;

    let mut header = vec![0u8; header_len];
    header[0] = 0xFF;
    header[1] = if with_crc { 0xF0 } else { 0xF1 };
    header[2] = ((profile & 0x03) << 6)
        | ((sampling_frequency_index & 0x0F) << 2)
        | ((channels >> 2) & 0x01);
    header[3] = ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8;
    header[4] = ((frame_len >> 3) & 0xFF) as u8;
    header[5] = (((frame_len & 0x07) << 5) | 0x1F) as u8;
    header[6] = 0xFC;
    header
}
