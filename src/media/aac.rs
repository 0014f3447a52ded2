//! AAC packaging
//!
//! FLV carries AAC without ADTS headers.
//!
//! AAC Audio Packet Structure:
//! ```text
//! +----------+----------+----------+----------+---------+
//! |SoundFormat|SoundRate|SoundSize |SoundType | AACType | AACData
//! | (4 bits)  | (2 bits)| (1 bit)  | (1 bit)  | (1 byte)|
//! +----------+----------+----------+----------+---------+
//! ```
//!
//! AACPacketType:
//! - 0: AAC sequence header (AudioSpecificConfig)
//! - 1: AAC raw frame data

use bytes::{BufMut, Bytes, BytesMut};

use super::adts::{starts_with_adts, AdtsDemuxer};
use super::flv::{audio_tag_header, AudioFormat, AudioSampleRate, SoundSize, SoundType};
use super::frame::LogicalFrame;

/// AAC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// Sequence header (AudioSpecificConfig)
    SequenceHeader = 0,
    /// Raw AAC frame data
    Raw = 1,
}

/// MPEG-4 audio object type, as used by AudioSpecificConfig
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacObjectType {
    Reserved = 0,
    /// AAC Main
    AacMain = 1,
    /// AAC LC (Low Complexity) - most common
    AacLc = 2,
    /// AAC SSR (Scalable Sample Rate)
    AacSsr = 3,
}

/// The 2-bit profile field of an ADTS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdtsProfile {
    Main = 0,
    Lc = 1,
    Ssr = 2,
    Reserved = 3,
}

impl AdtsProfile {
    pub fn from_bits(b: u8) -> Self {
        match b & 0x03 {
            0 => AdtsProfile::Main,
            1 => AdtsProfile::Lc,
            2 => AdtsProfile::Ssr,
            _ => AdtsProfile::Reserved,
        }
    }

    pub fn object_type(&self) -> AacObjectType {
        match self {
            AdtsProfile::Main => AacObjectType::AacMain,
            AdtsProfile::Lc => AacObjectType::AacLc,
            AdtsProfile::Ssr => AacObjectType::AacSsr,
            AdtsProfile::Reserved => AacObjectType::Reserved,
        }
    }
}

/// Sampling frequency index announced for a configured track rate.
///
/// Only the rates FLV can name are distinguished; anything else is
/// announced as 44100 Hz.
pub fn sampling_frequency_index(sample_rate: u32) -> u8 {
    match sample_rate {
        22050 => 0x07,
        11025 => 0x0A,
        _ => 0x04,
    }
}

/// Two-byte AudioSpecificConfig
///
/// ```text
/// audioObjectType(5) samplingFrequencyIndex(4) channelConfiguration(4)
/// frameLengthFlag(1)=0 dependsOnCoreCoder(1)=0 extensionFlag(1)=0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    /// Audio object type (5 bits)
    pub audio_object_type: u8,
    /// Sampling frequency index
    pub sampling_frequency_index: u8,
    /// Channel configuration (1=mono, 2=stereo)
    pub channel_configuration: u8,
}

impl AudioSpecificConfig {
    pub fn new(audio_object_type: u8, sampling_frequency_index: u8, channel_configuration: u8) -> Self {
        Self {
            audio_object_type,
            sampling_frequency_index,
            channel_configuration,
        }
    }

    pub fn to_bytes(&self) -> [u8; 2] {
        let b0 = ((self.audio_object_type << 3) & 0xF8) | ((self.sampling_frequency_index >> 1) & 0x07);
        let b1 = ((self.sampling_frequency_index << 7) & 0x80) | ((self.channel_configuration << 3) & 0x78);
        [b0, b1]
    }
}

/// Turns encoder AAC output into FLV audio frames
///
/// The first sample of a session announces the stream. If it is ADTS framed,
/// the object type comes from its header and its payload is the first raw
/// frame. Otherwise it is the encoder's codec-specific data, read for the
/// object type and consumed. Every later sample becomes one raw frame.
#[derive(Debug)]
pub struct AacPackager {
    sample_rate: u32,
    channels: u8,
    config: Option<AudioSpecificConfig>,
}

impl AacPackager {
    pub fn new(sample_rate: u32, channels: u8) -> Self {
        Self {
            sample_rate,
            channels,
            config: None,
        }
    }

    /// The sequence header config, once built
    pub fn config(&self) -> Option<&AudioSpecificConfig> {
        self.config.as_ref()
    }

    fn sound_type(&self) -> SoundType {
        if self.channels == 2 {
            SoundType::Stereo
        } else {
            SoundType::Mono
        }
    }

    fn tag_header(&self) -> u8 {
        audio_tag_header(
            AudioFormat::Aac,
            AudioSampleRate::from_hz(self.sample_rate),
            SoundSize::Bits16,
            self.sound_type(),
        )
    }

    /// Package one encoder sample.
    ///
    /// Yields the sequence header first when none was built yet, then the raw
    /// frame. An incomplete ADTS sample yields nothing and leaves the state
    /// untouched.
    pub fn write_sample(&mut self, data: Bytes, pts: u32) -> Vec<LogicalFrame> {
        let dts = pts;

        let adts = if starts_with_adts(&data) {
            let Some(frame) = AdtsDemuxer::new(data.clone()).next_frame() else {
                tracing::debug!(dts, size = data.len(), "incomplete adts frame, no audio produced");
                return Vec::new();
            };
            Some(frame)
        } else {
            None
        };

        let mut frames = Vec::with_capacity(2);
        if self.config.is_none() {
            let audio_object_type = match (&adts, data.first()) {
                (Some(frame), _) => frame.header.object_type as u8,
                (None, Some(b)) => (b & 0xF8) >> 3,
                (None, None) => AacObjectType::AacLc as u8,
            };
            frames.push(self.write_sequence_header(audio_object_type, dts));

            // codec-specific data carries no audio
            if adts.is_none() {
                return frames;
            }
        }

        let (header, raw) = match adts {
            Some(frame) => {
                let header = audio_tag_header(
                    AudioFormat::Aac,
                    frame.header.sound_rate(),
                    frame.header.sound_size(),
                    frame.header.sound_type(),
                );
                (header, frame.raw)
            }
            None => (self.tag_header(), data),
        };

        tracing::trace!(dts, size = raw.len(), "aac raw frame");

        let mut body = BytesMut::with_capacity(2 + raw.len());
        body.put_u8(header);
        body.put_u8(AacPacketType::Raw as u8);
        body.put_slice(&raw);
        frames.push(LogicalFrame::audio(dts, body.freeze(), false));
        frames
    }

    fn write_sequence_header(&mut self, audio_object_type: u8, dts: u32) -> LogicalFrame {
        let channel_configuration = if self.sound_type() == SoundType::Stereo { 2 } else { 1 };
        let config = AudioSpecificConfig::new(
            audio_object_type,
            sampling_frequency_index(self.sample_rate),
            channel_configuration,
        );
        self.config = Some(config);

        tracing::info!(
            object_type = audio_object_type,
            sample_rate = self.sample_rate,
            channels = self.channels,
            "aac sequence header ready"
        );

        let mut body = BytesMut::with_capacity(4);
        body.put_u8(self.tag_header());
        body.put_u8(AacPacketType::SequenceHeader as u8);
        body.put_slice(&config.to_bytes());
        LogicalFrame::audio(dts, body.freeze(), true)
    }
}
