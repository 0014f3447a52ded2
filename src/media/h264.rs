//! H.264/AVC packaging
//!
//! FLV carries H.264 in AVCC format (length-prefixed NAL units), so each
//! Annex-B access unit is repackaged before it becomes a tag.
//!
//! AVC Video Packet Structure:
//! ```text
//! +----------+----------+-----------------+
//! |FrameType | CodecID  | AVCPacketType   | CompositionTime | Data
//! | (4 bits) | (4 bits) | (1 byte)        | (3 bytes, SI24) |
//! +----------+----------+-----------------+
//! ```
//!
//! AVCPacketType:
//! - 0: AVC sequence header (AVCDecoderConfigurationRecord)
//! - 1: AVC NALU (one or more NALUs)
//!
//! AVCDecoderConfigurationRecord (sequence header) as written here:
//! ```text
//! configurationVersion=1 | AVCProfileIndication | profile_compatibility=0
//! | AVCLevelIndication | lengthSizeMinusOne=3
//! | numOfSPS=1 | spsLength (2) | spsNALUnit
//! | numOfPPS=1 | ppsLength (2) | ppsNALUnit
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::annexb::{AnnexBDemuxer, NaluUnit};
use super::flv::{VideoCodec, VideoFrameType};
use super::frame::LogicalFrame;
use crate::error::MediaError;

/// AVC packet type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// Sequence header (AVCDecoderConfigurationRecord)
    SequenceHeader = 0,
    /// NAL units
    Nalu = 1,
}

/// NAL unit type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaluType {
    /// Non-IDR slice
    Slice = 1,
    /// Slice data partition A
    SlicePartA = 2,
    /// Slice data partition B
    SlicePartB = 3,
    /// Slice data partition C
    SlicePartC = 4,
    /// IDR slice (keyframe)
    Idr = 5,
    /// Supplemental enhancement information
    Sei = 6,
    /// Sequence parameter set
    Sps = 7,
    /// Picture parameter set
    Pps = 8,
    /// Access unit delimiter
    Aud = 9,
    /// End of sequence
    EndSeq = 10,
    /// End of stream
    EndStream = 11,
    /// Filler data
    Filler = 12,
}

impl NaluType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x1F {
            1 => Some(NaluType::Slice),
            2 => Some(NaluType::SlicePartA),
            3 => Some(NaluType::SlicePartB),
            4 => Some(NaluType::SlicePartC),
            5 => Some(NaluType::Idr),
            6 => Some(NaluType::Sei),
            7 => Some(NaluType::Sps),
            8 => Some(NaluType::Pps),
            9 => Some(NaluType::Aud),
            10 => Some(NaluType::EndSeq),
            11 => Some(NaluType::EndStream),
            12 => Some(NaluType::Filler),
            _ => None,
        }
    }
}

/// Whether the unit is a non-empty SPS
pub fn is_sps(nalu: &NaluUnit) -> bool {
    !nalu.is_empty() && nalu.nal_type == NaluType::Sps as u8
}

/// Whether the unit is a non-empty PPS
pub fn is_pps(nalu: &NaluUnit) -> bool {
    !nalu.is_empty() && nalu.nal_type == NaluType::Pps as u8
}

/// Last SPS/PPS seen on the stream and whether a header for them went out
///
/// Lives for the whole session; reconnects re-announce the cached header
/// frame instead of resetting this.
#[derive(Debug, Default)]
pub struct ParameterSetState {
    sps: Bytes,
    pps: Bytes,
    sps_changed: bool,
    pps_changed: bool,
    sequence_header_sent: bool,
}

impl ParameterSetState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an SPS. Returns true if it differs from the stored one.
    ///
    /// An SPS too short to carry profile and level is ignored.
    pub fn update_sps(&mut self, sps: Bytes) -> bool {
        if sps.len() < 4 {
            tracing::warn!(size = sps.len(), "SPS too short, ignored");
            return false;
        }
        if self.sps == sps {
            return false;
        }
        self.sps = sps;
        self.sps_changed = true;
        true
    }

    /// Record a PPS. Returns true if it differs from the stored one.
    pub fn update_pps(&mut self, pps: Bytes) -> bool {
        if self.pps == pps {
            return false;
        }
        self.pps = pps;
        self.pps_changed = true;
        true
    }

    /// Both sets known, and either never announced or changed since.
    pub fn needs_sequence_header(&self) -> bool {
        if self.sps.is_empty() || self.pps.is_empty() {
            return false;
        }
        !self.sequence_header_sent || self.sps_changed || self.pps_changed
    }

    pub fn mark_sent(&mut self) {
        self.sps_changed = false;
        self.pps_changed = false;
        self.sequence_header_sent = true;
    }

    pub fn sequence_header_sent(&self) -> bool {
        self.sequence_header_sent
    }

    pub fn sps(&self) -> &Bytes {
        &self.sps
    }

    pub fn pps(&self) -> &Bytes {
        &self.pps
    }
}

/// Build the AVCDecoderConfigurationRecord as byte groups.
pub fn mux_sequence_header(sps: &[u8], pps: &[u8]) -> Result<Vec<Bytes>, MediaError> {
    if sps.len() < 4 {
        return Err(MediaError::InvalidSequenceHeader(sps.len()));
    }

    let profile_idc = sps[1];
    let level_idc = sps[3];
    let mut frames = Vec::with_capacity(5);

    frames.push(Bytes::copy_from_slice(&[
        0x01, // configurationVersion
        profile_idc,
        0x00, // profile_compatibility
        level_idc,
        0x03, // lengthSizeMinusOne, 4-byte NALU lengths
    ]));

    let mut sps_header = BytesMut::with_capacity(3);
    sps_header.put_u8(0x01); // numOfSequenceParameterSets
    sps_header.put_u16(sps.len() as u16);
    frames.push(sps_header.freeze());
    frames.push(Bytes::copy_from_slice(sps));

    let mut pps_header = BytesMut::with_capacity(3);
    pps_header.put_u8(0x01); // numOfPictureParameterSets
    pps_header.put_u16(pps.len() as u16);
    frames.push(pps_header.freeze());
    frames.push(Bytes::copy_from_slice(pps));

    Ok(frames)
}

/// The 4-byte big-endian length that precedes a NALU in AVCC framing.
pub fn mux_ibp_frame(nalu: &NaluUnit) -> Bytes {
    Bytes::copy_from_slice(&(nalu.size() as u32).to_be_bytes())
}

/// Assemble a video tag body from packaged byte groups.
pub fn mux_avc2flv(
    frames: &[Bytes],
    frame_type: VideoFrameType,
    packet_type: AvcPacketType,
    dts: u32,
    pts: u32,
) -> Bytes {
    let size = 5 + frames.iter().map(Bytes::len).sum::<usize>();
    let mut tag = BytesMut::with_capacity(size);

    tag.put_u8(((frame_type as u8) << 4) | VideoCodec::Avc as u8);
    tag.put_u8(packet_type as u8);

    // composition time, SI24
    let cts = pts.wrapping_sub(dts) as i32;
    tag.put_u8((cts >> 16) as u8);
    tag.put_u8((cts >> 8) as u8);
    tag.put_u8(cts as u8);

    for frame in frames {
        tag.put_slice(frame);
    }
    tag.freeze()
}

/// Turns Annex-B access units into AVC video frames
#[derive(Debug, Default)]
pub struct AvcPackager {
    state: ParameterSetState,
}

impl AvcPackager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ParameterSetState {
        &self.state
    }

    /// Package one access unit.
    ///
    /// Yields a sequence header first when the parameter sets require one,
    /// then the media frame. Media frames are withheld until a sequence
    /// header has gone out, since no decoder could parse them.
    pub fn write_sample(&mut self, data: Bytes, pts: u32) -> Result<Vec<LogicalFrame>, MediaError> {
        let dts = pts;
        let size = data.len();
        let mut ibps = Vec::new();
        let mut frame_type = VideoFrameType::InterFrame;

        for nalu in AnnexBDemuxer::new(data) {
            let nalu = nalu?;

            match nalu.kind() {
                Some(NaluType::Sps) | Some(NaluType::Pps) => {
                    tracing::debug!(
                        size,
                        pts,
                        nalu_size = nalu.size(),
                        nal_type = nalu.nal_type,
                        "annexb parameter set"
                    );
                }
                Some(NaluType::Idr) => frame_type = VideoFrameType::Keyframe,
                Some(NaluType::Aud) => continue,
                _ => {}
            }

            if is_sps(&nalu) {
                self.state.update_sps(nalu.data);
                continue;
            }
            if is_pps(&nalu) {
                self.state.update_pps(nalu.data);
                continue;
            }

            ibps.push(mux_ibp_frame(&nalu));
            ibps.push(nalu.data);
        }

        let mut frames = Vec::with_capacity(2);
        if let Some(header) = self.write_sps_pps(dts, pts)? {
            frames.push(header);
        }
        if let Some(frame) = self.write_ibp_frame(&ibps, frame_type, dts, pts) {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn write_sps_pps(&mut self, dts: u32, pts: u32) -> Result<Option<LogicalFrame>, MediaError> {
        // A new SPS may come with the old PPS, so this is checked per sample.
        if !self.state.needs_sequence_header() {
            return Ok(None);
        }

        let frames = mux_sequence_header(self.state.sps(), self.state.pps())?;
        let data = mux_avc2flv(
            &frames,
            VideoFrameType::Keyframe,
            AvcPacketType::SequenceHeader,
            dts,
            pts,
        );
        self.state.mark_sent();

        tracing::info!(
            sps = self.state.sps().len(),
            pps = self.state.pps().len(),
            dts,
            "h264 sequence header ready"
        );
        Ok(Some(LogicalFrame::video(dts, data, VideoFrameType::Keyframe, true)))
    }

    fn write_ibp_frame(
        &self,
        ibps: &[Bytes],
        frame_type: VideoFrameType,
        dts: u32,
        pts: u32,
    ) -> Option<LogicalFrame> {
        if !self.state.sequence_header_sent() {
            tracing::trace!(dts, "drop video frame before sequence header");
            return None;
        }
        if ibps.is_empty() {
            return None;
        }

        let data = mux_avc2flv(ibps, frame_type, AvcPacketType::Nalu, dts, pts);
        Some(LogicalFrame::video(dts, data, frame_type, false))
    }
}
