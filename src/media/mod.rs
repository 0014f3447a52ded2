//! Media remuxing
//!
//! This module provides:
//! - Annex-B NAL unit demuxing and AVC packaging
//! - ADTS demuxing and AAC packaging
//! - FLV tag encoding
//! - The dts reorder cache that sits in front of the connection

pub mod aac;
pub mod adts;
pub mod annexb;
pub mod cache;
pub mod flv;
pub mod frame;
pub mod h264;

use std::fmt::Write;

pub use aac::{AacPackager, AudioSpecificConfig};
pub use adts::{AacFrameHeader, AdtsDemuxer};
pub use annexb::{AnnexBDemuxer, NaluUnit};
pub use cache::{ReorderCache, SequenceHeaders};
pub use flv::{FlvTag, FlvTagType, FLV_HEADER};
pub use frame::{EncodedSample, LogicalFrame, Track};
pub use h264::{AvcPackager, NaluType, ParameterSetState};

/// Render up to `max` bytes as hex, 16 per line, for diagnostics.
pub fn hex_dump(data: &[u8], max: usize) -> String {
    let mut out = String::new();
    for (line, chunk) in data[..data.len().min(max)].chunks(16).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:03}:", line * 16);
        for b in chunk {
            let _ = write!(out, " {:02x}", b);
        }
    }
    out
}
