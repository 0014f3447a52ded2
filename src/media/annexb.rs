//! Annex-B demuxing
//!
//! Encoders emit H.264 as a byte stream where each NAL unit is preceded by a
//! start code: two or more zero bytes followed by `0x01`.
//!
//! ```text
//! 00 00 00 01 | SPS | 00 00 00 01 | PPS | 00 00 01 | IDR slice ...
//! ```
//!
//! The demuxer walks one sample buffer and yields the units between start
//! codes without copying them.

use bytes::Bytes;

use super::h264::NaluType;
use crate::error::MediaError;

/// One NAL unit, start code stripped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaluUnit {
    /// The 5-bit `nal_unit_type`
    pub nal_type: u8,
    /// Unit bytes beginning with the NAL header byte
    pub data: Bytes,
}

impl NaluUnit {
    pub fn new(data: Bytes) -> Self {
        let nal_type = data.first().map(|b| b & 0x1F).unwrap_or(0);
        Self { nal_type, data }
    }

    /// Known NAL type, if any
    pub fn kind(&self) -> Option<NaluType> {
        NaluType::from_byte(self.nal_type)
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Length of the start code beginning at `pos`, if there is one.
///
/// Accepts any run of at least two zero bytes closed by `0x01`, as long as
/// at least one byte follows it.
pub fn start_code_len(data: &[u8], pos: usize) -> Option<usize> {
    let mut i = pos;
    while i + 3 < data.len() {
        if data[i] != 0x00 || data[i + 1] != 0x00 {
            return None;
        }
        if data[i + 2] == 0x01 {
            return Some(i + 3 - pos);
        }
        i += 1;
    }
    None
}

/// Cursor over the NAL units of one sample
///
/// The sequence is finite and cannot be restarted; after a malformed unit it
/// yields nothing more.
#[derive(Debug)]
pub struct AnnexBDemuxer {
    data: Bytes,
    pos: usize,
}

impl AnnexBDemuxer {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset into the sample
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Demux the next unit.
    ///
    /// Returns `Ok(None)` at the end of the sample and
    /// [`MediaError::MalformedStream`] when the cursor does not sit on a
    /// start code.
    pub fn next_nalu(&mut self) -> Result<Option<NaluUnit>, MediaError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let Some(code_len) = start_code_len(&self.data, self.pos) else {
            let err = MediaError::MalformedStream {
                size: self.data.len(),
                position: self.pos,
            };
            tracing::debug!(
                position = self.pos,
                bytes = %super::hex_dump(&self.data[self.pos..], 16),
                "annexb start code not found"
            );
            self.pos = self.data.len();
            return Err(err);
        };

        let start = self.pos + code_len;
        let mut end = start;
        while end < self.data.len() {
            if start_code_len(&self.data, end).is_some() {
                break;
            }
            end += 1;
        }

        self.pos = end;
        Ok(Some(NaluUnit::new(self.data.slice(start..end))))
    }
}

impl Iterator for AnnexBDemuxer {
    type Item = Result<NaluUnit, MediaError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_nalu().transpose()
    }
}

#[cfg(test)]
mod tests {
    use bytes::{BufMut, BytesMut};

    use super::*;

    fn annexb(units: &[&[u8]], long_codes: bool) -> Bytes {
        let mut buf = BytesMut::new();
        for unit in units {
            if long_codes {
                buf.put_slice(&[0, 0, 0, 1]);
            } else {
                buf.put_slice(&[0, 0, 1]);
            }
            buf.put_slice(unit);
        }
        buf.freeze()
    }

    #[test]
    fn test_start_code_variants() {
        assert_eq!(start_code_len(&[0, 0, 1, 0x65], 0), Some(3));
        assert_eq!(start_code_len(&[0, 0, 0, 1, 0x65], 0), Some(4));
        assert_eq!(start_code_len(&[0, 0, 0, 0, 0, 1, 0x65], 0), Some(6));
        assert_eq!(start_code_len(&[0, 1, 0x65, 0x00], 0), None);
        assert_eq!(start_code_len(&[0x65, 0, 0, 1, 0x41], 0), None);
        // no unit byte after the code
        assert_eq!(start_code_len(&[0, 0, 1], 0), None);
    }

    #[test]
    fn test_demux_multiple_units() {
        let sps: &[u8] = &[0x67, 0x64, 0x00, 0x1F, 0xAC];
        let pps: &[u8] = &[0x68, 0xEE, 0x3C, 0x80];
        let idr: &[u8] = &[0x65, 0x88, 0x84, 0x00];
        let mut demuxer = AnnexBDemuxer::new(annexb(&[sps, pps, idr], true));

        let unit = demuxer.next_nalu().unwrap().unwrap();
        assert_eq!(unit.kind(), Some(NaluType::Sps));
        assert_eq!(&unit.data[..], sps);

        let unit = demuxer.next_nalu().unwrap().unwrap();
        assert_eq!(unit.kind(), Some(NaluType::Pps));
        assert_eq!(&unit.data[..], pps);

        let unit = demuxer.next_nalu().unwrap().unwrap();
        assert_eq!(unit.nal_type, 5);
        assert_eq!(unit.size(), 4);
        // trailing zero stays part of the unit
        assert_eq!(&unit.data[..], idr);

        assert_eq!(demuxer.next_nalu().unwrap(), None);
    }

    #[test]
    fn test_demux_missing_start_code() {
        let data = Bytes::from_static(&[0x65, 0x88, 0x84, 0x00, 0x10]);
        let mut demuxer = AnnexBDemuxer::new(data);

        let err = demuxer.next_nalu().unwrap_err();
        assert_eq!(
            err,
            MediaError::MalformedStream {
                size: 5,
                position: 0
            }
        );
        // fused after the error
        assert!(demuxer.next().is_none());
    }

    #[test]
    fn test_framing_roundtrip_with_length_prefix() {
        let units: Vec<&[u8]> = vec![
            &[0x09, 0xF0],
            &[0x67, 0x42, 0x00, 0x0A, 0x00, 0x00, 0x03],
            &[0x68, 0xCE],
            &[0x06, 0x05, 0x01, 0xFF],
            &[0x65, 0x00, 0x02, 0x00, 0x00, 0x02, 0x11],
        ];

        for long_codes in [false, true] {
            let demuxed: Vec<NaluUnit> = AnnexBDemuxer::new(annexb(&units, long_codes))
                .collect::<Result<_, _>>()
                .unwrap();
            assert_eq!(demuxed.len(), units.len());

            let mut prefixed = BytesMut::new();
            for unit in &demuxed {
                prefixed.put_u32(unit.size() as u32);
                prefixed.put_slice(&unit.data);
            }

            let mut expected = BytesMut::new();
            for unit in &units {
                expected.put_u32(unit.len() as u32);
                expected.put_slice(unit);
            }
            assert_eq!(prefixed, expected);
        }
    }

    #[test]
    fn test_empty_sample() {
        let mut demuxer = AnnexBDemuxer::new(Bytes::new());
        assert_eq!(demuxer.next_nalu().unwrap(), None);
        assert_eq!(demuxer.position(), 0);
    }
}
