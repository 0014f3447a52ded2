//! HTTP-FLV push client
//!
//! Takes H.264 Annex-B access units and AAC (raw or ADTS) frames from an
//! encoder, remuxes them into FLV tags and streams them to an ingest server
//! as the body of a chunked HTTP POST.
//!
//! The pieces, bottom up:
//! - [`media`]: Annex-B/ADTS demuxing, AVC/AAC packaging, FLV tag encoding
//!   and the dts reorder cache
//! - [`client`]: the pusher, its worker session and the transport
//! - [`stats`]: counters for a push session

pub mod client;
pub mod error;
pub mod media;
pub mod stats;

pub use client::{FlvPusher, PushEvent, PusherConfig, Transport};
pub use error::{Error, Result};
pub use media::Track;
pub use stats::PushStats;
