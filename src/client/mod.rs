//! HTTP-FLV push client
//!
//! Provides:
//! - The encoder-facing pusher and its worker
//! - Connection handling with keyframe-triggered reconnects
//! - The chunked HTTP transport

pub mod config;
pub mod connection;
pub mod pusher;
pub mod session;
pub mod transport;

pub use config::PusherConfig;
pub use connection::{ConnectReport, Connection, ConnectionState};
pub use pusher::FlvPusher;
pub use session::{PushEvent, PushSession};
pub use transport::{ChunkedWriter, HttpFlvTransport, Transport};
