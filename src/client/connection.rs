//! Push connection
//!
//! Wraps a [`Transport`] with FLV framing: every new connection starts with
//! the FLV file header followed by the cached sequence headers, then media
//! tags as the reorder cache releases them.

use bytes::BytesMut;

use super::transport::Transport;
use crate::error::Result;
use crate::media::cache::SequenceHeaders;
use crate::media::flv::FLV_HEADER;
use crate::media::frame::LogicalFrame;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Bytes written while priming a new connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectReport {
    /// FLV file header
    pub header_bytes: usize,
    /// Encoded size of each replayed sequence header, in replay order
    pub replayed: Vec<usize>,
}

impl ConnectReport {
    pub fn total(&self) -> usize {
        self.header_bytes + self.replayed.iter().sum::<usize>()
    }
}

/// FLV stream over a transport
pub struct Connection {
    endpoint: String,
    transport: Box<dyn Transport>,
    state: ConnectionState,
    /// Scratch buffer reused for tag encoding
    scratch: BytesMut,
}

impl Connection {
    pub fn new(endpoint: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            endpoint: endpoint.into(),
            transport,
            state: ConnectionState::Disconnected,
            scratch: BytesMut::with_capacity(4096),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Open the transport and prime it with the FLV header and `headers`.
    ///
    /// On error the connection stays disconnected and the caller is expected
    /// to call [`disconnect`](Self::disconnect).
    pub async fn connect(&mut self, headers: &SequenceHeaders) -> Result<ConnectReport> {
        self.transport.open(&self.endpoint).await?;
        self.transport.write(&FLV_HEADER).await?;

        let mut report = ConnectReport {
            header_bytes: FLV_HEADER.len(),
            replayed: Vec::with_capacity(2),
        };
        for header in headers.replay() {
            let bytes = self.write_frame(header).await?;
            report.replayed.push(bytes);
        }
        self.transport.flush().await?;

        self.state = ConnectionState::Connected;
        tracing::info!(
            endpoint = %self.endpoint,
            video_header = headers.video().is_some(),
            audio_header = headers.audio().is_some(),
            bytes = report.total(),
            "Connected, sequence headers replayed"
        );
        Ok(report)
    }

    /// Encode `frame` as a tag and queue it. Returns the bytes written.
    pub async fn send(&mut self, frame: &LogicalFrame) -> Result<usize> {
        self.write_frame(frame).await
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.transport.flush().await
    }

    /// Close the transport, dropping unflushed bytes.
    pub async fn disconnect(&mut self) {
        self.transport.close().await;
        if self.state == ConnectionState::Connected {
            tracing::info!(endpoint = %self.endpoint, "Disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn write_frame(&mut self, frame: &LogicalFrame) -> Result<usize> {
        self.scratch.clear();
        frame.to_flv_tag().encode_into(&mut self.scratch);
        self.transport.write(&self.scratch).await?;
        Ok(self.scratch.len())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .finish()
    }
}
