//! Push session
//!
//! Everything the worker owns: the connection, the reorder cache, the
//! cached sequence headers and the counters. Frames are handled one at a
//! time in submission order.
//!
//! The connection is opened lazily on the first media keyframe, since a
//! decoder joining anywhere else would only see garbage. Any transport
//! failure tears the connection down and drops what was pending; the next
//! keyframe brings it back, primed with the cached sequence headers.

use tokio::sync::mpsc;

use super::connection::Connection;
use super::transport::Transport;
use crate::error::Error;
use crate::media::cache::{ReorderCache, SequenceHeaders};
use crate::media::frame::LogicalFrame;
use crate::stats::PushStats;

/// Connection events reported by a push session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// Connected and sequence headers replayed
    Connected,

    /// Connect attempt failed; retried on the next keyframe
    ConnectFailed(String),

    /// Connection torn down after a write failure
    Disconnected(String),
}

/// Worker-side push state
#[derive(Debug)]
pub struct PushSession {
    connection: Connection,
    cache: ReorderCache,
    headers: SequenceHeaders,
    stats: PushStats,
    event_tx: Option<mpsc::Sender<PushEvent>>,
}

impl PushSession {
    pub fn new(endpoint: impl Into<String>, transport: Box<dyn Transport>, max_queued_video: usize) -> Self {
        Self {
            connection: Connection::new(endpoint, transport),
            cache: ReorderCache::new(max_queued_video),
            headers: SequenceHeaders::new(),
            stats: PushStats::new(),
            event_tx: None,
        }
    }

    /// Report connection events on `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<PushEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn stats(&self) -> &PushStats {
        &self.stats
    }

    pub fn headers(&self) -> &SequenceHeaders {
        &self.headers
    }

    /// Frames waiting in the reorder cache
    pub fn pending(&self) -> usize {
        self.cache.len()
    }

    /// Handle one packaged frame.
    pub async fn handle(&mut self, frame: LogicalFrame) {
        if frame.is_keyframe() && !self.connection.is_connected() {
            self.connect().await;
        }

        self.headers.remember(&frame);

        if !self.connection.is_connected() {
            // headers are kept above and replayed on connect
            if !frame.is_header {
                self.stats.dropped_frames += 1;
                tracing::trace!(dts = frame.dts, video = frame.is_video(), "No connection, frame dropped");
            }
            return;
        }

        self.cache.push(frame);
        self.stats.frames_queued += 1;

        if !self.cache.needs_flush() {
            return;
        }

        let ready = self.cache.drain_ready();
        let total = ready.len();
        for (i, frame) in ready.iter().enumerate() {
            match self.connection.send(frame).await {
                Ok(bytes) => {
                    self.stats
                        .record_sent(frame.is_video(), frame.is_keyframe(), frame.dts, bytes);
                }
                Err(e) => {
                    self.stats.dropped_frames += (total - i) as u64;
                    self.teardown(e).await;
                    return;
                }
            }
        }

        if let Err(e) = self.connection.flush().await {
            self.teardown(e).await;
        }
    }

    /// Close the connection. Pending frames are not sent.
    pub async fn close(&mut self) {
        if !self.cache.is_empty() {
            tracing::debug!(pending = self.cache.len(), "Closing with unsent frames");
        }
        self.cache.clear();
        self.connection.disconnect().await;
    }

    pub fn into_stats(self) -> PushStats {
        self.stats
    }

    async fn connect(&mut self) {
        match self.connection.connect(&self.headers).await {
            Ok(report) => {
                self.stats.connects += 1;
                self.stats.bytes_sent += report.header_bytes as u64;
                for (header, bytes) in self.headers.replay().zip(report.replayed) {
                    self.stats.record_sent(header.is_video(), false, header.dts, bytes);
                }
                self.emit(PushEvent::Connected);
            }
            Err(e) => {
                tracing::warn!(endpoint = %self.connection.endpoint(), error = %e, "Connect failed");
                self.connection.disconnect().await;
                self.emit(PushEvent::ConnectFailed(e.to_string()));
            }
        }
    }

    async fn teardown(&mut self, error: Error) {
        tracing::error!(
            error = %error,
            pending = self.cache.len(),
            "Write failed, dropping connection until next keyframe"
        );

        self.stats.dropped_frames += self.cache.len() as u64;
        self.stats.disconnects += 1;
        self.cache.clear();
        self.connection.disconnect().await;
        self.emit(PushEvent::Disconnected(error.to_string()));
    }

    fn emit(&self, event: PushEvent) {
        if let Some(tx) = &self.event_tx {
            // a slow listener must not stall the worker
            let _ = tx.try_send(event);
        }
    }
}
