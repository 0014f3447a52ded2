//! HTTP-FLV pusher
//!
//! High-level API the encoder talks to. Samples are packaged on the
//! caller's side and handed to a single worker task over an unbounded
//! channel; the worker owns the connection and does all I/O, so `submit`
//! never blocks and never fails.

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::media::aac::AacPackager;
use crate::media::frame::{EncodedSample, LogicalFrame, Track};
use crate::media::h264::AvcPackager;
use crate::stats::PushStats;

use super::config::PusherConfig;
use super::session::{PushEvent, PushSession};
use super::transport::{HttpFlvTransport, Transport};

/// HTTP-FLV stream pusher
///
/// # Example
/// ```no_run
/// use httpflv_push::client::{FlvPusher, PusherConfig};
/// use httpflv_push::media::Track;
///
/// # async fn example(access_unit: Vec<u8>, pts: u32) -> httpflv_push::error::Result<()> {
/// let config = PusherConfig::new("http://127.0.0.1:8936/live/livestream.flv")
///     .with_audio(44100, 2);
/// let (mut pusher, mut events) = FlvPusher::new(config);
///
/// tokio::spawn(async move {
///     while let Some(event) = events.recv().await {
///         println!("Event: {:?}", event);
///     }
/// });
///
/// pusher.start()?;
/// pusher.submit(Track::Video, access_unit, pts);
/// let stats = pusher.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct FlvPusher {
    config: PusherConfig,
    transport: Option<Box<dyn Transport>>,
    video: AvcPackager,
    audio: AacPackager,
    event_tx: mpsc::Sender<PushEvent>,
    frame_tx: Option<mpsc::UnboundedSender<LogicalFrame>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<PushStats>>,
}

impl FlvPusher {
    /// Create a pusher over HTTP.
    ///
    /// Returns the pusher and a receiver for connection events.
    pub fn new(config: PusherConfig) -> (Self, mpsc::Receiver<PushEvent>) {
        let transport = HttpFlvTransport::new(&config);
        Self::with_transport(config, Box::new(transport))
    }

    /// Create a pusher over a custom transport.
    pub fn with_transport(
        config: PusherConfig,
        transport: Box<dyn Transport>,
    ) -> (Self, mpsc::Receiver<PushEvent>) {
        let (event_tx, event_rx) = mpsc::channel(256);

        let pusher = Self {
            audio: AacPackager::new(config.audio_sample_rate, config.audio_channels),
            video: AvcPackager::new(),
            config,
            transport: Some(transport),
            event_tx,
            frame_tx: None,
            shutdown_tx: None,
            worker: None,
        };

        (pusher, event_rx)
    }

    pub fn config(&self) -> &PusherConfig {
        &self.config
    }

    /// Whether the worker is accepting frames
    pub fn is_running(&self) -> bool {
        self.frame_tx.is_some()
    }

    /// Spawn the worker on the current tokio runtime.
    ///
    /// The connection is not opened here; the first video keyframe does that.
    pub fn start(&mut self) -> Result<()> {
        self.config.validate()?;

        if self.worker.is_some() {
            return Err(Error::Config("pusher already started".into()));
        }
        let runtime = Handle::try_current()
            .map_err(|e| Error::Config(format!("no tokio runtime: {}", e)))?;
        let transport = self
            .transport
            .take()
            .ok_or_else(|| Error::Config("pusher cannot be restarted".into()))?;

        let session = PushSession::new(self.config.url.clone(), transport, self.config.max_queued_video)
            .with_events(self.event_tx.clone());

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.worker = Some(runtime.spawn(run_worker(session, frame_rx, shutdown_rx)));
        self.frame_tx = Some(frame_tx);
        self.shutdown_tx = Some(shutdown_tx);

        tracing::info!(url = %self.config.url, "Pusher started");
        Ok(())
    }

    /// Submit one encoder output buffer.
    ///
    /// Failures are logged, never returned: a bad sample is skipped and the
    /// stream carries on with the next one.
    pub fn submit(&mut self, track: Track, data: impl Into<Bytes>, pts: u32) {
        self.submit_sample(EncodedSample::new(track, data.into(), pts));
    }

    pub fn submit_sample(&mut self, sample: EncodedSample) {
        if sample.data.is_empty() {
            tracing::warn!(track = ?sample.track, pts = sample.pts, "Empty sample ignored");
            return;
        }

        // Packaging state only moves once a worker can take the result, so a
        // sequence header is never produced into the void.
        if self.frame_tx.is_none() {
            tracing::warn!(
                track = ?sample.track,
                pts = sample.pts,
                "Pusher not started, sample dropped"
            );
            return;
        }

        let pts = sample.pts;
        let frames = match sample.track {
            Track::Video => match self.video.write_sample(sample.data, pts) {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::warn!(error = %e, pts, "Video sample abandoned");
                    return;
                }
            },
            Track::Audio => self.audio.write_sample(sample.data, pts),
        };

        for frame in frames {
            self.enqueue(frame);
        }
    }

    /// Interrupt the worker, close the connection and join.
    ///
    /// Frames still queued are discarded. Returns the session statistics the
    /// first time; later calls are no-ops.
    pub async fn stop(&mut self) -> Option<PushStats> {
        self.frame_tx.take();
        let worker = self.worker.take()?;

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        Self::join(worker).await
    }

    /// Stop and forget the codec state of this session.
    pub async fn release(&mut self) -> Option<PushStats> {
        let stats = self.stop().await;
        self.video = AvcPackager::new();
        self.audio = AacPackager::new(self.config.audio_sample_rate, self.config.audio_channels);
        stats
    }

    /// Let the worker handle everything already submitted, then close.
    pub async fn finish(&mut self) -> Option<PushStats> {
        // closing the channel ends the worker loop once it is drained
        self.frame_tx.take();
        let worker = self.worker.take()?;

        let stats = Self::join(worker).await;
        self.shutdown_tx.take();
        stats
    }

    fn enqueue(&self, frame: LogicalFrame) {
        let Some(frame_tx) = &self.frame_tx else {
            tracing::warn!(dts = frame.dts, "Handler not ready, frame dropped");
            return;
        };
        if frame_tx.send(frame).is_err() {
            tracing::warn!("Push worker gone, frame dropped");
        }
    }

    async fn join(worker: JoinHandle<PushStats>) -> Option<PushStats> {
        match worker.await {
            Ok(stats) => {
                tracing::info!(
                    frames_sent = stats.frames_sent,
                    bytes_sent = stats.bytes_sent,
                    dropped = stats.dropped_frames,
                    connects = stats.connects,
                    "Pusher stopped"
                );
                Some(stats)
            }
            Err(e) => {
                tracing::error!(error = %e, "Push worker failed");
                None
            }
        }
    }
}

impl Drop for FlvPusher {
    fn drop(&mut self) {
        // the worker closes its connection on its own
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
    }
}

impl std::fmt::Debug for FlvPusher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlvPusher")
            .field("url", &self.config.url)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Worker loop: handle frames in arrival order until shutdown.
async fn run_worker(
    mut session: PushSession,
    mut frame_rx: mpsc::UnboundedReceiver<LogicalFrame>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> PushStats {
    tracing::debug!("Push worker running");

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => break,

            frame = frame_rx.recv() => {
                let Some(frame) = frame else {
                    break;
                };

                // a stalled connect or write is abandoned on shutdown
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = session.handle(frame) => {}
                }
            }
        }
    }

    session.close().await;
    session.into_stats()
}
