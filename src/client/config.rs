//! Pusher configuration

use std::time::Duration;

use url::Url;

use super::transport::parse_endpoint;
use crate::error::Result;
use crate::media::cache::DEFAULT_MAX_QUEUED_VIDEO;

/// Push session configuration options
#[derive(Debug, Clone)]
pub struct PusherConfig {
    /// HTTP-FLV ingest URL the stream is POSTed to
    pub url: String,

    /// Audio track sample rate in Hz
    pub audio_sample_rate: u32,

    /// Audio track channel count
    pub audio_channels: u8,

    /// Video frames held back for dts reordering before a flush
    pub max_queued_video: usize,

    /// Transport write buffer size; a fuller buffer is sent as a chunk
    pub write_buffer_size: usize,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            audio_sample_rate: 44100,
            audio_channels: 2,
            max_queued_video: DEFAULT_MAX_QUEUED_VIDEO,
            write_buffer_size: 64 * 1024, // 64KB
            connect_timeout: Duration::from_secs(10),
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl PusherConfig {
    /// Create a config pushing to `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the audio track format
    pub fn with_audio(mut self, sample_rate: u32, channels: u8) -> Self {
        self.audio_sample_rate = sample_rate;
        self.audio_channels = channels;
        self
    }

    /// Set the number of video frames held for reordering
    pub fn max_queued_video(mut self, frames: usize) -> Self {
        self.max_queued_video = frames;
        self
    }

    /// Set the transport write buffer size
    pub fn write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size.max(1);
        self
    }

    /// Set connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Disable TCP_NODELAY
    pub fn disable_nodelay(mut self) -> Self {
        self.tcp_nodelay = false;
        self
    }

    /// Check the endpoint is a usable `http://` URL.
    pub fn validate(&self) -> Result<Url> {
        parse_endpoint(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PusherConfig::default();

        assert_eq!(config.audio_sample_rate, 44100);
        assert_eq!(config.audio_channels, 2);
        assert_eq!(config.max_queued_video, 2);
        assert_eq!(config.write_buffer_size, 64 * 1024);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder_chaining() {
        let config = PusherConfig::new("http://127.0.0.1:8936/live/livestream.flv")
            .with_audio(22050, 1)
            .max_queued_video(4)
            .write_buffer_size(0)
            .connect_timeout(Duration::from_secs(3))
            .disable_nodelay();

        assert_eq!(config.url, "http://127.0.0.1:8936/live/livestream.flv");
        assert_eq!(config.audio_sample_rate, 22050);
        assert_eq!(config.audio_channels, 1);
        assert_eq!(config.max_queued_video, 4);
        // never zero
        assert_eq!(config.write_buffer_size, 1);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert!(!config.tcp_nodelay);
    }

    #[test]
    fn test_validate() {
        let url = PusherConfig::new("http://127.0.0.1:8936/live/livestream.flv")
            .validate()
            .unwrap();
        assert_eq!(url.port(), Some(8936));

        assert!(PusherConfig::new("rtmp://127.0.0.1/live/stream").validate().is_err());
        assert!(PusherConfig::new("not a url").validate().is_err());
        assert!(PusherConfig::default().validate().is_err());
    }
}
