//! Outbound transport
//!
//! The pushed FLV stream has no known length, so it travels as the body of
//! a chunked HTTP POST:
//!
//! ```text
//! POST /live/livestream.flv HTTP/1.1
//! Host: example.com:8936
//! Content-Type: application/octet-stream
//! Transfer-Encoding: chunked
//!
//! <hex len>\r\n<FLV bytes>\r\n
//! <hex len>\r\n<FLV bytes>\r\n
//! ...
//! 0\r\n\r\n
//! ```
//!
//! Writes are buffered; each flush turns the buffer into one chunk.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use url::{Host, Url};

use super::config::PusherConfig;
use crate::error::{Result, TransportError};

/// Byte-stream connection to the ingest server
///
/// Every call may fail; the caller tears the connection down and waits for
/// the next chance to reconnect.
#[async_trait]
pub trait Transport: Send {
    /// Open a connection to `endpoint`, replacing any current one.
    async fn open(&mut self, endpoint: &str) -> Result<()>;

    /// Queue bytes on the connection.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Push queued bytes to the peer.
    async fn flush(&mut self) -> Result<()>;

    /// Close the connection, dropping anything not yet flushed.
    async fn close(&mut self);

    /// Whether a connection is open
    fn is_open(&self) -> bool;
}

/// Parse and check an HTTP-FLV endpoint.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;

    if url.scheme() != "http" {
        return Err(TransportError::UnsupportedScheme(url.scheme().to_string()).into());
    }
    if url.host().is_none() {
        return Err(TransportError::InvalidEndpoint(endpoint.to_string()).into());
    }
    Ok(url)
}

/// Host and port to dial for `url`.
fn socket_target(url: &Url) -> Result<(String, u16)> {
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return Err(TransportError::InvalidEndpoint(url.to_string()).into()),
    };
    let port = url.port_or_known_default().unwrap_or(80);
    Ok((host, port))
}

/// Request line and headers that open the streamed POST.
pub fn request_head(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut path = url.path().to_string();
    if let Some(query) = url.query() {
        path.push('?');
        path.push_str(query);
    }

    format!(
        "POST {} HTTP/1.1\r\n\
         Host: {}\r\n\
         Content-Type: application/octet-stream\r\n\
         Transfer-Encoding: chunked\r\n\
         \r\n",
        path, authority
    )
}

/// Chunked transfer coding over an async writer
#[derive(Debug)]
pub struct ChunkedWriter<W> {
    inner: W,
    buffer: BytesMut,
    max_buffer: usize,
    /// A chunk write started and never completed
    chunk_open: bool,
}

impl<W: AsyncWrite + Unpin + Send> ChunkedWriter<W> {
    pub fn new(inner: W, max_buffer: usize) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(max_buffer),
            max_buffer,
            chunk_open: false,
        }
    }

    /// Bytes waiting for the next chunk
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Buffer `data`; a full buffer goes out as a chunk right away.
    pub async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.buffer.extend_from_slice(data);
        if self.buffer.len() >= self.max_buffer {
            self.write_chunk().await?;
        }
        Ok(())
    }

    /// Send buffered bytes as one chunk and flush the writer.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.write_chunk().await?;
        self.inner.flush().await
    }

    /// Drop buffered bytes.
    pub fn discard(&mut self) {
        self.buffer.clear();
    }

    /// Whether a chunk was cut off mid-write, by an error or a dropped future
    pub fn is_interrupted(&self) -> bool {
        self.chunk_open
    }

    /// Write the terminating chunk and shut the writer down.
    ///
    /// Buffered bytes are discarded, not sent. After an interrupted chunk the
    /// body is already malformed, so the writer is shut down without a
    /// terminator.
    pub async fn finish(&mut self) -> io::Result<()> {
        self.discard();
        if self.chunk_open {
            return self.inner.shutdown().await;
        }
        self.inner.write_all(b"0\r\n\r\n").await?;
        self.inner.flush().await?;
        self.inner.shutdown().await
    }

    async fn write_chunk(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let data = self.buffer.split();
        let size_line = format!("{:x}\r\n", data.len());
        let mut chunk = BytesMut::with_capacity(size_line.len() + data.len() + 2);
        chunk.put_slice(size_line.as_bytes());
        chunk.put_slice(&data);
        chunk.put_slice(b"\r\n");

        self.chunk_open = true;
        self.inner.write_all(&chunk).await?;
        self.chunk_open = false;
        Ok(())
    }
}

/// HTTP-FLV push over TCP
#[derive(Debug)]
pub struct HttpFlvTransport {
    connect_timeout: Duration,
    tcp_nodelay: bool,
    write_buffer_size: usize,
    writer: Option<ChunkedWriter<TcpStream>>,
}

impl HttpFlvTransport {
    pub fn new(config: &PusherConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            tcp_nodelay: config.tcp_nodelay,
            write_buffer_size: config.write_buffer_size,
            writer: None,
        }
    }
}

#[async_trait]
impl Transport for HttpFlvTransport {
    async fn open(&mut self, endpoint: &str) -> Result<()> {
        self.close().await;

        let url = parse_endpoint(endpoint)?;
        let (host, port) = socket_target(&url)?;

        let mut stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((host.as_str(), port)),
        )
        .await
        .map_err(|_| TransportError::Timeout(endpoint.to_string()))??;

        if self.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        stream.write_all(request_head(&url).as_bytes()).await?;
        tracing::info!(url = %url, "http-flv connection opened");

        self.writer = Some(ChunkedWriter::new(stream, self.write_buffer_size));
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        writer.write(data).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(TransportError::NotConnected)?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };

        if writer.is_interrupted() {
            tracing::debug!("http-flv chunk cut off, closing without terminator");
        }

        // a peer that stopped reading cannot hold the close hostage
        match tokio::time::timeout(self.connect_timeout, writer.finish()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "http-flv close was not clean"),
            Err(_) => tracing::warn!(
                timeout_ms = self.connect_timeout.as_millis() as u64,
                "http-flv close timed out, connection dropped"
            ),
        }
        tracing::info!("http-flv connection closed");
    }

    fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    use super::*;
    use crate::media::flv::FLV_HEADER;

    #[test]
    fn test_parse_endpoint() {
        let url = parse_endpoint("http://ossrs.net:8936/live/livestream.flv").unwrap();
        assert_eq!(url.host_str(), Some("ossrs.net"));
        assert_eq!(url.path(), "/live/livestream.flv");

        assert!(matches!(
            parse_endpoint("https://ossrs.net/live.flv"),
            Err(crate::error::Error::Transport(TransportError::UnsupportedScheme(_)))
        ));
        assert!(matches!(
            parse_endpoint("live/livestream.flv"),
            Err(crate::error::Error::Transport(TransportError::InvalidEndpoint(_)))
        ));
    }

    #[test]
    fn test_socket_target_default_port() {
        let url = parse_endpoint("http://ossrs.net/live/livestream.flv").unwrap();
        assert_eq!(socket_target(&url).unwrap(), ("ossrs.net".to_string(), 80));

        let url = parse_endpoint("http://[::1]:8936/live.flv").unwrap();
        assert_eq!(socket_target(&url).unwrap(), ("::1".to_string(), 8936));
    }

    #[test]
    fn test_request_head() {
        let url = parse_endpoint("http://127.0.0.1:8936/live/livestream.flv?token=abc").unwrap();
        assert_eq!(
            request_head(&url),
            "POST /live/livestream.flv?token=abc HTTP/1.1\r\n\
             Host: 127.0.0.1:8936\r\n\
             Content-Type: application/octet-stream\r\n\
             Transfer-Encoding: chunked\r\n\r\n"
        );

        let url = parse_endpoint("http://ossrs.net/live.flv").unwrap();
        assert!(request_head(&url).contains("Host: ossrs.net\r\n"));
    }

    #[tokio::test]
    async fn test_chunk_per_flush() {
        let mut first = b"d\r\n".to_vec();
        first.extend_from_slice(&FLV_HEADER);
        first.extend_from_slice(b"\r\n");

        let mock = Builder::new().write(&first).write(b"3\r\nabc\r\n").build();
        let mut writer = ChunkedWriter::new(mock, 1024);

        writer.write(&FLV_HEADER).await.unwrap();
        writer.flush().await.unwrap();

        writer.write(b"ab").await.unwrap();
        writer.write(b"c").await.unwrap();
        assert_eq!(writer.buffered(), 3);
        writer.flush().await.unwrap();
        assert_eq!(writer.buffered(), 0);

        // nothing buffered, nothing written
        writer.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_full_buffer_written_eagerly() {
        let mock = Builder::new().write(b"5\r\nhello\r\n").build();
        let mut writer = ChunkedWriter::new(mock, 4);

        writer.write(b"hello").await.unwrap();
        assert_eq!(writer.buffered(), 0);
    }

    #[tokio::test]
    async fn test_finish_discards_pending_bytes() {
        let mock = Builder::new().write(b"0\r\n\r\n").build();
        let mut writer = ChunkedWriter::new(mock, 1024);

        writer.write(b"lost").await.unwrap();
        writer.finish().await.unwrap();
        assert_eq!(writer.buffered(), 0);
    }

    #[tokio::test]
    async fn test_finish_after_interrupted_chunk_skips_terminator() {
        let (client, mut server) = tokio::io::duplex(16);
        let mut writer = ChunkedWriter::new(client, 4);

        // the peer holds 16 bytes, the chunk needs 70
        let stalled = tokio::time::timeout(Duration::from_millis(50), writer.write(&[0xAB; 64])).await;
        assert!(stalled.is_err());
        assert!(writer.is_interrupted());

        writer.finish().await.unwrap();

        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert_eq!(received.len(), 16);
        assert_eq!(&received[..4], b"40\r\n");
        assert!(!received.ends_with(b"0\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_close_returns_when_peer_stops_reading() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // accept and hold the socket without ever reading
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
            drop(socket);
        });

        let endpoint = format!("http://{}/live/livestream.flv", addr);
        let config = PusherConfig::new(endpoint.clone()).connect_timeout(Duration::from_millis(200));
        let mut transport = HttpFlvTransport::new(&config);
        transport.open(&endpoint).await.unwrap();

        // more than the socket buffers on both ends can take
        let payload = vec![0x5A; 32 * 1024 * 1024];
        let stalled = tokio::time::timeout(Duration::from_millis(500), transport.write(&payload)).await;
        assert!(stalled.is_err());

        tokio::time::timeout(Duration::from_secs(5), transport.close())
            .await
            .expect("close blocked on a stalled peer");
        assert!(!transport.is_open());

        server.abort();
    }

    #[tokio::test]
    async fn test_http_flv_transport_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let endpoint = format!("http://{}/live/livestream.flv", addr);
        let mut transport = HttpFlvTransport::new(&PusherConfig::new(endpoint.clone()));
        assert!(!transport.is_open());
        assert!(matches!(
            transport.write(b"x").await,
            Err(crate::error::Error::Transport(TransportError::NotConnected))
        ));

        transport.open(&endpoint).await.unwrap();
        assert!(transport.is_open());
        transport.write(&FLV_HEADER).await.unwrap();
        transport.flush().await.unwrap();
        transport.write(b"unflushed").await.unwrap();
        transport.close().await;
        assert!(!transport.is_open());

        let received = server.await.unwrap();
        let mut expected = request_head(&parse_endpoint(&endpoint).unwrap()).into_bytes();
        expected.extend_from_slice(b"d\r\n");
        expected.extend_from_slice(&FLV_HEADER);
        expected.extend_from_slice(b"\r\n0\r\n\r\n");
        assert_eq!(received, expected);
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = format!("http://{}/live.flv", addr);
        let mut transport = HttpFlvTransport::new(&PusherConfig::new(endpoint.clone()));
        assert!(transport.open(&endpoint).await.is_err());
        assert!(!transport.is_open());
    }
}
