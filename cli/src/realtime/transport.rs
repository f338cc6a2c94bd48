//! WebSocket transport seam.
//!
//! [`Transport`] opens a connection and hands back independent
//! ([`FrameSink`], [`FrameSource`]) halves ready for use in a
//! `tokio::select!` loop. [`TungsteniteTransport`] is the real
//! implementation on top of `tokio-tungstenite`; [`ScriptedTransport`]
//! is an in-process double fed from a channel.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

/// Concrete WebSocket stream type (avoids repeating the 6-line generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Received WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping frame with payload.
    Ping(Vec<u8>),
    /// Pong frame with payload.
    Pong(Vec<u8>),
    /// Close frame with status code and reason.
    Close {
        /// WebSocket close code (1000 = normal, 1005 = no code).
        code: u16,
        /// Human-readable close reason.
        reason: String,
    },
}

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a UTF-8 text frame.
    async fn send_text(&mut self, text: &str) -> Result<()>;

    /// Answer a ping.
    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()>;

    /// Send a close frame and flush.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` once the stream has ended.
    async fn recv(&mut self) -> Option<Result<Frame>>;
}

/// Opens connections.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Connect to `url`, inserting each `(name, value)` header into the
    /// handshake request.
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;
}

/// `tokio-tungstenite` transport with rustls.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        use tungstenite::client::IntoClientRequest;

        let mut request = url
            .into_client_request()
            .with_context(|| format!("invalid WebSocket URL: {url}"))?;

        for (name, value) in headers {
            let header_name = tungstenite::http::HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name: {name}"))?;
            let header_value = tungstenite::http::HeaderValue::from_str(value)
                .with_context(|| format!("invalid header value for {name}"))?;
            request.headers_mut().insert(header_name, header_value);
        }

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .context("WebSocket connect failed")?;

        let (sink, stream) = ws_stream.split();
        Ok((Box::new(WsWriter { sink }), Box::new(WsReader { stream })))
    }
}

struct WsWriter {
    sink: futures_util::stream::SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl FrameSink for WsWriter {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .context("WebSocket send_text failed")
    }

    async fn send_pong(&mut self, data: Vec<u8>) -> Result<()> {
        self.sink
            .send(tungstenite::Message::Pong(data))
            .await
            .context("WebSocket send_pong failed")
    }

    async fn close(&mut self) -> Result<()> {
        // Best effort: the peer may already be gone
        let _ = self.sink.send(tungstenite::Message::Close(None)).await;
        self.sink.close().await.context("WebSocket close failed")
    }
}

struct WsReader {
    stream: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsReader {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Some(Ok(Frame::Text(text.to_string())));
                }
                Some(Ok(tungstenite::Message::Binary(data))) => {
                    return Some(Ok(Frame::Binary(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    return Some(Ok(Frame::Ping(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Pong(data))) => {
                    return Some(Ok(Frame::Pong(data.to_vec())));
                }
                Some(Ok(tungstenite::Message::Close(close_frame))) => {
                    let (code, reason) = close_frame
                        .map(|cf| (cf.code.into(), cf.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return Some(Ok(Frame::Close { code, reason }));
                }
                Some(Ok(tungstenite::Message::Frame(_))) => continue,
                Some(Err(e)) => {
                    return Some(Err(anyhow::anyhow!("WebSocket read error: {e}")));
                }
                None => return None,
            }
        }
    }
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    }
}

// ============================================================================
// Test double
// ============================================================================

/// One scripted connection: frames pushed by the test, texts sent by the client.
#[derive(Debug)]
pub struct ScriptedConnection {
    /// URL the client opened.
    pub url: String,
    /// Headers the client sent.
    pub headers: Vec<(String, String)>,
    /// Push frames (or errors) to the client. Dropping it ends the stream.
    pub frames: mpsc::UnboundedSender<Result<Frame>>,
    /// Texts the client sent.
    pub sent: mpsc::UnboundedReceiver<String>,
}

#[derive(Debug, Default)]
struct ScriptedState {
    opens: AtomicUsize,
    fail_next: Mutex<Option<String>>,
    connections: Mutex<Option<mpsc::UnboundedSender<ScriptedConnection>>>,
}

/// In-process transport for tests.
///
/// Every successful `open` produces a [`ScriptedConnection`] on the
/// receiver returned by [`ScriptedTransport::new`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<ScriptedState>,
}

impl ScriptedTransport {
    /// Create a transport and the receiver of its connections.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScriptedConnection>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Self::default();
        *transport
            .state
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tx);
        (transport, rx)
    }

    /// Number of `open` calls so far, failed ones included.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.opens.load(Ordering::SeqCst)
    }

    /// Make the next `open` fail with `reason`.
    pub fn fail_next_open(&self, reason: &str) {
        *self
            .state
            .fail_next
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(reason.to_string());
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        self.state.opens.fetch_add(1, Ordering::SeqCst);

        let failure = self
            .state
            .fail_next
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(reason) = failure {
            anyhow::bail!("{reason}");
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        let connection = ScriptedConnection {
            url: url.to_string(),
            headers: headers.to_vec(),
            frames: frames_tx,
            sent: sent_rx,
        };
        if let Some(tx) = self
            .state
            .connections
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(connection);
        }

        Ok((
            Box::new(ScriptedSink { sent: sent_tx }),
            Box::new(ScriptedSource { frames: frames_rx }),
        ))
    }
}

struct ScriptedSink {
    sent: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for ScriptedSink {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.sent
            .send(text.to_string())
            .map_err(|_| anyhow::anyhow!("scripted connection closed"))
    }

    async fn send_pong(&mut self, _data: Vec<u8>) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct ScriptedSource {
    frames: mpsc::UnboundedReceiver<Result<Frame>>,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn recv(&mut self) -> Option<Result<Frame>> {
        self.frames.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme_https() {
        assert_eq!(http_to_ws_scheme("https://tms.example.com"), "wss://tms.example.com");
    }

    #[test]
    fn test_http_to_ws_scheme_http() {
        assert_eq!(http_to_ws_scheme("http://localhost:3001"), "ws://localhost:3001");
    }

    #[test]
    fn test_http_to_ws_scheme_passthrough() {
        assert_eq!(http_to_ws_scheme("wss://tms.example.com/ws"), "wss://tms.example.com/ws");
        assert_eq!(http_to_ws_scheme("ws://localhost:3001/ws"), "ws://localhost:3001/ws");
    }

    #[tokio::test]
    async fn test_tungstenite_invalid_url_returns_error() {
        let result = TungsteniteTransport.open("not-a-url", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tungstenite_unreachable_host_returns_error() {
        let result = TungsteniteTransport.open("ws://127.0.0.1:1/ws", &[]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_scripted_transport_round_trip() {
        let (transport, mut connections) = ScriptedTransport::new();
        let (mut sink, mut source) = transport
            .open("ws://test/ws", &[("Authorization".into(), "Bearer t".into())])
            .await
            .unwrap();

        let mut conn = connections.recv().await.unwrap();
        assert_eq!(conn.url, "ws://test/ws");
        assert_eq!(conn.headers[0].1, "Bearer t");

        conn.frames.send(Ok(Frame::Text("hi".into()))).unwrap();
        assert_eq!(source.recv().await.unwrap().unwrap(), Frame::Text("hi".into()));

        sink.send_text("out").await.unwrap();
        assert_eq!(conn.sent.recv().await.unwrap(), "out");

        drop(conn);
        assert!(source.recv().await.is_none());
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn test_scripted_transport_fail_next() {
        let (transport, _connections) = ScriptedTransport::new();
        transport.fail_next_open("refused");
        assert!(transport.open("ws://test", &[]).await.is_err());
        assert!(transport.open("ws://test", &[]).await.is_ok());
        assert_eq!(transport.open_count(), 2);
    }
}
