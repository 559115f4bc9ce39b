use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::SinkExt;
use tokio_tungstenite::tungstenite::error::Error as WsError;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::WebSocketStream;

/// Write half of a transport, driven by the send pipeline
///
/// The pipeline awaits every `write_frame` before starting the next one,
/// so an implementation never sees two writes in flight.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write and flush one frame
    async fn write_frame(&mut self, frame: Frame) -> std::result::Result<(), WsError>;

    /// Release the write half
    async fn close(&mut self);
}

/// `FrameSink` over the write half of a tokio-tungstenite stream
pub struct WsSink<S> {
    inner: SplitSink<WebSocketStream<S>, Frame>,
}

impl<S> WsSink<S> {
    pub fn new(inner: SplitSink<WebSocketStream<S>, Frame>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    async fn write_frame(&mut self, frame: Frame) -> std::result::Result<(), WsError> {
        self.inner.send(frame).await
    }

    async fn close(&mut self) {
        let _ = self.inner.close().await;
    }
}
