//! WebSocket push transport.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use lc_proto::channel::{ChannelFrame, ChannelToken};

use crate::channel::{Connection, FrameSink, FrameStream, PushTransport};
use crate::error::ChannelError;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects to the hub URL, presenting the token as a bearer credential.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn connect(&self, token: &ChannelToken) -> Result<Connection, ChannelError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ChannelError::Credentials(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        tracing::debug!(url = %self.url, "[ws] connected");

        let (sink, stream) = ws.split();
        Ok(Connection {
            sink: Box::new(WsSink(sink)),
            stream: Box::new(WsStream(stream)),
        })
    }
}

struct WsSink(SplitSink<Ws, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, frame: ChannelFrame) -> Result<(), ChannelError> {
        let json = frame.to_json().map_err(|e| ChannelError::Send(e.to_string()))?;
        self.0
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.0.close().await {
            tracing::debug!(error = %e, "[ws] close failed");
        }
    }
}

struct WsStream(SplitStream<Ws>);

#[async_trait]
impl FrameStream for WsStream {
    async fn next_frame(&mut self) -> Option<Result<ChannelFrame, ChannelError>> {
        loop {
            let message = match self.0.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ChannelError::Receive(e.to_string()))),
            };
            match message {
                Message::Text(text) => match ChannelFrame::from_json(text.as_str()) {
                    Ok(frame) => return Some(Ok(frame)),
                    Err(e) => tracing::debug!(error = %e, "[ws] unparseable frame skipped"),
                },
                Message::Close(frame) => {
                    let reason = frame
                        .map(|f| f.reason.as_str().to_string())
                        .filter(|r| !r.is_empty());
                    return Some(Ok(ChannelFrame::Close { reason }));
                }
                // Transport-level ping/pong is answered by tungstenite itself.
                _ => {}
            }
        }
    }
}
