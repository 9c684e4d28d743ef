//! Connection seam between the protocol client and the socket.
//!
//! A [`Connector`] opens one connection and hands back a text-frame sink and
//! a frame stream. The future resolving is the "open" event; an error before
//! that is "failed to open".

use std::future::{self, Future};
use std::pin::Pin;

use futures::{Sink, SinkExt, Stream, StreamExt};
use reqwest::Url;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::TransportError;

const WS_PATH: &str = "/v1/ws";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Close,
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<(FrameSink, FrameStream), TransportError>> + Send;
}

/// Server location, derived from the origin the client was served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    secure: bool,
    authority: String,
}

impl Endpoint {
    /// Accepts `http(s)://host[:port]` (a `ws`/`wss` origin works too).
    pub fn from_origin(origin: &str) -> Result<Self, TransportError> {
        let url = Url::parse(origin)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{origin}: {e}")))?;
        let secure = match url.scheme() {
            "https" | "wss" => true,
            "http" | "ws" => false,
            other => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "unsupported scheme: {other}"
                )));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidEndpoint(format!("{origin}: missing host")))?;
        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        Ok(Self { secure, authority })
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Origin for REST calls.
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.authority)
    }

    /// Real-time endpoint for one identity.
    pub fn ws_url(&self, user_id: &str) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{}://{}{}/{}", scheme, self.authority, WS_PATH, user_id)
    }
}

/// [`Connector`] over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        debug!("WebSocket handshake complete: {}", url);
        let (write, read) = ws_stream.split();

        let sink = write.sink_map_err(TransportError::from).with(|text: String| {
            future::ready(Ok::<_, TransportError>(Message::Text(text.into())))
        });

        // Ping/pong are answered by tungstenite; binary frames are not part
        // of the protocol.
        let stream = read.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Close(_)) => Some(Ok(Frame::Close)),
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::from(e))),
            })
        });

        Ok((Box::pin(sink), Box::pin(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_origin_upgrades_to_ws() {
        let endpoint = Endpoint::from_origin("http://127.0.0.1:8889").unwrap();
        assert!(!endpoint.is_secure());
        assert_eq!(endpoint.base_url(), "http://127.0.0.1:8889");
        assert_eq!(endpoint.ws_url("u-1"), "ws://127.0.0.1:8889/v1/ws/u-1");
    }

    #[test]
    fn https_origin_upgrades_to_wss() {
        let endpoint = Endpoint::from_origin("https://interview.example.org/some/page").unwrap();
        assert!(endpoint.is_secure());
        assert_eq!(endpoint.base_url(), "https://interview.example.org");
        assert_eq!(
            endpoint.ws_url("abc"),
            "wss://interview.example.org/v1/ws/abc"
        );
    }

    #[test]
    fn rejects_bad_origins() {
        assert!(matches!(
            Endpoint::from_origin("ftp://example.org"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::from_origin("not a url"),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }
}
