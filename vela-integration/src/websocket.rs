use crate::error::SocketError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, connect_async,
    tungstenite::{Utf8Bytes, client::IntoClientRequest, error::ProtocolError, protocol::CloseFrame},
};
use tracing::debug;

/// Convenient type alias for a tungstenite `WebSocketStream`.
pub type WebSocket = tokio_tungstenite::WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Convenient type alias for the `Sink` half of a tungstenite [`WebSocket`].
pub type WsSink = futures::stream::SplitSink<WebSocket, WsMessage>;

/// Convenient type alias for the `Stream` half of a tungstenite [`WebSocket`].
pub type WsStream = futures::stream::SplitStream<WebSocket>;

/// Communicative type alias for a tungstenite [`WebSocket`] `Message`.
pub type WsMessage = tokio_tungstenite::tungstenite::Message;

/// Communicative type alias for a tungstenite [`WebSocket`] `Error`.
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Connect asynchronously to a [`WebSocket`] server.
pub async fn connect<R>(request: R) -> Result<WebSocket, SocketError>
where
    R: IntoClientRequest + Unpin + Debug,
{
    debug!(?request, "attempting to establish WebSocket connection");
    connect_async(request)
        .await
        .map(|(websocket, _)| websocket)
        .map_err(|error| SocketError::WebSocket(Box::new(error)))
}

/// Parse an inbound [`WsMessage`] into the venue's JSON frame type.
///
/// Returns `None` for control messages (ping/pong) that carry no payload;
/// pong arrival is reported separately so keepalive tracking stays with the
/// caller.
pub fn parse<Frame>(input: Result<WsMessage, WsError>) -> Option<Result<Frame, SocketError>>
where
    Frame: DeserializeOwned,
{
    match input {
        Ok(WsMessage::Text(text)) => process_text(text),
        Ok(WsMessage::Binary(binary)) => process_binary(binary),
        Ok(WsMessage::Ping(payload)) => {
            debug!(?payload, "received Ping WebSocket message");
            None
        }
        Ok(WsMessage::Pong(payload)) => {
            debug!(?payload, "received Pong WebSocket message");
            None
        }
        Ok(WsMessage::Close(close_frame)) => process_close_frame(close_frame),
        Ok(WsMessage::Frame(frame)) => {
            debug!(payload = ?frame, "received unexpected Frame WebSocket message");
            None
        }
        Err(ws_err) => Some(Err(SocketError::WebSocket(Box::new(ws_err)))),
    }
}

fn process_text<Frame>(payload: Utf8Bytes) -> Option<Result<Frame, SocketError>>
where
    Frame: DeserializeOwned,
{
    Some(
        serde_json::from_str::<Frame>(&payload).map_err(|error| {
            debug!(
                ?error,
                ?payload,
                "failed to deserialise WebSocket message into venue frame"
            );
            SocketError::Deserialise {
                error,
                payload: payload.to_string(),
            }
        }),
    )
}

fn process_binary<Frame>(payload: Bytes) -> Option<Result<Frame, SocketError>>
where
    Frame: DeserializeOwned,
{
    Some(
        serde_json::from_slice::<Frame>(&payload).map_err(|error| SocketError::Deserialise {
            error,
            payload: String::from_utf8(payload.into()).unwrap_or_else(|err| err.to_string()),
        }),
    )
}

fn process_close_frame<Frame>(close_frame: Option<CloseFrame>) -> Option<Result<Frame, SocketError>> {
    let close_frame = format!("{close_frame:?}");
    debug!(payload = %close_frame, "received CloseFrame WebSocket message");
    Some(Err(SocketError::Terminated(close_frame)))
}

/// Determine whether a [`WsError`] indicates the [`WebSocket`] has disconnected.
pub fn is_websocket_disconnected(error: &WsError) -> bool {
    matches!(
        error,
        WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Io(_)
            | WsError::Protocol(ProtocolError::SendAfterClosing)
    )
}
