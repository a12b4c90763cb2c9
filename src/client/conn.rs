use futures_util::{Sink, Stream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

/// Twitch chat over WebSocket. TLS is handled by the WebSocket client.
pub const URL: &str = "wss://irc-ws.chat.twitch.tv:443/";

/// The value of the `Sec-WebSocket-Protocol` header.
pub const SUBPROTOCOL: &str = "irc";

/// The socket type returned by [`open`].
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Anything which can carry WebSocket messages in both directions.
///
/// This is implemented for every `WebSocketStream`, so a connection can run over
/// a TCP socket, or over an in-memory pipe in tests.
pub trait Socket:
  Stream<Item = Result<Message, tungstenite::Error>>
  + Sink<Message, Error = tungstenite::Error>
  + Unpin
  + Send
  + 'static
{
}

impl<T> Socket for T where
  T: Stream<Item = Result<Message, tungstenite::Error>>
    + Sink<Message, Error = tungstenite::Error>
    + Unpin
    + Send
    + 'static
{
}

/// Open a WebSocket to `url`, requesting the `irc` subprotocol.
pub async fn open(url: &str) -> Result<WsStream, tungstenite::Error> {
  trace!(url, "opening websocket");
  let mut request = url.into_client_request()?;
  request.headers_mut().insert(
    "Sec-WebSocket-Protocol",
    HeaderValue::from_static(SUBPROTOCOL),
  );
  let (stream, response) = tokio_tungstenite::connect_async(request).await?;
  trace!(status = %response.status(), "websocket open");
  Ok(stream)
}
