use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::ClientError;
use crate::objects::PushFrame;
use crate::signature::{ACTOR_HEADER, ActorClaim, SIGNATURE_HEADER, sign_actor};

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// An open push subscription.
///
/// The first frame is always a snapshot. The stream ends after the server
/// closes the socket, which it does after a terminal frame.
pub struct PushStream {
    socket: Socket,
    close_code: Option<u16>,
}

impl PushStream {
    pub(super) async fn connect(
        url: Url,
        actor: ActorClaim,
        secret: &[u8],
    ) -> Result<Self, ClientError> {
        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(ACTOR_HEADER, header_value(&actor.to_string())?);
        headers.insert(SIGNATURE_HEADER, header_value(&sign_actor(&actor, secret))?);
        let (socket, _) = connect_async(request).await?;
        Ok(Self {
            socket,
            close_code: None,
        })
    }

    /// Wait for the next push frame. Returns `None` once the server closed
    /// the stream; see [`close_code`](Self::close_code) for why.
    pub async fn next_frame(&mut self) -> Option<Result<PushFrame, ClientError>> {
        while let Some(message) = self.socket.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).map_err(ClientError::Json));
                }
                Ok(Message::Close(frame)) => {
                    self.close_code = frame.map(|f| u16::from(f.code));
                    return None;
                }
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    /// Close code sent by the server, once the stream has ended.
    pub fn close_code(&self) -> Option<u16> {
        self.close_code
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|e| ClientError::WebSocket(tungstenite::Error::HttpFormat(e.into())))
}
