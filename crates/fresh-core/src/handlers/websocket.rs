//! WebSocket routes
//!
//! A WebSocket route is a GET route whose controller validates the
//! handshake, answers 101 and leaves an [`Upgrade`] on the reply. Group
//! and route middleware run as for any other route, so a before handler
//! can refuse the upgrade. The server takes the upgrade off the committed
//! response and runs the session on the blocking pool, where
//! [`WebSocket::send`] and [`WebSocket::receive`] block like socket calls.

use crate::endpoint::HandlerFn;
use crate::{Context, Error, Request, Result, StatusCode};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// RFC 6455 handshake GUID
const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Messages buffered per direction before the sender waits
const CHANNEL_CAPACITY: usize = 32;

/// Session handler; returns when the conversation is over
pub type SessionFn = Arc<dyn Fn(&mut WebSocket) -> Result<()> + Send + Sync>;

/// A complete data message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Bytes),
}

impl Message {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Binary(_) => None,
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<Bytes> for Message {
    fn from(data: Bytes) -> Self {
        Message::Binary(data)
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data.into())
    }
}

/// `Sec-WebSocket-Accept` value for a client key
pub fn accept_key(key: &str) -> String {
    let mut sha = Sha1::new();
    sha.update(key.trim().as_bytes());
    sha.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(sha.finalize())
}

/// Controller answering the handshake and handing the socket to `session`
///
/// A request that is not a version 13 upgrade with a key fails with 426.
pub fn handshake(session: SessionFn) -> HandlerFn {
    Arc::new(move |ctx: &mut Context| {
        let version_ok = ctx
            .header("sec-websocket-version")
            .map(|v| v.trim() == "13")
            .unwrap_or(false);
        let accept = ctx
            .header("sec-websocket-key")
            .map(str::trim)
            .filter(|key| !key.is_empty() && version_ok && ctx.request.is_websocket())
            .map(accept_key);

        let Some(accept) = accept else {
            ctx.response
                .set_header("upgrade", "websocket")
                .set_header("sec-websocket-version", "13");
            return Err(Error::status(
                StatusCode::UPGRADE_REQUIRED,
                "WebSocket upgrade required",
            ));
        };

        let upgrade = Upgrade {
            session: Arc::clone(&session),
            request: ctx.request.clone(),
            params: ctx.params().clone(),
        };
        ctx.response
            .status(StatusCode::SWITCHING_PROTOCOLS)
            .set_header("upgrade", "websocket")
            .set_header("connection", "Upgrade")
            .set_header("sec-websocket-accept", accept)
            .upgrade(upgrade);
        Ok(())
    })
}

/// Pending session attached to a 101 reply
#[derive(Clone)]
pub struct Upgrade {
    session: SessionFn,
    request: Request,
    params: HashMap<String, String>,
}

impl Upgrade {
    /// Split into the transport's channel ends and the blocking session
    ///
    /// The session drops its [`WebSocket`] when it returns, which closes
    /// [`Peer::outbound`].
    pub fn open(self) -> (Peer, impl FnOnce() -> Result<()> + Send + 'static) {
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut socket = WebSocket {
            request: self.request,
            params: self.params,
            inbound: inbound_rx,
            outbound: outbound_tx,
        };
        let session = self.session;
        let peer = Peer {
            inbound: inbound_tx,
            outbound: outbound_rx,
        };
        (peer, move || session(&mut socket))
    }
}

impl fmt::Debug for Upgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upgrade")
            .field("path", &self.request.path)
            .field("params", &self.params)
            .finish()
    }
}

/// Transport side of a session
#[derive(Debug)]
pub struct Peer {
    /// Messages read off the wire, for [`WebSocket::receive`]
    pub inbound: mpsc::Sender<Message>,
    /// Messages from [`WebSocket::send`], to write to the wire
    pub outbound: mpsc::Receiver<Message>,
}

/// Session side of an upgraded connection
#[derive(Debug)]
pub struct WebSocket {
    request: Request,
    params: HashMap<String, String>,
    inbound: mpsc::Receiver<Message>,
    outbound: mpsc::Sender<Message>,
}

impl WebSocket {
    /// The request that was upgraded
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Queue a message; fails once the connection is gone
    pub fn send(&self, message: impl Into<Message>) -> Result<()> {
        self.outbound
            .blocking_send(message.into())
            .map_err(|_| Error::WebSocketClosed)
    }

    /// Next message, `None` once the client has closed
    pub fn receive(&mut self) -> Option<Message> {
        self.inbound.blocking_recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Method, RequestBuilder};
    use std::thread;

    fn upgrade_request(path: &str) -> RequestBuilder {
        RequestBuilder::new(Method::Get, path)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")
    }

    fn echo() -> SessionFn {
        Arc::new(|ws: &mut WebSocket| {
            ws.send("Hello, Client!")?;
            while let Some(message) = ws.receive() {
                ws.send(message)?;
            }
            Ok(())
        })
    }

    #[test]
    fn test_accept_key() {
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_handshake_sets_upgrade() {
        let controller = handshake(echo());
        let mut ctx = Context::new(upgrade_request("/ws").build());
        controller(&mut ctx).unwrap();

        assert_eq!(ctx.response.status_code(), Some(StatusCode::SWITCHING_PROTOCOLS));
        assert_eq!(
            ctx.response.get_header("sec-websocket-accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
        let res = ctx.response.commit(false);
        assert!(res.upgrade.is_some());
    }

    #[test]
    fn test_plain_get_is_426() {
        let controller = handshake(echo());
        let mut ctx = Context::new(Request::new(Method::Get, "/ws"));
        let err = controller(&mut ctx).unwrap_err();

        assert_eq!(err.explicit_status(), Some(StatusCode::UPGRADE_REQUIRED));
        assert_eq!(ctx.response.get_header("upgrade"), Some("websocket"));

        let old = RequestBuilder::new(Method::Get, "/ws")
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "8")
            .header("Sec-WebSocket-Key", "abc")
            .build();
        let mut ctx = Context::new(old);
        assert!(controller(&mut ctx).is_err());
    }

    #[test]
    fn test_session_over_channels() {
        let controller = handshake(echo());
        let mut ctx = Context::new(upgrade_request("/ws").build());
        controller(&mut ctx).unwrap();
        let upgrade = ctx.response.commit(false).upgrade.unwrap();

        let (mut peer, session) = upgrade.open();
        let worker = thread::spawn(session);

        assert_eq!(peer.outbound.blocking_recv(), Some(Message::from("Hello, Client!")));
        peer.inbound.blocking_send(Message::from("ping")).unwrap();
        assert_eq!(peer.outbound.blocking_recv(), Some(Message::from("ping")));

        // Client goes away; the session sees end of stream and returns
        drop(peer.inbound);
        assert!(worker.join().unwrap().is_ok());
        assert_eq!(peer.outbound.blocking_recv(), None);
    }

    #[test]
    fn test_send_after_close_fails() {
        let session: SessionFn = Arc::new(|ws: &mut WebSocket| {
            assert_eq!(ws.param("room"), Some("lobby"));
            assert_eq!(ws.request().path, "/chat/lobby");
            ws.send("first")
        });
        let upgrade = Upgrade {
            session,
            request: Request::new(Method::Get, "/chat/lobby"),
            params: HashMap::from([("room".to_string(), "lobby".to_string())]),
        };

        let (peer, session) = upgrade.open();
        drop(peer);
        let result = thread::spawn(session).join().unwrap();
        assert!(matches!(result, Err(Error::WebSocketClosed)));
    }
}
