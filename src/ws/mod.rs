//! Websocket client protocol implementation.
//!
//! A [`WebsocketClient`] owns one connection. Once connected, a reader worker delivers messages
//! to the [`Listener`] and a keepalive worker pings the server periodically. Messages can be
//! sent from any thread; frames of different messages never interleave on the wire.
//!
//! ## Examples
//!
//! Connect and send a message, received messages are delivered to the listener.
//! ```no_run
//! use framelink::ws::{Listener, ListenerResult, WebsocketClient};
//!
//! struct Printer;
//!
//! impl Listener for Printer {
//!     fn on_text(&self, _client: &WebsocketClient, text: &str) -> ListenerResult {
//!         println!("{text}");
//!         Ok(())
//!     }
//! }
//!
//! let client = WebsocketClient::builder("ws://127.0.0.1:9001/echo")
//!     .unwrap()
//!     .with_listener(Printer)
//!     .build()
//!     .unwrap();
//! client.connect().unwrap();
//! client.send_text("hello").unwrap();
//! client.close();
//! ```
//!
//! Request sub-protocols and custom headers, and tune the connection.
//! ```no_run
//! use std::time::Duration;
//! use framelink::ws::{Config, WebsocketClient};
//!
//! let client = WebsocketClient::builder("ws://127.0.0.1:9001/feed?depth=10")
//!     .unwrap()
//!     .with_header("x-api-key", "secret")
//!     .with_protocols(["feed.v2", "feed.v1"])
//!     .with_config(Config::default().with_keepalive_interval(Some(Duration::from_secs(5))))
//!     .build()
//!     .unwrap();
//! client.connect().unwrap();
//! if let Some(session) = client.session() {
//!     println!("negotiated protocol: {:?}", session.accepted_protocol());
//! }
//! client.wait_for();
//! ```

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::buffer;
use crate::stream::{ConnectionInfo, SocketFactory, TcpSocketFactory};
use crate::thread::{DefaultThreadFactory, ThreadFactory};
use crate::ws::engine::Engine;
use crate::ws::handshake::HandshakeRequest;
use crate::ws::protocol::OpCode;
use crate::ws::util::{parse_url, Target};

// re-export
pub use crate::ws::config::Config;
pub use crate::ws::error::{Error, HandshakeError, ListenerError};
pub use crate::ws::listener::{Listener, ListenerResult, NoopListener, Session};

pub mod config;
pub mod decoder;
pub mod encoder;
mod engine;
mod error;
pub mod handshake;
pub mod listener;
pub mod message;
pub mod protocol;
mod util;

type ReadBuffer = buffer::ReadBuffer<4096>;

/// Lifecycle of a connection. It only moves forward, a closed client is never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    NeverConnected,
    Connecting,
    Connected,
    Closed,
}

/// Handle to a single websocket connection. Clones refer to the same connection.
#[derive(Clone)]
pub struct WebsocketClient {
    engine: Arc<Engine>,
}

impl Debug for WebsocketClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebsocketClient")
            .field("connection_info", self.engine.connection_info())
            .field("state", &self.engine.state())
            .finish()
    }
}

impl WebsocketClient {
    /// Starts building a client for a `ws://` or `wss://` url.
    pub fn builder(url: &str) -> Result<ClientBuilder, Error> {
        Ok(ClientBuilder::new(parse_url(url)?))
    }

    /// Opens the socket, performs the handshake and starts the workers. `on_open` has been
    /// invoked when this returns. Fails with [`Error::IllegalState`] unless the client was
    /// never connected.
    pub fn connect(&self) -> Result<(), Error> {
        self.engine.connect(self)
    }

    /// Sends a text message. Does nothing unless connected.
    pub fn send_text(&self, text: &str) -> Result<(), Error> {
        self.engine.send(self, OpCode::Text, text.as_bytes())
    }

    /// Sends a binary message. Does nothing unless connected.
    pub fn send_binary(&self, bytes: &[u8]) -> Result<(), Error> {
        self.engine.send(self, OpCode::Binary, bytes)
    }

    /// Sends a close frame and shuts the socket down, which interrupts the blocked reader.
    /// Only the first call has any effect.
    pub fn close(&self) {
        self.engine.close(self)
    }

    /// Blocks until the reader worker exits, returns immediately if the connection was never
    /// established or when called from a listener callback.
    pub fn wait_for(&self) {
        self.engine.wait_for()
    }

    pub fn state(&self) -> ConnectionState {
        self.engine.state()
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_connected()
    }

    /// Handshake outcome, available once connected.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.engine.session()
    }

    /// Associates an arbitrary value with this client, replacing the previous one.
    pub fn set_attachment<T: Any + Send + Sync>(&self, attachment: T) {
        self.engine.set_attachment(Arc::new(attachment))
    }

    /// Returns the attachment if one of type `T` is set.
    pub fn attachment<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.engine.attachment()?.downcast::<T>().ok()
    }

    pub fn connection_info(&self) -> &ConnectionInfo {
        self.engine.connection_info()
    }
}

/// Configures a [`WebsocketClient`] before it connects.
pub struct ClientBuilder {
    target: Target,
    headers: Vec<(String, String)>,
    header_map: HeaderMap,
    protocols: Vec<String>,
    config: Config,
    listener: Box<dyn Listener>,
    socket_factory: Box<dyn SocketFactory>,
    thread_factory: Box<dyn ThreadFactory>,
}

impl ClientBuilder {
    fn new(target: Target) -> Self {
        Self {
            target,
            headers: Vec::new(),
            header_map: HeaderMap::new(),
            protocols: Vec::new(),
            config: Config::default(),
            listener: Box::new(NoopListener),
            socket_factory: Box::new(TcpSocketFactory::new()),
            thread_factory: Box::new(DefaultThreadFactory),
        }
    }

    /// Adds a request header. `Host` and `User-Agent` can be overridden, the upgrade headers
    /// cannot. Invalid names or values fail [`build`](ClientBuilder::build).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.header_map.extend(headers);
        self
    }

    /// Sub-protocols to request, in order of preference.
    pub fn with_protocols<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_config(self, config: Config) -> Self {
        Self { config, ..self }
    }

    pub fn with_listener<L: Listener>(self, listener: L) -> Self {
        Self {
            listener: Box::new(listener),
            ..self
        }
    }

    /// Replaces the plain tcp socket factory, needed for `wss://` urls.
    pub fn with_socket_factory<F: SocketFactory + 'static>(self, socket_factory: F) -> Self {
        Self {
            socket_factory: Box::new(socket_factory),
            ..self
        }
    }

    pub fn with_thread_factory<F: ThreadFactory + 'static>(self, thread_factory: F) -> Self {
        Self {
            thread_factory: Box::new(thread_factory),
            ..self
        }
    }

    pub fn build(self) -> Result<WebsocketClient, Error> {
        let mut headers = self.header_map;
        for (name, value) in self.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::InvalidHeader(name.clone()))?;
            let value = HeaderValue::from_str(&value).map_err(|_| Error::InvalidHeader(value.clone()))?;
            headers.append(name, value);
        }
        let request = HandshakeRequest::new(
            self.target.endpoint,
            &self.target.host,
            self.config.user_agent(),
            &headers,
            &self.protocols,
        )?;
        let engine = Engine::new(
            self.config,
            self.target.connection_info,
            request,
            self.listener,
            self.socket_factory,
            self.thread_factory,
        );
        Ok(WebsocketClient {
            engine: Arc::new(engine),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_client_in_never_connected_state() {
        let client = WebsocketClient::builder("ws://127.0.0.1:9001/").unwrap().build().unwrap();
        assert_eq!(ConnectionState::NeverConnected, client.state());
        assert!(!client.is_connected());
        assert!(client.session().is_none());
        assert_eq!("127.0.0.1:9001", client.connection_info().to_string());
    }

    #[test]
    fn should_ignore_close_and_send_before_connect() {
        let client = WebsocketClient::builder("ws://127.0.0.1:9001/").unwrap().build().unwrap();
        client.close();
        assert_eq!(ConnectionState::NeverConnected, client.state());
        client.send_text("ignored").unwrap();
        client.send_binary(&[1, 2, 3]).unwrap();
        client.wait_for();
    }

    #[test]
    fn should_store_attachment_by_type() {
        let client = WebsocketClient::builder("ws://localhost/").unwrap().build().unwrap();
        assert!(client.attachment::<String>().is_none());
        client.set_attachment("session-1".to_owned());
        assert_eq!("session-1", client.attachment::<String>().unwrap().as_str());
        assert!(client.attachment::<u64>().is_none());

        client.clone().set_attachment(42u64);
        assert_eq!(42, *client.attachment::<u64>().unwrap());
    }

    #[test]
    fn should_reject_invalid_header() {
        let result = WebsocketClient::builder("ws://localhost/")
            .unwrap()
            .with_header("bad header", "value")
            .build();
        assert!(matches!(result, Err(Error::InvalidHeader(name)) if name == "bad header"));
    }

    #[test]
    fn should_reject_unsupported_scheme() {
        assert!(matches!(
            WebsocketClient::builder("ftp://localhost/"),
            Err(Error::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn should_fail_secure_connect_with_default_factory() {
        let client = WebsocketClient::builder("wss://127.0.0.1:1/").unwrap().build().unwrap();
        assert!(matches!(client.connect(), Err(Error::IO(_))));
        assert_eq!(ConnectionState::Closed, client.state());
        assert!(matches!(client.connect(), Err(Error::IllegalState(ConnectionState::Closed))));
    }
}
