//! Callbacks for websocket events and the negotiated session.

use http::{HeaderMap, StatusCode};
use log::error;

use crate::ws::error::ListenerError;
use crate::ws::{Error, WebsocketClient};

pub type ListenerResult = Result<(), ListenerError>;

/// Receives websocket events. All methods have no-op defaults.
///
/// `on_text` and `on_binary` run on the reader thread in the order the messages were received
/// and never concurrently with each other. `on_open` runs on the thread calling
/// [`connect`](WebsocketClient::connect) before the workers start; `on_closed` and
/// `on_exception` run on whichever thread detected the condition.
///
/// Returned errors and panics are forwarded to [`on_exception`](Listener::on_exception) and do
/// not close the connection.
pub trait Listener: Send + Sync + 'static {
    fn on_open(&self, client: &WebsocketClient, session: &Session) {
        let _ = (client, session);
    }

    /// Invoked once, after the connection has been closed by either side.
    fn on_closed(&self, client: &WebsocketClient) {
        let _ = client;
    }

    fn on_text(&self, client: &WebsocketClient, text: &str) -> ListenerResult {
        let _ = (client, text);
        Ok(())
    }

    fn on_binary(&self, client: &WebsocketClient, bytes: &[u8]) -> ListenerResult {
        let _ = (client, bytes);
        Ok(())
    }

    fn on_exception(&self, client: &WebsocketClient, error: &Error) {
        error!("websocket error on {}: {}", client.connection_info(), error);
    }
}

/// Listener that ignores every event.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoopListener;

impl Listener for NoopListener {}

/// Outcome of the opening handshake.
#[derive(Debug, Clone)]
pub struct Session {
    http_version: String,
    status: StatusCode,
    reason: String,
    headers: HeaderMap,
    accepted_protocol: Option<String>,
}

impl Session {
    pub(crate) fn new(
        http_version: String,
        status: StatusCode,
        reason: String,
        headers: HeaderMap,
        accepted_protocol: Option<String>,
    ) -> Self {
        Self {
            http_version,
            status,
            reason,
            headers,
            accepted_protocol,
        }
    }

    pub fn http_version(&self) -> &str {
        &self.http_version
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Response headers, lookups are case-insensitive.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sub-protocol selected by the server, if any.
    pub fn accepted_protocol(&self) -> Option<&str> {
        self.accepted_protocol.as_deref()
    }
}
