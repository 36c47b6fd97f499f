use std::io;
use std::io::ErrorKind::Other;
use std::str::Utf8Error;

use thiserror::Error;
use url::ParseError;

use crate::ws::ConnectionState;

/// Error returned by listener callbacks.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("websocket protocol error: {0}")]
    Protocol(&'static str),
    #[error("payload length too large: max {max} bytes, got {actual} bytes")]
    PayloadTooLarge { max: usize, actual: u64 },
    #[error("illegal connection state: {0:?}")]
    IllegalState(ConnectionState),
    #[error("the websocket is closed and can be dropped")]
    Closed,
    #[error("IO error: {0}")]
    IO(#[from] io::Error),
    #[error("url parse error: {0}")]
    InvalidUrl(#[from] ParseError),
    #[error("unrecognised url scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    #[error("text message is not valid utf-8: {0}")]
    Utf8(#[from] Utf8Error),
    #[error("listener error: {0}")]
    Listener(ListenerError),
    #[error("listener panicked: {0}")]
    ListenerPanic(String),
}

impl Error {
    /// Errors that leave the connection usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Utf8(_) | Error::Listener(_) | Error::ListenerPanic(_))
    }
}

impl From<Error> for io::Error {
    fn from(value: Error) -> Self {
        match value {
            Error::IO(err) => err,
            other => io::Error::new(Other, other),
        }
    }
}

/// Reasons the opening handshake can fail.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("expected status code 101, got {0} {1}")]
    UnexpectedStatus(u16, String),
    #[error("response line or headers exceed {0} bytes")]
    ResponseTooLarge(usize),
    #[error("malformed response: {0}")]
    Malformed(#[from] httparse::Error),
    #[error("invalid response header: {0}")]
    InvalidHeader(String),
    #[error("stream ended before the response was complete")]
    UnexpectedEof,
}
