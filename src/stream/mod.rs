//! Socket construction and the buffered stream adapters the websocket engine runs on.

use std::fmt::{Display, Formatter};
use std::io;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use std::vec;

use socket2::{Domain, Protocol, SockAddr, Socket as RawSocket, Type};
use url::Url;

pub mod mtu;
pub mod pushback;

/// Bidirectional byte stream that can be split into independently owned halves and shut down
/// from any of them.
///
/// Shutting the socket down is the only way to interrupt a thread blocked in [`Read::read`].
pub trait Socket: Read + Write + Send + 'static {
    /// Returns a new handle to the same underlying connection.
    fn try_clone_socket(&self) -> io::Result<Box<dyn Socket>>;

    /// Shuts down both directions of the connection.
    fn shutdown(&self) -> io::Result<()>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

impl Socket for TcpStream {
    fn try_clone_socket(&self) -> io::Result<Box<dyn Socket>> {
        Ok(Box::new(self.try_clone()?))
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }
}

/// Creates connected sockets for the websocket client. Provide a custom implementation to add
/// TLS or any other transport policy.
pub trait SocketFactory: Send + Sync {
    fn connect(&self, connection_info: &ConnectionInfo, timeout: Option<Duration>) -> io::Result<Box<dyn Socket>>;
}

/// Plain TCP socket factory. The socket is blocking, has `TCP_NODELAY` and `SO_KEEPALIVE`
/// enabled and uses `timeout` both when connecting and as the read/write timeout.
#[derive(Debug, Default, Clone)]
pub struct TcpSocketFactory {
    socket_config: Option<fn(&RawSocket) -> io::Result<()>>,
}

impl TcpSocketFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add custom user action used to configure socket before connecting.
    pub fn with_socket_config(self, socket_config: fn(&RawSocket) -> io::Result<()>) -> Self {
        Self {
            socket_config: Some(socket_config),
        }
    }
}

impl SocketFactory for TcpSocketFactory {
    fn connect(&self, connection_info: &ConnectionInfo, timeout: Option<Duration>) -> io::Result<Box<dyn Socket>> {
        if connection_info.secure() {
            return Err(io::Error::other(format!(
                "TcpSocketFactory does not support TLS, provide a SocketFactory for {connection_info}"
            )));
        }

        let socket_addr = connection_info
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::other("unable to resolve socket address"))?;

        let socket = RawSocket::new(Domain::for_address(socket_addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nodelay(true)?;
        socket.set_keepalive(true)?;

        // apply custom options
        if let Some(socket_config) = self.socket_config {
            socket_config(&socket)?;
        }

        let addr = SockAddr::from(socket_addr);
        match timeout {
            Some(timeout) => socket.connect_timeout(&addr, timeout)?,
            None => socket.connect(&addr)?,
        }
        socket.set_read_timeout(timeout)?;
        socket.set_write_timeout(timeout)?;

        let stream: TcpStream = socket.into();
        Ok(Box::new(stream))
    }
}

/// Remote endpoint of a websocket connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    host: String,
    port: u16,
    secure: bool,
}

impl ToSocketAddrs for ConnectionInfo {
    type Iter = vec::IntoIter<SocketAddr>;

    fn to_socket_addrs(&self) -> io::Result<Self::Iter> {
        (self.host.as_str(), self.port).to_socket_addrs()
    }
}

impl Display for ConnectionInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl TryFrom<&Url> for ConnectionInfo {
    type Error = io::Error;

    fn try_from(url: &Url) -> Result<Self, Self::Error> {
        let secure = match url.scheme() {
            "ws" => false,
            "wss" => true,
            scheme => return Err(io::Error::other(format!("unrecognised url scheme: {scheme}"))),
        };
        Ok(ConnectionInfo {
            host: url
                .host_str()
                .ok_or_else(|| io::Error::other("host not present"))?
                .trim_start_matches('[')
                .trim_end_matches(']')
                .to_owned(),
            port: url
                .port_or_known_default()
                .ok_or_else(|| io::Error::other("port not present"))?,
            secure,
        })
    }
}

impl From<(&str, u16)> for ConnectionInfo {
    fn from(host_and_port: (&str, u16)) -> Self {
        let (host, port) = host_and_port;
        Self::new(host, port)
    }
}

impl ConnectionInfo {
    /// Create a new plain connection info from `host` and `port`.
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            host: host.as_ref().to_string(),
            port,
            secure: false,
        }
    }

    /// Marks the connection as requiring TLS.
    pub fn with_secure(self, secure: bool) -> Self {
        Self { secure, ..self }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn secure(&self) -> bool {
        self.secure
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn should_create_connection_info_from_url() {
        let url = Url::parse("ws://127.0.0.1:9001/chat").unwrap();
        let info = ConnectionInfo::try_from(&url).unwrap();
        assert_eq!("127.0.0.1", info.host());
        assert_eq!(9001, info.port());
        assert!(!info.secure());
        assert_eq!("127.0.0.1:9001", info.to_string());
    }

    #[test]
    fn should_use_default_port_for_scheme() {
        let url = Url::parse("wss://example.com/feed").unwrap();
        let info = ConnectionInfo::try_from(&url).unwrap();
        assert_eq!(443, info.port());
        assert!(info.secure());

        let url = Url::parse("ws://example.com").unwrap();
        assert_eq!(80, ConnectionInfo::try_from(&url).unwrap().port());
    }

    #[test]
    fn should_strip_brackets_from_ipv6_host() {
        let url = Url::parse("ws://[::1]:8080/").unwrap();
        let info = ConnectionInfo::try_from(&url).unwrap();
        assert_eq!("::1", info.host());
        assert_eq!(8080, info.port());
    }

    #[test]
    fn should_reject_unknown_scheme() {
        let url = Url::parse("http://example.com/").unwrap();
        assert!(ConnectionInfo::try_from(&url).is_err());
    }

    #[test]
    fn should_refuse_tls_with_plain_factory() {
        let info = ConnectionInfo::new("127.0.0.1", 443).with_secure(true);
        let err = TcpSocketFactory::new()
            .connect(&info, Some(Duration::from_secs(1)))
            .err()
            .expect("expected error");
        assert!(err.to_string().contains("does not support TLS"));
    }

    #[test]
    fn should_connect_with_plain_factory() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let info = ConnectionInfo::new("127.0.0.1", port);

        let factory = TcpSocketFactory::new().with_socket_config(|socket| socket.set_reuse_address(true));
        let socket = factory.connect(&info, Some(Duration::from_secs(1))).unwrap();
        let (_accepted, _) = listener.accept().unwrap();

        assert_eq!(port, socket.peer_addr().unwrap().port());
        let clone = socket.try_clone_socket().unwrap();
        assert_eq!(port, clone.peer_addr().unwrap().port());
        socket.shutdown().unwrap();
    }
}
