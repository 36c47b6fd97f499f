use std::io;
use std::io::{Read, Write};

use base64::engine::general_purpose;
use base64::Engine;
use http::header::{
    CONNECTION, HOST, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION, UPGRADE, USER_AGENT,
};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use httparse::{ParserConfig, Response};
use log::debug;
use memchr::memmem;

use crate::stream::pushback::PushbackStream;
use crate::ws::error::HandshakeError;
use crate::ws::listener::Session;
use crate::ws::Error;

/// Hard cap on the status line and header block of the handshake response.
pub const MAX_HANDSHAKE_LENGTH: usize = 16 * 1024;
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Upgrade request sent to the server.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    path: String,
    headers: HeaderMap,
}

impl HandshakeRequest {
    /// Builds the request. `host` and `user_agent` can be overridden by `additional_headers`,
    /// the upgrade headers, the key and the requested `protocols` cannot.
    pub fn new(
        path: impl Into<String>,
        host: &str,
        user_agent: &str,
        additional_headers: &HeaderMap,
        protocols: &[String],
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::with_capacity(8 + additional_headers.len());
        headers.insert(HOST, header_value(host)?);
        headers.insert(USER_AGENT, header_value(user_agent)?);

        // override
        for name in additional_headers.keys() {
            headers.remove(name);
            for value in additional_headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        // these must not be overridden
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("13"));
        headers.insert(SEC_WEBSOCKET_KEY, header_value(&generate_nonce())?);
        headers.remove(SEC_WEBSOCKET_PROTOCOL);
        if !protocols.is_empty() {
            headers.insert(SEC_WEBSOCKET_PROTOCOL, header_value(&protocols.join(", "))?);
        }

        Ok(Self {
            path: path.into(),
            headers,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Writes the request line and headers followed by an empty line and flushes.
    pub fn write_to<S: Write>(&self, stream: &mut S) -> io::Result<()> {
        let mut request = Vec::with_capacity(256);
        request.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.path).as_bytes());
        for (name, value) in &self.headers {
            request.extend_from_slice(name.as_str().as_bytes());
            request.extend_from_slice(b": ");
            request.extend_from_slice(value.as_bytes());
            request.extend_from_slice(b"\r\n");
        }
        request.extend_from_slice(b"\r\n");
        stream.write_all(&request)?;
        stream.flush()
    }
}

/// Reads the handshake response and validates the protocol switch. Bytes received after the
/// header block belong to the first frames and are pushed back onto the `stream`.
pub fn read_response<S: Read>(stream: &mut PushbackStream<S>, read_size: usize) -> Result<Session, Error> {
    let read_size = read_size.max(1);
    let mut scratch = vec![0u8; MAX_HANDSHAKE_LENGTH];
    let mut limit = 0;
    let finder = memmem::Finder::new(HEADER_TERMINATOR);

    let header_length = loop {
        if limit == scratch.len() {
            return Err(HandshakeError::ResponseTooLarge(MAX_HANDSHAKE_LENGTH).into());
        }
        let to_read = read_size.min(scratch.len() - limit);
        let read = stream.read(&mut scratch[limit..limit + to_read])?;
        if read == 0 {
            return Err(HandshakeError::UnexpectedEof.into());
        }
        // the terminator may straddle the previous read
        let search_from = limit.saturating_sub(HEADER_TERMINATOR.len() - 1);
        limit += read;
        if let Some(pos) = finder.find(&scratch[search_from..limit]) {
            break search_from + pos + HEADER_TERMINATOR.len();
        }
    };

    stream.push_back(&scratch[header_length..limit]);
    debug!(
        "handshake response received: {} header bytes, {} bytes pushed back",
        header_length,
        limit - header_length
    );
    parse_response(&scratch[..header_length])
}

fn parse_response(bytes: &[u8]) -> Result<Session, Error> {
    // every header occupies at least one line
    let mut headers = vec![httparse::EMPTY_HEADER; memchr::memchr_iter(b'\n', bytes).count()];
    let mut response = Response::new(&mut headers);
    let status = ParserConfig::default()
        .allow_obsolete_multiline_headers_in_responses(true)
        .parse_response(&mut response, bytes)
        .map_err(HandshakeError::Malformed)?;
    if status.is_partial() {
        return Err(HandshakeError::Malformed(httparse::Error::Status).into());
    }

    let code = response.code.unwrap_or_default();
    let reason = response.reason.unwrap_or_default().to_owned();
    if code != StatusCode::SWITCHING_PROTOCOLS.as_u16() {
        return Err(HandshakeError::UnexpectedStatus(code, reason).into());
    }
    let status = StatusCode::from_u16(code).map_err(|err| HandshakeError::InvalidHeader(err.to_string()))?;

    let mut header_map = HeaderMap::with_capacity(response.headers.len());
    for header in response.headers.iter() {
        if header.name.is_empty() {
            return Err(HandshakeError::InvalidHeader("header key was blank".to_owned()).into());
        }
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|err| HandshakeError::InvalidHeader(format!("{}: {err}", header.name)))?;
        let value = HeaderValue::from_bytes(&unfold(header.value))
            .map_err(|err| HandshakeError::InvalidHeader(format!("{}: {err}", header.name)))?;
        header_map.append(name, value);
    }

    let accepted_protocol = header_map
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty());

    Ok(Session::new(
        format!("HTTP/1.{}", response.version.unwrap_or(1)),
        status,
        reason,
        header_map,
        accepted_protocol,
    ))
}

/// Joins folded header lines, each line break and the indentation that follows it become a
/// single space.
fn unfold(value: &[u8]) -> Vec<u8> {
    let mut unfolded = Vec::with_capacity(value.len());
    let mut lines = value.split(|&b| b == b'\n').peekable();
    while let Some(line) = lines.next() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = if unfolded.is_empty() { line } else { line.trim_ascii_start() };
        unfolded.extend_from_slice(line);
        if lines.peek().is_some() {
            unfolded.push(b' ');
        }
    }
    unfolded.trim_ascii_end().to_vec()
}

fn header_value(value: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(value).map_err(|_| Error::InvalidHeader(value.to_owned()))
}

fn generate_nonce() -> String {
    let nonce_bytes: [u8; 16] = rand::random();
    general_purpose::STANDARD.encode(nonce_bytes)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn request(additional: &HeaderMap, protocols: &[String]) -> String {
        let request = HandshakeRequest::new("/chat?room=1", "example.com:9001", "framelink", additional, protocols).unwrap();
        let mut out = Vec::new();
        request.write_to(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn response_stream(response: &[u8]) -> PushbackStream<Cursor<Vec<u8>>> {
        PushbackStream::new(Cursor::new(response.to_vec()))
    }

    #[test]
    fn should_write_upgrade_request() {
        let request = request(&HeaderMap::new(), &[]);
        assert!(request.starts_with("GET /chat?room=1 HTTP/1.1\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
        assert!(request.contains("host: example.com:9001\r\n"));
        assert!(request.contains("user-agent: framelink\r\n"));
        assert!(request.contains("connection: Upgrade\r\n"));
        assert!(request.contains("upgrade: websocket\r\n"));
        assert!(request.contains("sec-websocket-version: 13\r\n"));
        assert!(!request.contains("sec-websocket-protocol"));
    }

    #[test]
    fn should_generate_16_byte_key() {
        let request = HandshakeRequest::new("/", "localhost", "framelink", &HeaderMap::new(), &[]).unwrap();
        let key = request.headers().get(SEC_WEBSOCKET_KEY).unwrap().to_str().unwrap();
        assert_eq!(16, general_purpose::STANDARD.decode(key).unwrap().len());

        let other = HandshakeRequest::new("/", "localhost", "framelink", &HeaderMap::new(), &[]).unwrap();
        assert_ne!(request.headers().get(SEC_WEBSOCKET_KEY), other.headers().get(SEC_WEBSOCKET_KEY));
    }

    #[test]
    fn should_let_caller_override_defaults_but_not_upgrade_headers() {
        let mut additional = HeaderMap::new();
        additional.insert(USER_AGENT, HeaderValue::from_static("custom-agent"));
        additional.insert(HOST, HeaderValue::from_static("other.example.com"));
        additional.insert(UPGRADE, HeaderValue::from_static("h2c"));
        additional.insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static("8"));
        additional.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("sneaky"));
        additional.insert("x-api-key", HeaderValue::from_static("secret"));

        let request = request(&additional, &["chat".to_owned(), "superchat".to_owned()]);
        assert!(request.contains("user-agent: custom-agent\r\n"));
        assert!(request.contains("host: other.example.com\r\n"));
        assert!(request.contains("x-api-key: secret\r\n"));
        assert!(request.contains("upgrade: websocket\r\n"));
        assert!(request.contains("sec-websocket-version: 13\r\n"));
        assert!(request.contains("sec-websocket-protocol: chat, superchat\r\n"));
        assert!(!request.contains("h2c"));
        assert!(!request.contains("sneaky"));
    }

    #[test]
    fn should_parse_switching_protocols_response() {
        let mut stream = response_stream(
            b"HTTP/1.1 101 Switching Protocols\r\n\
              Upgrade: websocket\r\n\
              Connection: Upgrade\r\n\
              Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
              Sec-WebSocket-Protocol: chat\r\n\r\n",
        );
        let session = read_response(&mut stream, 1440).unwrap();
        assert_eq!("HTTP/1.1", session.http_version());
        assert_eq!(StatusCode::SWITCHING_PROTOCOLS, session.status());
        assert_eq!("Switching Protocols", session.reason());
        assert_eq!(Some("chat"), session.accepted_protocol());
        assert_eq!(session.headers().get("upgrade").unwrap(), "websocket");
        assert_eq!(session.headers().get("UPGRADE").unwrap(), "websocket");
        assert_eq!(0, stream.pushed_back());
    }

    #[test]
    fn should_accept_response_with_many_headers() {
        let mut response = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n".to_vec();
        for i in 0..100 {
            response.extend_from_slice(format!("X-H{i}: v\r\n").as_bytes());
        }
        response.extend_from_slice(b"\r\n");

        let session = read_response(&mut response_stream(&response), 1440).unwrap();
        assert_eq!(101, session.headers().len());
        assert_eq!(session.headers().get("x-h99").unwrap(), "v");
    }

    #[test]
    fn should_push_back_bytes_after_header_block() {
        let mut stream = response_stream(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n\x81\x02hi");
        let session = read_response(&mut stream, 1440).unwrap();
        assert_eq!(None, session.accepted_protocol());
        assert_eq!(4, stream.pushed_back());

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(b"\x81\x02hi", rest.as_slice());
    }

    #[test]
    fn should_find_terminator_across_small_reads() {
        let mut stream = response_stream(b"HTTP/1.1 101 OK\r\nUpgrade: websocket\r\n\r\n\x8a\x00");
        read_response(&mut stream, 3).unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(b"\x8a\x00", rest.as_slice());
    }

    #[test]
    fn should_fold_continuation_lines() {
        let mut stream = response_stream(
            b"HTTP/1.1 101 Switching Protocols\r\nX-Folded: value-1,\r\n  value-2\r\n\tvalue-3\r\nUpgrade: websocket\r\n\r\n",
        );
        let session = read_response(&mut stream, 1440).unwrap();
        assert_eq!(session.headers().get("x-folded").unwrap(), "value-1, value-2 value-3");
        assert_eq!(session.headers().get("upgrade").unwrap(), "websocket");
    }

    #[test]
    fn should_reject_non_101_status() {
        let mut stream = response_stream(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n");
        match read_response(&mut stream, 1440) {
            Err(Error::Handshake(HandshakeError::UnexpectedStatus(code, reason))) => {
                assert_eq!(403, code);
                assert_eq!("Forbidden", reason);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn should_reject_oversized_response() {
        let mut response = b"HTTP/1.1 101 Switching Protocols\r\nX-Padding: ".to_vec();
        response.extend(std::iter::repeat_n(b'a', MAX_HANDSHAKE_LENGTH));
        let mut stream = response_stream(&response);
        assert!(matches!(
            read_response(&mut stream, 1440),
            Err(Error::Handshake(HandshakeError::ResponseTooLarge(MAX_HANDSHAKE_LENGTH)))
        ));
    }

    #[test]
    fn should_reject_empty_header_key() {
        let mut stream = response_stream(b"HTTP/1.1 101 Switching Protocols\r\n: value\r\n\r\n");
        assert!(matches!(read_response(&mut stream, 1440), Err(Error::Handshake(_))));
    }

    #[test]
    fn should_reject_truncated_response() {
        let mut stream = response_stream(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: webs");
        assert!(matches!(
            read_response(&mut stream, 1440),
            Err(Error::Handshake(HandshakeError::UnexpectedEof))
        ));
    }

    #[test]
    fn should_unfold_header_values() {
        assert_eq!(b"a".to_vec(), unfold(b"a"));
        assert_eq!(b"a, b".to_vec(), unfold(b"a,\r\n   b"));
        assert_eq!(b"a b".to_vec(), unfold(b"a\r\n\tb  "));
    }
}
