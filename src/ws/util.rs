use url::Url;

use crate::stream::ConnectionInfo;
use crate::ws::Error;

/// Target of a websocket connection resolved from its url.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub connection_info: ConnectionInfo,
    /// Path and query sent in the request line.
    pub endpoint: String,
    /// Value of the `Host` header, the port is only included when the url names one.
    pub host: String,
}

pub fn parse_url(url: &str) -> Result<Target, Error> {
    let url = Url::parse(url)?;
    match url.scheme() {
        "ws" | "wss" => {}
        scheme => return Err(Error::UnsupportedScheme(scheme.to_owned())),
    }
    let connection_info = ConnectionInfo::try_from(&url)?;
    let endpoint = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_owned(),
    };
    let endpoint = if endpoint.is_empty() { "/".to_owned() } else { endpoint };
    let host = url.host_str().unwrap_or_default();
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    Ok(Target {
        connection_info,
        endpoint,
        host,
    })
}
