use std::time::Duration;

use ansi_term::Color::{Green, Purple, Red, Yellow};
use framelink::ws::{Config, Error, Listener, ListenerResult, Session, WebsocketClient};
use log::{error, info};

struct EchoListener;

impl Listener for EchoListener {
    fn on_open(&self, client: &WebsocketClient, session: &Session) {
        info!(
            "{} connected to {} ({:?})",
            Green.paint("open"),
            client.connection_info(),
            session.accepted_protocol()
        );
    }

    fn on_closed(&self, client: &WebsocketClient) {
        info!("{} {}", Yellow.paint("closed"), client.connection_info());
    }

    fn on_text(&self, _client: &WebsocketClient, text: &str) -> ListenerResult {
        info!("({}) {}", text.len(), Purple.paint(text));
        Ok(())
    }

    fn on_binary(&self, _client: &WebsocketClient, bytes: &[u8]) -> ListenerResult {
        info!("({}) {}", bytes.len(), Purple.paint(format!("{bytes:02x?}")));
        Ok(())
    }

    fn on_exception(&self, _client: &WebsocketClient, error: &Error) {
        error!("{}", Red.paint(error.to_string()));
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "ws://127.0.0.1:9001/".to_owned());
    let client = WebsocketClient::builder(&url)?
        .with_listener(EchoListener)
        .with_config(Config::default().with_keepalive_interval(Some(Duration::from_secs(5))))
        .build()?;
    client.connect()?;

    for i in 0..5 {
        client.send_text(&format!("hello #{i}"))?;
        std::thread::sleep(Duration::from_millis(200));
    }
    client.send_binary(&[0xde, 0xad, 0xbe, 0xef])?;
    // larger than the mtu, goes out fragmented
    client.send_text(&"x".repeat(64 * 1024))?;

    std::thread::sleep(Duration::from_secs(1));
    client.close();
    client.wait_for();
    Ok(())
}
