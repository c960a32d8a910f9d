use std::io;
use std::sync::Arc;
use uuid::Uuid;
use websockify::broker::{Broker, Plugins};
use websockify::config::ServerConfig;
use websockify::plugins::TokenFileResolver;
use websockify::stream;
use tokio::net::TcpListener;

/// Illustrative binary: hardcodes its listen address, token file and plugin
/// wiring rather than parsing arguments or daemonizing — the process harness
/// (fork, systemd socket activation) is left to the deployer.
#[tokio::main]
pub async fn main() -> io::Result<()> {
    env_logger::init();

    let config = Arc::new(ServerConfig::default());
    let plugins = Arc::new(Plugins {
        token_resolver: Arc::new(TokenFileResolver::new("./tokens.conf", false)),
        origin_validator: None,
        auth_validator: None,
        interceptor: None,
    });
    let broker = Arc::new(Broker::new(config, plugins));

    let listener = TcpListener::bind("127.0.0.1:6080").await?;
    log::info!("websockify listening on 127.0.0.1:6080");

    loop {
        let (socket, peer) = listener.accept().await?;
        let broker = Arc::clone(&broker);
        let tls = broker.config().tls.clone();
        let keepalive = broker.config().tcp_keepalive.clone();
        let connection_id = Uuid::new_v4().to_string();

        if let Err(e) = stream::apply_keepalive(&socket, &keepalive) {
            log::warn!("failed to set keepalive on connection from {peer}: {e}");
        }

        tokio::spawn(async move {
            log::debug!("accepted connection {connection_id} from {peer}");
            let transport = match stream::sniff_and_wrap(socket, tls.as_ref()).await {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("connection {connection_id} rejected during TLS sniff: {e}");
                    return;
                }
            };
            if let Err(e) = broker.handle(transport, &connection_id).await {
                log::warn!("connection {connection_id} ended with an error: {e}");
            }
        });
    }
}
