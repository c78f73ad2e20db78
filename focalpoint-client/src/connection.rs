//! Websocket connection to a focalpoint peer.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use focalpoint_core::{FocalError, FocalResult};

use crate::config::ClientConfig;

/// An open websocket to a peer.
pub type PeerStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial `peer` (`host:port`) and complete the websocket handshake,
/// offering the configured sub-protocol.
pub async fn connect(config: &ClientConfig, peer: &str) -> FocalResult<PeerStream> {
    let url = config.url_for(peer);
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| FocalError::Transport(format!("Invalid peer address {}: {}", peer, e)))?;
    let protocol = HeaderValue::from_str(&config.subprotocol)
        .map_err(|e| FocalError::Transport(format!("Invalid sub-protocol: {}", e)))?;
    request
        .headers_mut()
        .insert("Sec-WebSocket-Protocol", protocol);

    let connector = match (&config.ca_cert_path, config.use_tls) {
        (Some(path), true) => Some(create_tls_connector(path)?),
        _ => None,
    };

    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);

    let (stream, response) =
        tokio_tungstenite::connect_async_tls_with_config(request, Some(ws_config), true, connector)
            .await
            .map_err(|e| FocalError::Transport(format!("Connection to {} failed: {}", url, e)))?;

    debug!(
        "Handshake with {} complete (protocol {:?})",
        url,
        response.headers().get("Sec-WebSocket-Protocol")
    );
    Ok(stream)
}

/// Create a TLS connector that trusts the CA certificates in `ca_path`.
fn create_tls_connector(ca_path: &Path) -> FocalResult<Connector> {
    let ca_file = File::open(ca_path)
        .map_err(|e| FocalError::Transport(format!("Failed to open CA bundle: {}", e)))?;

    let mut root_store = rustls::RootCertStore::empty();
    for cert in rustls_pemfile::certs(&mut BufReader::new(ca_file)) {
        let cert =
            cert.map_err(|e| FocalError::Transport(format!("Failed to read CA bundle: {}", e)))?;
        root_store
            .add(cert)
            .map_err(|e| FocalError::Transport(format!("Invalid CA certificate: {}", e)))?;
    }
    if root_store.is_empty() {
        return Err(FocalError::Transport(format!(
            "No certificates found in {}",
            ca_path.display()
        )));
    }

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| FocalError::Transport(format!("TLS config error: {}", e)))?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    Ok(Connector::Rustls(Arc::new(config)))
}
