//! Outbound connection to the voice agent.
//!
//! Every call dials its own agent socket at `{base}/ws/{bridge_id}?is_audio=true`
//! and never shares or reconnects it.

use crate::error::BridgeError;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use uuid::Uuid;

pub type AgentStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Agent session address for one bridge.
pub fn session_url(base_url: &str, bridge_id: &Uuid) -> String {
    format!("{}/ws/{}?is_audio=true", base_url.trim_end_matches('/'), bridge_id)
}

/// Open the agent socket, giving up after `timeout`.
pub async fn connect(url: &str, timeout: Duration) -> Result<AgentStream, BridgeError> {
    debug!(url, "Dialing voice agent");
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((stream, response))) => {
            debug!(status = %response.status(), "Agent handshake complete");
            Ok(stream)
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(BridgeError::Timeout(timeout)),
    }
}
