//! WebSocket probe
//!
//! Liveness is the completed opening handshake. The socket is closed right
//! away; this never holds a persistent connection.

use super::{MissingEndpointSnafu, ProbeError, Prober, WebSocketSnafu};
use crate::connection::ConnectionEntry;
use async_trait::async_trait;
use snafu::{OptionExt, ResultExt};
use tokio_tungstenite::connect_async;

#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketProber;

impl WebSocketProber {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Prober for WebSocketProber {
    async fn probe(&self, entry: &ConnectionEntry) -> Result<(), ProbeError> {
        let url = entry
            .endpoint
            .as_deref()
            .context(MissingEndpointSnafu { id: &entry.id })?;

        let (mut stream, _response) = connect_async(url)
            .await
            .context(WebSocketSnafu { url })?;

        if let Err(e) = stream.close(None).await {
            tracing::debug!("{}: closing probe socket failed: {}", entry.id, e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TransportKind;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn entry(endpoint: &str) -> ConnectionEntry {
        ConnectionEntry::new("websocket", "Realtime", TransportKind::Websocket)
            .with_endpoint(endpoint)
            .with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_handshake_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(socket)
                .await
                .expect("server handshake");
            // Drain until the probe closes
            use futures::StreamExt;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let result = WebSocketProber::new()
            .probe(&entry(&format!("ws://{addr}")))
            .await;
        assert!(result.is_ok());

        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("server finished")
            .expect("server task");
    }

    #[tokio::test]
    async fn test_refused_connection_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let err = WebSocketProber::new()
            .probe(&entry(&format!("ws://{addr}")))
            .await
            .expect_err("probe should fail");
        assert!(matches!(err, ProbeError::WebSocket { .. }));
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let entry = ConnectionEntry::new("websocket", "Realtime", TransportKind::Websocket);
        let err = WebSocketProber::new()
            .probe(&entry)
            .await
            .expect_err("probe should fail");
        assert!(matches!(err, ProbeError::MissingEndpoint { .. }));
    }
}
