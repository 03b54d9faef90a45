//! Hosted datastore probe
//!
//! Runs a one-row read against a known collection through the datastore's
//! REST interface (`/rest/v1/<collection>?select=*&limit=1`).

use super::{DatastoreSnafu, MissingEndpointSnafu, ProbeError, Prober, RequestSnafu, join_url};
use crate::connection::ConnectionEntry;
use crate::domain::DatastoreConfig;
use async_trait::async_trait;
use snafu::{OptionExt, ResultExt};

#[derive(Debug, Clone)]
pub struct DatastoreProber {
    client: reqwest::Client,
    config: DatastoreConfig,
}

impl DatastoreProber {
    pub fn new(config: DatastoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// URL of the minimal read query, if a datastore is configured
    pub fn query_url(&self) -> Option<String> {
        let base = self.config.url.as_deref().filter(|u| !u.is_empty())?;
        Some(join_url(
            base,
            &format!("rest/v1/{}?select=*&limit=1", self.config.collection),
        ))
    }
}

#[async_trait]
impl Prober for DatastoreProber {
    async fn probe(&self, entry: &ConnectionEntry) -> Result<(), ProbeError> {
        let url = self
            .query_url()
            .context(MissingEndpointSnafu { id: &entry.id })?;

        let mut request = self.client.get(&url).timeout(entry.timeout());
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.header("apikey", key).bearer_auth(key);
        }

        let response = request.send().await.context(RequestSnafu { url: &url })?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        DatastoreSnafu {
            status: status.as_u16(),
            message,
        }
        .fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::TransportKind;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one request with `status`, handing the raw request back
    async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = vec![0u8; 4096];
            let n = socket.read(&mut buf).await.unwrap_or(0);
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        (format!("http://{addr}"), handle)
    }

    fn entry() -> ConnectionEntry {
        ConnectionEntry::new("supabase", "Supabase", TransportKind::HostedDatastore)
            .with_timeout(Duration::from_secs(2))
    }

    fn config(url: &str) -> DatastoreConfig {
        DatastoreConfig {
            url: Some(url.to_string()),
            api_key: Some("anon-key".to_string()),
            collection: "adapters".to_string(),
        }
    }

    #[test]
    fn test_query_url() {
        let prober = DatastoreProber::new(config("https://db.example.co/"));
        assert_eq!(
            prober.query_url().as_deref(),
            Some("https://db.example.co/rest/v1/adapters?select=*&limit=1")
        );

        let prober = DatastoreProber::new(DatastoreConfig::default());
        assert!(prober.query_url().is_none());
    }

    #[tokio::test]
    async fn test_successful_query_sends_credentials() {
        let (base, server) = serve_once("200 OK", "[]").await;
        DatastoreProber::new(config(&base))
            .probe(&entry())
            .await
            .expect("probe");

        let request = server.await.expect("server task").to_lowercase();
        assert!(request.starts_with("get /rest/v1/adapters?select=*&limit=1 "));
        assert!(request.contains("apikey: anon-key"));
        assert!(request.contains("authorization: bearer anon-key"));
    }

    #[tokio::test]
    async fn test_query_error_reports_body() {
        let (base, _server) = serve_once("401 Unauthorized", "invalid api key").await;
        let err = DatastoreProber::new(config(&base))
            .probe(&entry())
            .await
            .expect_err("probe should fail");

        match err {
            ProbeError::Datastore { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_datastore_fails() {
        let err = DatastoreProber::new(DatastoreConfig::default())
            .probe(&entry())
            .await
            .expect_err("probe should fail");
        assert!(matches!(err, ProbeError::MissingEndpoint { .. }));
    }
}
