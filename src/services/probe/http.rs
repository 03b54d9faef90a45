//! HTTP API probe
//!
//! `GET <endpoint>/health`; if that fails for any reason other than a
//! timeout, `GET <endpoint>/<fallback_path>` where 2xx or 401 both count as
//! alive. A 401 means the service answered, it just wants credentials.

use super::{HttpStatusSnafu, MissingEndpointSnafu, ProbeError, Prober, RequestSnafu, join_url};
use crate::connection::ConnectionEntry;
use crate::constants::{API_FALLBACK_PATH, HEALTH_PATH};
use async_trait::async_trait;
use reqwest::StatusCode;
use snafu::{OptionExt, ResultExt};

/// Probe for the backend HTTP API
#[derive(Debug, Clone)]
pub struct HttpApiProber {
    client: reqwest::Client,
    fallback_path: String,
}

impl HttpApiProber {
    pub fn new(fallback_path: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            fallback_path: fallback_path.into(),
        }
    }

    pub fn fallback_path(&self) -> &str {
        &self.fallback_path
    }
}

impl Default for HttpApiProber {
    fn default() -> Self {
        Self::new(API_FALLBACK_PATH)
    }
}

#[async_trait]
impl Prober for HttpApiProber {
    async fn probe(&self, entry: &ConnectionEntry) -> Result<(), ProbeError> {
        let base = entry
            .endpoint
            .as_deref()
            .context(MissingEndpointSnafu { id: &entry.id })?;

        let health_url = join_url(base, HEALTH_PATH);
        match self
            .client
            .get(&health_url)
            .timeout(entry.timeout())
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => return Ok(()),
            Ok(response) => {
                tracing::debug!(
                    "{}: {} returned {}, trying fallback",
                    entry.id,
                    health_url,
                    response.status()
                );
            }
            Err(e) if e.is_timeout() => {
                return Err(ProbeError::Timeout {
                    after: entry.timeout(),
                });
            }
            Err(e) => {
                tracing::debug!("{}: {} failed ({}), trying fallback", entry.id, health_url, e);
            }
        }

        let fallback_url = join_url(base, &self.fallback_path);
        let response = self
            .client
            .get(&fallback_url)
            .timeout(entry.timeout())
            .send()
            .await
            .context(RequestSnafu { url: &fallback_url })?;

        let status = response.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            HttpStatusSnafu {
                url: fallback_url,
                status: status.as_u16(),
            }
            .fail()
        }
    }
}
