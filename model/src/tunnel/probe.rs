use super::error::{self, Result};
use futures::future::join_all;
use log::{info, warn};
use serde::Serialize;
use snafu::ResultExt;
use std::time::Duration;

/// The result of one liveness probe. Probes are diagnostic only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub id: String,
    pub url: String,
    /// The HTTP status, if a response arrived.
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl ProbeOutcome {
    /// Any HTTP response counts as reachable; the tunnel works even if the service answers with an
    /// error status.
    pub fn reachable(&self) -> bool {
        self.status.is_some()
    }
}

/// Issues bounded HTTP GET requests against tunneled endpoints.
#[derive(Debug, Clone)]
pub struct LivenessProber {
    client: reqwest::Client,
}

impl LivenessProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context(error::HttpClientSnafu)?;
        Ok(Self { client })
    }

    /// Probe every `(id, url)` pair concurrently and log the results.
    pub async fn probe_all(&self, targets: Vec<(String, String)>) -> Vec<ProbeOutcome> {
        join_all(
            targets
                .into_iter()
                .map(|(id, url)| async move { self.probe(id, url).await }),
        )
        .await
    }

    pub async fn probe(&self, id: String, url: String) -> ProbeOutcome {
        let outcome = match self.client.get(&url).send().await {
            Ok(response) => ProbeOutcome {
                status: Some(response.status().as_u16()),
                error: None,
                id,
                url,
            },
            Err(e) => ProbeOutcome {
                status: None,
                error: Some(e.to_string()),
                id,
                url,
            },
        };
        match (&outcome.status, &outcome.error) {
            (Some(status), _) => info!("Probe '{}' {}: HTTP {}", outcome.id, outcome.url, status),
            (None, error) => warn!(
                "Probe '{}' {} failed: {}",
                outcome.id,
                outcome.url,
                error.as_deref().unwrap_or_default()
            ),
        }
        outcome
    }
}
