//! Transmitters available to the agent

use crate::config::{TransmitterKind, TransmitterSettings};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bridge_lib::transmit::series_count;
use bridge_lib::{NormalizedPoint, SendOutcome, Transmitter};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Longest response body quoted in a failure
const MAX_ERROR_BODY: usize = 200;

#[derive(Serialize)]
struct ImportPayload<'a> {
    source: &'a str,
    series_count: usize,
    points: &'a [NormalizedPoint],
}

/// POSTs each batch as JSON to a remote time-series endpoint
pub struct HttpTransmitter {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    source: String,
}

impl HttpTransmitter {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
        source: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token,
            source: source.into(),
        })
    }
}

#[async_trait]
impl Transmitter for HttpTransmitter {
    async fn send(&self, batch: &[NormalizedPoint]) -> SendOutcome {
        let payload = ImportPayload {
            source: &self.source,
            series_count: series_count(batch),
            points: batch,
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return SendOutcome::timeout(format!("request timed out: {}", e))
            }
            Err(e) => return SendOutcome::failure(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_success() {
            debug!(points = batch.len(), status = %status, "Batch accepted by endpoint");
            return SendOutcome::Success;
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        SendOutcome::failure(format!("HTTP {}: {}", status, body))
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Logs each batch and reports success
#[derive(Debug, Default)]
pub struct LogTransmitter;

#[async_trait]
impl Transmitter for LogTransmitter {
    async fn send(&self, batch: &[NormalizedPoint]) -> SendOutcome {
        info!(
            points = batch.len(),
            series = series_count(batch),
            first_signal = batch.first().map(|p| p.signal_id.as_str()).unwrap_or(""),
            "Transmitting batch"
        );
        for point in batch {
            debug!(
                signal_id = %point.signal_id,
                value = point.value,
                priority = %point.priority,
                timestamp = %point.timestamp,
                "Point"
            );
        }
        SendOutcome::Success
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Build the transmitter named by the settings
pub fn build(settings: &TransmitterSettings, source: &str) -> Result<Arc<dyn Transmitter>> {
    match settings.kind {
        TransmitterKind::Log => Ok(Arc::new(LogTransmitter)),
        TransmitterKind::Http => {
            let endpoint = settings
                .endpoint
                .clone()
                .ok_or_else(|| anyhow!("transmitter.endpoint is required for the http transmitter"))?;
            let transmitter = HttpTransmitter::new(
                endpoint,
                settings.token.clone(),
                Duration::from_secs(settings.request_timeout_secs),
                source,
            )?;
            Ok(Arc::new(transmitter))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn batch() -> Vec<NormalizedPoint> {
        vec![
            NormalizedPoint::new("sensor.kitchen_temp", 21.5, Utc::now()),
            NormalizedPoint::new("sensor.kitchen_temp", 21.7, Utc::now()),
            NormalizedPoint::new("sensor.hall_humidity", 48.0, Utc::now()),
        ]
    }

    #[tokio::test]
    async fn test_http_transmitter_posts_batch_with_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/import")
            .match_header("authorization", "Bearer s3cret")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"source":"bridge-test","series_count":2}"#.to_string(),
            ))
            .with_status(204)
            .create_async()
            .await;

        let transmitter = HttpTransmitter::new(
            format!("{}/import", server.url()),
            Some("s3cret".to_string()),
            Duration::from_secs(5),
            "bridge-test",
        )
        .unwrap();

        let outcome = transmitter.send(&batch()).await;
        assert!(outcome.is_success());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_transmitter_reports_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/import")
            .with_status(503)
            .with_body("store unavailable")
            .create_async()
            .await;

        let transmitter = HttpTransmitter::new(
            format!("{}/import", server.url()),
            None,
            Duration::from_secs(5),
            "bridge-test",
        )
        .unwrap();

        match transmitter.send(&batch()).await {
            SendOutcome::Failure(detail) => {
                assert!(detail.contains("503"));
                assert!(detail.contains("store unavailable"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_transmitter_reports_timeout() {
        // accepts connections into the backlog but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let transmitter = HttpTransmitter::new(
            format!("http://{}/import", addr),
            None,
            Duration::from_millis(200),
            "bridge-test",
        )
        .unwrap();

        let outcome = transmitter.send(&batch()).await;
        assert!(outcome.is_timeout(), "unexpected outcome {:?}", outcome);
        drop(listener);
    }

    #[tokio::test]
    async fn test_log_transmitter_always_succeeds() {
        let outcome = LogTransmitter.send(&batch()).await;
        assert!(outcome.is_success());
    }

    #[test]
    fn test_build_http_requires_endpoint() {
        let settings = TransmitterSettings {
            kind: TransmitterKind::Http,
            ..Default::default()
        };
        assert!(build(&settings, "bridge").is_err());
    }

    #[test]
    fn test_build_defaults_to_log() {
        let transmitter = build(&TransmitterSettings::default(), "bridge").unwrap();
        assert_eq!(transmitter.name(), "log");
    }
}
