//! Endpoint transports
//!
//! Actors talk to the outside world only through [`MetricsSource`] and
//! [`MetricsSink`]. The HTTP implementations reuse one `reqwest::Client` per
//! endpoint and put a timeout on every request so no actor blocks forever.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::trace;

use crate::{error::TransportError, record::DeliveryEnvelope};

/// Where fetchers pull raw metric payloads from
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Human readable endpoint description for logs and snapshot metadata
    fn describe(&self) -> String;

    /// Fetch one raw payload
    async fn fetch(&self) -> Result<Value, TransportError>;
}

/// Where pushers deliver records to
#[async_trait]
pub trait MetricsSink: Send + Sync {
    fn describe(&self) -> String;

    /// Deliver one record; `Ok` only when the destination acknowledged it
    async fn deliver(&self, envelope: &DeliveryEnvelope<'_>) -> Result<(), TransportError>;
}

fn metrics_url(base: &str) -> String {
    format!("{}/metrics", base.trim_end_matches('/'))
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, TransportError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| TransportError::Client(e.to_string()))
}

/// `GET <base>/metrics`
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    url: String,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: metrics_url(base_url),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MetricsSource for HttpSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch(&self) -> Result<Value, TransportError> {
        trace!("requesting metrics from {}", self.url);

        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// `POST <base>/metrics` with one delivery envelope as JSON body
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: metrics_url(base_url),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl MetricsSink for HttpSink {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn deliver(&self, envelope: &DeliveryEnvelope<'_>) -> Result<(), TransportError> {
        trace!(id = %envelope.record.id, "delivering record to {}", self.url);

        let response = self.client.post(&self.url).json(envelope).send().await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            status => Err(TransportError::Status(status.as_u16())),
        }
    }
}
