//! Auxiliary request/response endpoints: health check and model list.
//!
//! Simple wrappers next to the streaming core. The health check applies a
//! fixed short timeout and maps every kind of non-answer to `Unhealthy`
//! instead of propagating; the model list buffers its (possibly chunked)
//! body through the chunk decoder before parsing the JSON envelope.

use crate::decode::ChunkDecoder;
use crate::transport::HttpTransport;
use crate::{Error, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Default paths of the auxiliary endpoints.
pub const HEALTH_PATH: &str = "/api/health";
pub const MODELS_PATH: &str = "/api/models";

/// Handshake deadline for the health probe. Applies only here, never to the
/// long-lived chat stream.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Standard service envelope. `code == 0` means success.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    pub data: Option<T>,
    #[serde(default)]
    pub message: String,
}

/// One available backend as advertised by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model: String,
    pub desc: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// Client for the auxiliary endpoints.
pub struct ServiceClient {
    transport: Arc<HttpTransport>,
    health_path: String,
    models_path: String,
}

impl ServiceClient {
    pub fn new(transport: Arc<HttpTransport>) -> Self {
        Self {
            transport,
            health_path: HEALTH_PATH.to_string(),
            models_path: MODELS_PATH.to_string(),
        }
    }

    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = path.into();
        self
    }

    pub fn with_models_path(mut self, path: impl Into<String>) -> Self {
        self.models_path = path.into();
        self
    }

    /// Probe the backend. Timeout, transport failure, a non-2xx status, an
    /// unparsable body or a non-zero envelope code all read as `Unhealthy`;
    /// nothing propagates.
    pub async fn health(&self) -> HealthStatus {
        match tokio::time::timeout(HEALTH_TIMEOUT, self.fetch_health()).await {
            Ok(Ok(envelope)) if envelope.code == 0 => HealthStatus::Healthy,
            Ok(Ok(envelope)) => {
                tracing::debug!(code = envelope.code, "health probe returned non-zero code");
                HealthStatus::Unhealthy
            }
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "health probe failed");
                HealthStatus::Unhealthy
            }
            Err(_) => {
                tracing::debug!("health probe timed out");
                HealthStatus::Unhealthy
            }
        }
    }

    async fn fetch_health(&self) -> Result<ApiEnvelope<serde_json::Value>> {
        let resp = self.transport.get(&self.health_path).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::open(status.as_u16(), "health endpoint"));
        }
        let envelope = resp.json().await?;
        Ok(envelope)
    }

    /// Fetch the list of available model descriptors.
    ///
    /// The body may arrive in several chunks (and may split multi-byte
    /// characters in descriptions), so it is fully buffered through the
    /// chunk decoder before the envelope is parsed.
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>> {
        let resp = self.transport.get(&self.models_path).await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::open(status.as_u16(), message));
        }

        let mut decoder = ChunkDecoder::new();
        let mut body = String::new();
        let mut chunks = HttpTransport::into_byte_stream(resp);
        while let Some(chunk) = chunks.next().await {
            body.push_str(&decoder.feed(&chunk?));
        }
        body.push_str(&decoder.flush());

        let envelope: ApiEnvelope<Vec<ModelDescriptor>> = serde_json::from_str(&body)?;
        if envelope.code != 0 {
            return Err(Error::Envelope {
                code: envelope.code,
                message: envelope.message,
            });
        }
        Ok(envelope.data.unwrap_or_default())
    }
}
