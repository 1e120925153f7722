//! Shared HTTP client construction and byte-stream access.
//!
//! One [`HttpTransport`] is built per backend aggregation endpoint and shared
//! by the streaming client and the auxiliary service calls. The client itself
//! carries no global timeout: the chat stream is long-lived and ends only on
//! natural completion or explicit cancel. Callers that need a deadline (the
//! health check) apply it per call.

use crate::{BoxStream, Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use std::time::Duration;
use url::Url;

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)?;

        // Conservative pool and HTTP/2 keepalive defaults for long-lived
        // connections.
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(Error::from)
    }

    /// Open the streaming request. The response is returned as-is so the
    /// caller can route the handshake status before touching the body.
    pub async fn post_stream(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response> {
        let url = self.resolve(path)?;
        let resp = self
            .client
            .post(url)
            .json(body)
            .header("accept", "text/event-stream")
            .send()
            .await?;
        Ok(resp)
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = self.resolve(path)?;
        let resp = self.client.get(url).send().await?;
        Ok(resp)
    }

    /// Convert a response body into the crate's unified byte stream.
    pub fn into_byte_stream(resp: reqwest::Response) -> BoxStream<'static, Bytes> {
        Box::pin(resp.bytes_stream().map_err(Error::Transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            HttpTransport::new("not a url"),
            Err(Error::Endpoint(_))
        ));
    }

    #[test]
    fn resolves_paths_against_base() {
        let t = HttpTransport::new("http://localhost:8080").unwrap();
        let url = t.resolve("/api/chat/stream").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/chat/stream");
    }
}
