//! Cancellable SSE client with per-model event demultiplexing.
//!
//! One [`EventStreamClient::open`] call owns one long-lived streaming request.
//! Records arrive tagged with a model identifier in the `event:` field; the
//! tag is validated against the closed set of known backends and routed to
//! the handler in wire order. Unknown tags are dropped here, before any state
//! exists that could leak them.
//!
//! Callback contract (enforced, not best-effort):
//! - a non-success handshake fires `on_open_error` exactly once, never
//!   `on_message`
//! - a success handshake fires `on_open` exactly once before any message
//! - end-of-stream fires `on_close` exactly once; a mid-stream transport
//!   failure fires `on_error` exactly once
//! - after the returned [`CancelHandle`] is cancelled, no callback fires at
//!   all, even for bytes already in flight

use crate::decode::ChunkDecoder;
use crate::transport::HttpTransport;
use crate::Error;
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Typed callbacks for one streaming request.
///
/// The transport delivers records serialized, so the handler is `&mut self`
/// and never invoked concurrently.
pub trait StreamHandler: Send + 'static {
    fn on_open(&mut self) {}

    /// One record, delivered verbatim in wire-arrival order. `model` is
    /// guaranteed to be a member of the known set.
    fn on_message(&mut self, model: &str, delta: &str);

    fn on_open_error(&mut self, err: Error) {
        let _ = err;
    }

    fn on_error(&mut self, err: Error) {
        let _ = err;
    }

    fn on_close(&mut self) {}
}

/// Idempotent cancellation for one open stream.
///
/// Cancelling abandons the network read and the pending decode; the guard is
/// re-checked before every callback dispatch, so a cancel that races with
/// buffered data still suppresses delivery.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Client for the record-delimited event stream endpoint.
pub struct EventStreamClient {
    transport: Arc<HttpTransport>,
    known_models: Vec<String>,
}

impl EventStreamClient {
    pub fn new(transport: Arc<HttpTransport>, known_models: Vec<String>) -> Self {
        Self {
            transport,
            known_models,
        }
    }

    pub fn known_models(&self) -> &[String] {
        &self.known_models
    }

    /// Open the stream and drive `handler` until completion, failure or
    /// cancellation. Returns immediately with the cancel handle.
    pub fn open<H: StreamHandler>(
        &self,
        path: &str,
        body: serde_json::Value,
        handler: H,
    ) -> CancelHandle {
        let token = CancellationToken::new();
        let handle = CancelHandle {
            token: token.clone(),
        };
        let transport = Arc::clone(&self.transport);
        let path = path.to_string();
        let known = self.known_models.clone();

        tokio::spawn(async move {
            drive_stream(transport, path, body, known, token, handler).await;
        });

        handle
    }
}

async fn drive_stream<H: StreamHandler>(
    transport: Arc<HttpTransport>,
    path: String,
    body: serde_json::Value,
    known: Vec<String>,
    token: CancellationToken,
    mut handler: H,
) {
    let sent = tokio::select! {
        _ = token.cancelled() => return,
        resp = transport.post_stream(&path, &body) => resp,
    };

    let resp = match sent {
        Ok(resp) => resp,
        Err(err) => {
            if !token.is_cancelled() {
                handler.on_open_error(err);
            }
            return;
        }
    };

    let status = resp.status();
    if !status.is_success() {
        let message = tokio::select! {
            _ = token.cancelled() => return,
            body = resp.text() => body.unwrap_or_default(),
        };
        if !token.is_cancelled() {
            handler.on_open_error(Error::open(status.as_u16(), message));
        }
        return;
    }

    if token.is_cancelled() {
        return;
    }
    tracing::debug!(status = status.as_u16(), "stream open");
    handler.on_open();

    let mut bytes = resp.bytes_stream();
    let mut decoder = ChunkDecoder::new();
    let mut framer = RecordFramer::default();

    loop {
        let next = tokio::select! {
            _ = token.cancelled() => return,
            chunk = bytes.next() => chunk,
        };

        match next {
            Some(Ok(chunk)) => {
                let text = decoder.feed(&chunk);
                for record in framer.push(&text) {
                    if token.is_cancelled() {
                        return;
                    }
                    dispatch(&record, &known, &mut handler);
                }
            }
            Some(Err(err)) => {
                if !token.is_cancelled() {
                    handler.on_error(Error::Transport(err));
                }
                return;
            }
            None => {
                // EOF: flush the decoder so a truncated trailing character is
                // rendered, then process whatever record is still buffered.
                let tail = decoder.flush();
                for record in framer.finish(&tail) {
                    if token.is_cancelled() {
                        return;
                    }
                    dispatch(&record, &known, &mut handler);
                }
                if !token.is_cancelled() {
                    tracing::debug!("stream closed");
                    handler.on_close();
                }
                return;
            }
        }
    }
}

fn dispatch<H: StreamHandler>(record: &SseRecord, known: &[String], handler: &mut H) {
    match &record.event {
        Some(tag) if known.iter().any(|m| m == tag) => {
            handler.on_message(tag, &record.data);
        }
        Some(tag) => {
            tracing::warn!(tag = %tag, "dropping record for unknown model");
        }
        None => {
            tracing::warn!("dropping untagged record");
        }
    }
}

/// One parsed wire record: the `event:` tag plus the joined `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseRecord {
    pub event: Option<String>,
    pub data: String,
}

/// Splits decoded text into blank-line-delimited records.
///
/// Framing state is text, never bytes: the chunk decoder upstream guarantees
/// the buffer only ever holds complete characters.
#[derive(Debug, Default)]
struct RecordFramer {
    buf: String,
}

impl RecordFramer {
    fn push(&mut self, text: &str) -> Vec<SseRecord> {
        self.buf.push_str(text);
        // Normalize CRLF so the delimiter scan only deals with "\n\n". The
        // unframed tail stays in the buffer, so a CR separated from its LF
        // by a chunk boundary is joined and normalized on the next push.
        if self.buf.contains('\r') {
            self.buf = self.buf.replace("\r\n", "\n");
        }
        let mut out = Vec::new();
        while let Some(idx) = self.buf.find("\n\n") {
            let frame: String = self.buf.drain(..idx + 2).collect();
            if let Some(record) = parse_record(frame.trim_end_matches('\n')) {
                out.push(record);
            }
        }
        out
    }

    /// EOF path: a final record may lack its trailing blank line.
    fn finish(&mut self, tail: &str) -> Vec<SseRecord> {
        let mut out = self.push(tail);
        if !self.buf.trim().is_empty() {
            let frame = std::mem::take(&mut self.buf);
            if let Some(record) = parse_record(&frame) {
                out.push(record);
            }
        }
        self.buf.clear();
        out
    }
}

/// Parse one frame. `event:` names the model, `data:` lines carry the delta
/// (joined with newlines, per SSE), `:` comments and other fields are
/// ignored. Returns `None` for frames with nothing usable.
fn parse_record(frame: &str) -> Option<SseRecord> {
    let mut event = None;
    let mut data: Option<String> = None;

    for line in frame.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            let payload = rest.strip_prefix(' ').unwrap_or(rest);
            match &mut data {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(payload);
                }
                None => data = Some(payload.to_string()),
            }
        }
        // id:, retry: and anything else are not part of this wire contract
    }

    match (event, data) {
        (None, None) => None,
        (event, data) => Some(SseRecord {
            event,
            data: data.unwrap_or_default(),
        }),
    }
}
