//! # multichat-core
//!
//! Streaming-session core for multi-backend AI chat. Several model backends
//! (e.g. a local Ollama and a hosted DashScope deployment) are streamed
//! concurrently against a single user prompt; this crate consumes the
//! event-tagged byte stream, incrementally decodes it, routes each delta to
//! the correct model's running message and exposes an append-only transcript
//! per model.
//!
//! The presentation layer (page components, styling, layout) is an external
//! collaborator: it supplies the prompt and target models, renders whatever
//! message snapshots the core publishes, and calls cancel. Everything with
//! real protocol or concurrency concerns lives here.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use multichat_core::{ChatMessage, HttpTransport, SessionController};
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl multichat_core::SessionSubscriber for Printer {
//!     fn on_update(&mut self, snapshot: &[ChatMessage]) {
//!         for m in snapshot {
//!             println!("[{}] {}", m.model, m.content);
//!         }
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> multichat_core::Result<()> {
//!     let transport = Arc::new(HttpTransport::new("http://localhost:8080")?);
//!     let controller = SessionController::new(
//!         transport,
//!         vec!["ollama".to_string(), "dashscope".to_string()],
//!     );
//!
//!     let handle = controller.start("hello", vec!["ollama".to_string()], Printer)?;
//!     // ... later, from the UI stop button:
//!     handle.cancel();
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`decode`] | Incremental UTF-8 chunk decoding across split multi-byte characters |
//! | [`stream`] | Cancellable SSE client and per-model event demultiplexing |
//! | [`store`] | Pure, order-preserving merge of content deltas into the transcript |
//! | [`session`] | Session lifecycle and the controller orchestrating one user turn |
//! | [`service`] | Auxiliary health-check and model-list endpoints |
//! | [`transport`] | Shared HTTP client construction and byte-stream access |

pub mod decode;
pub mod service;
pub mod session;
pub mod store;
pub mod stream;
pub mod transport;

// Re-export main types for convenience
pub use decode::ChunkDecoder;
pub use service::{HealthStatus, ModelDescriptor, ServiceClient};
pub use session::{Session, SessionController, SessionHandle, SessionStatus, SessionSubscriber};
pub use store::{merge, ChatMessage};
pub use stream::{CancelHandle, EventStreamClient, StreamHandler};
pub use transport::HttpTransport;

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A unified pinned, boxed stream of fallible items
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::Error;
