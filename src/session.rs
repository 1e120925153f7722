//! Session lifecycle and the controller orchestrating one user turn.
//!
//! The controller is the sole mutator of a [`Session`]; the presentation
//! layer only ever sees immutable snapshots, taken after each merge. Every
//! state transition and merge runs under the session lock with a
//! terminal-state guard in front, which is what turns "no updates after
//! cancel" from a timing accident into an invariant: once
//! [`SessionHandle::cancel`] has returned, any event still in flight hits the
//! guard and is dropped.

use crate::store::{self, ChatMessage};
use crate::stream::{CancelHandle, EventStreamClient, StreamHandler};
use crate::transport::HttpTransport;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// Default path of the chat streaming endpoint.
pub const STREAM_PATH: &str = "/api/chat/stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, handshake not yet answered.
    Pending,
    /// Handshake succeeded; deltas are being merged.
    Open,
    /// Stream completed normally.
    Closed,
    /// Handshake or transport failure.
    Errored,
    /// Explicitly cancelled by the caller. Partial content is retained.
    Cancelled,
}

impl SessionStatus {
    /// Terminal states absorb: no merge or notification happens after one is
    /// reached, even if late events arrive.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Closed | SessionStatus::Errored | SessionStatus::Cancelled
        )
    }
}

/// One user turn against a set of backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub prompt: String,
    pub requested_models: Vec<String>,
    pub status: SessionStatus,
    pub messages: Vec<ChatMessage>,
}

impl Session {
    fn new(prompt: String, requested_models: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt,
            requested_models,
            status: SessionStatus::Pending,
            messages: Vec::new(),
        }
    }
}

/// Caller-facing notifications for one session.
///
/// Callbacks are delivered serialized, on the session's event timeline. They
/// run under the session lock, so they must not call back into the
/// [`SessionHandle`] that owns the same session.
pub trait SessionSubscriber: Send + 'static {
    /// A delta was merged; `snapshot` is the full collection after the merge.
    fn on_update(&mut self, snapshot: &[ChatMessage]);

    /// The session failed (handshake or transport). Fires at most once.
    fn on_error(&mut self, err: &Error) {
        let _ = err;
    }

    /// The stream completed normally. Fires at most once, never after an
    /// error or a cancel.
    fn on_done(&mut self) {}
}

/// Handle to a running session: snapshot access plus cancel.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    shared: Arc<Mutex<Session>>,
    cancel: CancelHandle,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.shared).status
    }

    /// Immutable copy of the current message collection.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        lock(&self.shared).messages.clone()
    }

    /// Full immutable copy of the session record.
    pub fn session(&self) -> Session {
        lock(&self.shared).clone()
    }

    /// Cancel the session. Idempotent; a no-op on an already-terminal
    /// session. When this returns, no further subscriber notification will
    /// fire.
    pub fn cancel(&self) {
        {
            let mut session = lock(&self.shared);
            if !session.status.is_terminal() {
                session.status = SessionStatus::Cancelled;
                tracing::debug!(session_id = %self.id, "session cancelled");
            }
        }
        self.cancel.cancel();
    }
}

/// Orchestrates sessions against one aggregation endpoint.
///
/// Holds the closed set of supported backend names; a `start` naming anything
/// outside it is rejected before any network activity.
pub struct SessionController {
    client: EventStreamClient,
    stream_path: String,
}

impl SessionController {
    pub fn new(transport: Arc<HttpTransport>, known_models: Vec<String>) -> Self {
        Self {
            client: EventStreamClient::new(transport, known_models),
            stream_path: STREAM_PATH.to_string(),
        }
    }

    /// Override the streaming endpoint path.
    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Start one user turn.
    ///
    /// Fails synchronously with [`Error::InvalidModelSet`] if `models` is
    /// empty or names an unknown backend. Otherwise the session starts
    /// `Pending` and the subscriber is driven from the stream callbacks.
    pub fn start<S: SessionSubscriber>(
        &self,
        prompt: impl Into<String>,
        models: Vec<String>,
        subscriber: S,
    ) -> Result<SessionHandle> {
        let prompt = prompt.into();

        if models.is_empty() {
            return Err(Error::invalid_model_set("no models requested"));
        }
        if let Some(unknown) = models
            .iter()
            .find(|m| !self.client.known_models().contains(*m))
        {
            return Err(Error::invalid_model_set(format!(
                "unknown model: {unknown}"
            )));
        }

        let session = Session::new(prompt.clone(), models.clone());
        let id = session.id;
        let shared = Arc::new(Mutex::new(session));

        tracing::debug!(session_id = %id, models = ?models, "starting session");

        let body = serde_json::json!({
            "prompt": prompt,
            "models": models,
        });

        let relay = SessionRelay {
            shared: Arc::clone(&shared),
            subscriber,
        };
        let cancel = self.client.open(&self.stream_path, body, relay);

        Ok(SessionHandle { id, shared, cancel })
    }
}

/// Bridges stream callbacks into session mutations and subscriber
/// notifications. Each callback takes the session lock, checks the terminal
/// guard, applies its transition and notifies while still holding the lock.
struct SessionRelay<S: SessionSubscriber> {
    shared: Arc<Mutex<Session>>,
    subscriber: S,
}

impl<S: SessionSubscriber> StreamHandler for SessionRelay<S> {
    fn on_open(&mut self) {
        let mut session = lock(&self.shared);
        if session.status == SessionStatus::Pending {
            session.status = SessionStatus::Open;
        }
    }

    fn on_message(&mut self, model: &str, delta: &str) {
        let mut session = lock(&self.shared);
        if session.status.is_terminal() {
            return;
        }
        session.messages = store::merge(&session.messages, model, delta);
        let snapshot = session.messages.clone();
        self.subscriber.on_update(&snapshot);
    }

    fn on_open_error(&mut self, err: Error) {
        self.fail(err);
    }

    fn on_error(&mut self, err: Error) {
        self.fail(err);
    }

    fn on_close(&mut self) {
        let mut session = lock(&self.shared);
        if session.status.is_terminal() {
            return;
        }
        session.status = SessionStatus::Closed;
        self.subscriber.on_done();
    }
}

impl<S: SessionSubscriber> SessionRelay<S> {
    fn fail(&mut self, err: Error) {
        let mut session = lock(&self.shared);
        if session.status.is_terminal() {
            return;
        }
        session.status = SessionStatus::Errored;
        tracing::warn!(session_id = %session.id, error = %err, "session errored");
        self.subscriber.on_error(&err);
    }
}

fn lock(shared: &Mutex<Session>) -> MutexGuard<'_, Session> {
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
