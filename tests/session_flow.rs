//! End-to-end session scenarios against a mock streaming server.

use multichat_core::{
    ChatMessage, Error, HttpTransport, SessionController, SessionStatus, SessionSubscriber,
};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Shared {
    updates: Vec<Vec<ChatMessage>>,
    errors: Vec<String>,
    done: usize,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Shared>>);

impl Recorder {
    fn shared(&self) -> std::sync::MutexGuard<'_, Shared> {
        self.0.lock().unwrap()
    }
}

impl SessionSubscriber for Recorder {
    fn on_update(&mut self, snapshot: &[ChatMessage]) {
        self.0.lock().unwrap().updates.push(snapshot.to_vec());
    }

    fn on_error(&mut self, err: &Error) {
        self.0.lock().unwrap().errors.push(err.to_string());
    }

    fn on_done(&mut self) {
        self.0.lock().unwrap().done += 1;
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("multichat_core=debug")
        .try_init();
}

async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn controller(url: &str) -> SessionController {
    let transport = Arc::new(HttpTransport::new(url).unwrap());
    SessionController::new(
        transport,
        vec!["ollama".to_string(), "dashscope".to_string()],
    )
}

#[tokio::test]
async fn interleaved_stream_merges_per_model_in_wire_order() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/chat/stream")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "prompt": "hello",
            "models": ["ollama", "dashscope"],
        })))
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(
            "event: ollama\ndata: Hi\n\n\
             event: dashscope\ndata: Hola\n\n\
             event: ollama\ndata:  there\n\n",
        )
        .create_async()
        .await;

    let recorder = Recorder::default();
    let handle = controller(&server.url())
        .start(
            "hello",
            vec!["ollama".to_string(), "dashscope".to_string()],
            recorder.clone(),
        )
        .unwrap();

    wait_until(|| handle.status() == SessionStatus::Closed, "closed status").await;

    let messages = handle.snapshot();
    let view: Vec<(&str, &str)> = messages
        .iter()
        .map(|m| (m.model.as_str(), m.content.as_str()))
        .collect();
    assert_eq!(view, vec![("ollama", "Hi there"), ("dashscope", "Hola")]);

    let shared = recorder.shared();
    assert_eq!(shared.updates.len(), 3, "one snapshot per merged record");
    assert_eq!(shared.updates.last().unwrap(), &messages);
    assert_eq!(shared.done, 1);
    assert!(shared.errors.is_empty());
    drop(shared);

    mock.assert_async().await;
}

#[tokio::test]
async fn unknown_event_tags_never_reach_the_collection() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat/stream")
        .with_status(200)
        .with_body(
            "event: gpt4\ndata: nope\n\n\
             event: ollama\ndata: Hi\n\n\
             event: mystery\ndata: also nope\n\n",
        )
        .create_async()
        .await;

    let recorder = Recorder::default();
    let handle = controller(&server.url())
        .start("hello", vec!["ollama".to_string()], recorder.clone())
        .unwrap();

    wait_until(|| handle.status() == SessionStatus::Closed, "closed status").await;

    let models: Vec<String> = handle.snapshot().iter().map(|m| m.model.clone()).collect();
    assert_eq!(models, vec!["ollama".to_string()]);
    for update in recorder.shared().updates.iter() {
        assert!(update.iter().all(|m| m.model == "ollama"));
    }
}

#[tokio::test]
async fn http_500_on_open_errors_the_session_with_empty_collection() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat/stream")
        .with_status(500)
        .with_body("backend exploded")
        .create_async()
        .await;

    let recorder = Recorder::default();
    let handle = controller(&server.url())
        .start("hello", vec!["ollama".to_string()], recorder.clone())
        .unwrap();

    wait_until(|| handle.status() == SessionStatus::Errored, "errored status").await;
    // Give any stray callbacks a chance to show up before asserting counts.
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(handle.snapshot().is_empty());
    let shared = recorder.shared();
    assert_eq!(shared.errors.len(), 1, "open error fires exactly once");
    assert!(shared.errors[0].contains("500"), "got: {}", shared.errors[0]);
    assert!(shared.updates.is_empty());
    assert_eq!(shared.done, 0);
}

#[tokio::test]
async fn mid_stream_failure_errors_session_and_retains_partial_content() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat/stream")
        .with_status(200)
        .with_chunked_body(|w| {
            w.write_all(b"event: ollama\ndata: Hi\n\n")?;
            w.flush()?;
            std::thread::sleep(Duration::from_millis(50));
            // Tear the connection down before the terminating chunk.
            Err(std::io::Error::other("connection torn down"))
        })
        .create_async()
        .await;

    let recorder = Recorder::default();
    let handle = controller(&server.url())
        .start("hello", vec!["ollama".to_string()], recorder.clone())
        .unwrap();

    wait_until(|| handle.status() == SessionStatus::Errored, "errored status").await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The delta merged before the failure stays in the transcript.
    let messages = handle.snapshot();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].model, "ollama");
    assert_eq!(messages[0].content, "Hi");

    let shared = recorder.shared();
    assert_eq!(shared.errors.len(), 1, "transport error fires exactly once");
    assert_eq!(shared.updates.len(), 1);
    assert_eq!(shared.done, 0, "no on_done after a transport failure");
}

#[tokio::test]
async fn cancel_before_any_event_yields_cancelled_and_silent() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat/stream")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_millis(300));
            w.write_all(b"event: ollama\ndata: too late\n\n")
        })
        .create_async()
        .await;

    let recorder = Recorder::default();
    let handle = controller(&server.url())
        .start("hello", vec!["ollama".to_string()], recorder.clone())
        .unwrap();
    handle.cancel();

    assert_eq!(handle.status(), SessionStatus::Cancelled);

    // Let the server emit its record; nothing may surface.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(handle.status(), SessionStatus::Cancelled);
    assert!(handle.snapshot().is_empty());
    let shared = recorder.shared();
    assert!(shared.updates.is_empty(), "no on_update after cancel");
    assert!(shared.errors.is_empty());
    assert_eq!(shared.done, 0);
}

#[tokio::test]
async fn events_after_cancel_do_not_change_the_collection() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat/stream")
        .with_status(200)
        .with_chunked_body(|w| {
            w.write_all(b"event: ollama\ndata: Hi\n\n")?;
            w.flush()?;
            std::thread::sleep(Duration::from_millis(400));
            w.write_all(b"event: ollama\ndata:  there\n\nevent: dashscope\ndata: Hola\n\n")
        })
        .create_async()
        .await;

    let recorder = Recorder::default();
    let handle = controller(&server.url())
        .start(
            "hello",
            vec!["ollama".to_string(), "dashscope".to_string()],
            recorder.clone(),
        )
        .unwrap();

    let probe = recorder.clone();
    wait_until(|| !probe.shared().updates.is_empty(), "first update").await;
    handle.cancel();

    let frozen = handle.snapshot();
    let updates_at_cancel = recorder.shared().updates.len();

    // Partial content is retained, not treated as an error.
    assert_eq!(frozen.len(), 1);
    assert_eq!(frozen[0].content, "Hi");
    assert_eq!(handle.status(), SessionStatus::Cancelled);

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(handle.snapshot(), frozen);
    let shared = recorder.shared();
    assert_eq!(shared.updates.len(), updates_at_cancel);
    assert!(shared.errors.is_empty());
    assert_eq!(shared.done, 0);
}

#[tokio::test]
async fn requested_model_with_no_records_is_silently_absent() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/chat/stream")
        .with_status(200)
        .with_body("event: ollama\ndata: only me\n\n")
        .create_async()
        .await;

    let recorder = Recorder::default();
    let handle = controller(&server.url())
        .start(
            "hello",
            vec!["ollama".to_string(), "dashscope".to_string()],
            recorder.clone(),
        )
        .unwrap();

    wait_until(|| handle.status() == SessionStatus::Closed, "closed status").await;

    let models: Vec<String> = handle.snapshot().iter().map(|m| m.model.clone()).collect();
    assert_eq!(models, vec!["ollama".to_string()]);
    assert_eq!(recorder.shared().done, 1);
}
