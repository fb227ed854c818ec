//! End-to-end turns against a throwaway HTTP server.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use banter::chat::{ChatConfig, ChatSession, Renderer, TurnOutcome, USER_ERROR_BANNER};
use banter::{
    ChatCompletionsClient, FileStore, FragmentSource, GenerateClient, MemoryStore, Message,
    PersonaConfig,
};

#[derive(Default)]
struct RecordingRenderer {
    updates: Vec<Message>,
    errors: Vec<String>,
    interrupted: usize,
    cancel_on_first_update: Option<CancellationToken>,
}

impl Renderer for RecordingRenderer {
    fn start_response(&mut self) {}

    fn update_response(&mut self, message: &Message) {
        self.updates.push(message.clone());
        if let Some(cancel) = self.cancel_on_first_update.take() {
            cancel.cancel();
        }
    }

    fn finish_response(&mut self) {}

    fn print_error(&mut self, error: &str) {
        self.errors.push(error.to_string());
    }

    fn print_server_busy(&mut self) {
        self.errors.push("busy".to_string());
    }

    fn print_info(&mut self, _: &str) {}

    fn print_interrupted(&mut self) {
        self.interrupted += 1;
    }
}

/// Serve exactly one request with a canned response and hand back the raw
/// request text.
async fn serve_once(
    status: &'static str,
    content_type: &'static str,
    body: String,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });
    (format!("http://{addr}"), handle)
}

/// Serve one chunked NDJSON line, then hold the connection open.  The
/// handle resolves to true once the client closes the connection.
async fn serve_then_hang(line: &'static str) -> (String, JoinHandle<bool>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{line}\r\n",
            line.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        let mut buf = [0u8; 1024];
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return true,
                Ok(_) => {}
            }
        }
    });
    (format!("http://{addr}"), handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn persona() -> PersonaConfig {
    PersonaConfig::new("Ada", ["Jets", "Sharks"], "Westside")
}

#[tokio::test]
async fn generate_backend_round_trip_with_file_store() {
    let body = concat!(
        "{\"response\":\"<think>size them \",\"done\":false}\n",
        "{\"response\":\"up</think>Yo Ada, \",\"done\":false}\n",
        "not json\n",
        "{\"response\":\"Westside forever.\",\"done\":true}\n",
    )
    .to_string();
    let (url, server) = serve_once("200 OK", "application/x-ndjson", body).await;
    let source = GenerateClient::with_options(
        Some(format!("{url}/api/generate")),
        Some("test-model".to_string()),
        None,
    )
    .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileStore::new(dir.path()));
    let mut session =
        ChatSession::new(Box::new(source), store.clone(), persona(), ChatConfig::new()).unwrap();
    let mut renderer = RecordingRenderer::default();

    let outcome = session
        .open(&mut renderer, &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_completed(), "outcome was {outcome:?}");
    assert_eq!(
        session.messages(),
        &[Message::bot("Yo Ada, Westside forever.").with_thinking("size them up")]
    );
    assert_eq!(renderer.updates.len(), 3);
    assert!(renderer.errors.is_empty());

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /api/generate"));
    assert!(request.contains("\"model\":\"test-model\""));
    assert!(request.contains("\"stream\":true"));

    let id = session.conversation_id().unwrap();
    let saved = store.read_conversation(id).await.unwrap();
    assert_eq!(saved.messages, session.messages());
}

#[tokio::test]
async fn generate_backend_error_status() {
    let (url, _server) = serve_once(
        "500 Internal Server Error",
        "application/json",
        "{\"error\":\"model not loaded\"}".to_string(),
    )
    .await;
    let source = GenerateClient::with_options(Some(url), None, None).unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut session =
        ChatSession::new(Box::new(source), store.clone(), persona(), ChatConfig::new()).unwrap();
    let mut renderer = RecordingRenderer::default();

    let outcome = session
        .send("sup", &mut renderer, &CancellationToken::new())
        .await
        .unwrap();
    match outcome {
        TurnOutcome::Failed(err) => {
            assert_eq!(err.status_code(), Some(500));
            assert!(err.is_transport());
            assert!(err.to_string().contains("model not loaded"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(session.messages(), &[Message::user("sup")]);
    assert!(session.has_error());
    assert_eq!(renderer.errors, vec![USER_ERROR_BANNER.to_string()]);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn chat_completions_backend_streams_events() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"What's \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"good\"}}]}\n\n",
        "data: [DONE]\n\n",
    )
    .to_string();
    let (url, server) = serve_once("200 OK", "text/event-stream", body).await;
    let source = ChatCompletionsClient::with_options(
        Some("test-key".to_string()),
        Some(format!("{url}/v1")),
        None,
        None,
    )
    .unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut session =
        ChatSession::new(Box::new(source), store.clone(), persona(), ChatConfig::new()).unwrap();
    let mut renderer = RecordingRenderer::default();

    let outcome = session
        .send("yo", &mut renderer, &CancellationToken::new())
        .await
        .unwrap();
    assert!(outcome.is_completed(), "outcome was {outcome:?}");
    assert_eq!(
        session.messages(),
        &[Message::user("yo"), Message::bot("What's good")]
    );
    assert_eq!(store.calls().len(), 1);

    let request = server.await.unwrap().to_lowercase();
    assert!(request.starts_with("post /v1/chat/completions"));
    assert!(request.contains("authorization: bearer test-key"));
}

#[tokio::test]
async fn chat_completions_rejected_key() {
    let (url, _server) = serve_once(
        "401 Unauthorized",
        "application/json",
        "{\"error\":{\"message\":\"bad key\"}}".to_string(),
    )
    .await;
    let source =
        ChatCompletionsClient::with_options(Some("nope".to_string()), Some(url), None, None)
            .unwrap();
    let mut session = ChatSession::new(
        Box::new(source),
        Arc::new(MemoryStore::new()),
        persona(),
        ChatConfig::new(),
    )
    .unwrap();
    let mut renderer = RecordingRenderer::default();

    let outcome = session
        .send("yo", &mut renderer, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, TurnOutcome::Failed(banter::Error::Authentication { .. })));
    assert_eq!(renderer.errors, vec![USER_ERROR_BANNER.to_string()]);
}

#[tokio::test]
async fn empty_body_fails_before_any_fragment() {
    let (url, _server) = serve_once("200 OK", "application/x-ndjson", String::new()).await;
    let source = GenerateClient::with_options(Some(url), None, None).unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut session =
        ChatSession::new(Box::new(source), store.clone(), persona(), ChatConfig::new()).unwrap();
    let mut renderer = RecordingRenderer::default();

    let outcome = session
        .send("hi", &mut renderer, &CancellationToken::new())
        .await
        .unwrap();
    match outcome {
        TurnOutcome::Failed(err) => assert!(err.is_transport(), "error was {err:?}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(session.has_error());
    assert_eq!(session.messages(), &[Message::user("hi")]);
    assert!(renderer.updates.is_empty());
    assert_eq!(renderer.errors, vec![USER_ERROR_BANNER.to_string()]);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn cancelled_stream_ends_and_closes_connection() {
    let (url, server) = serve_then_hang("{\"response\":\"<think>A\",\"done\":false}\n").await;
    let source = GenerateClient::with_options(Some(url), None, None).unwrap();
    let cancel = CancellationToken::new();

    let mut stream = source.start_stream("hi", &cancel).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.text(), "<think>A");

    cancel.cancel();
    assert!(stream.next().await.is_none());
    drop(stream);

    let closed = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server never saw the connection close")
        .unwrap();
    assert!(closed);
}

#[tokio::test]
async fn cancelling_a_live_turn_keeps_partial_reply() {
    let (url, server) = serve_then_hang("{\"response\":\"<think>A\",\"done\":false}\n").await;
    let source = GenerateClient::with_options(Some(url), None, None).unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut session =
        ChatSession::new(Box::new(source), store.clone(), persona(), ChatConfig::new()).unwrap();
    let cancel = CancellationToken::new();
    let mut renderer = RecordingRenderer {
        cancel_on_first_update: Some(cancel.clone()),
        ..RecordingRenderer::default()
    };

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        session.send("hi", &mut renderer, &cancel),
    )
    .await
    .expect("turn did not stop after cancellation")
    .unwrap();
    assert!(matches!(outcome, TurnOutcome::Cancelled), "outcome was {outcome:?}");
    assert_eq!(
        session.messages(),
        &[Message::user("hi"), Message::bot("<think>A")]
    );
    assert!(renderer.errors.is_empty());
    assert_eq!(renderer.interrupted, 1);
    assert!(!session.has_error());
    assert!(store.calls().is_empty());

    let closed = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server never saw the connection close")
        .unwrap();
    assert!(closed);
}
