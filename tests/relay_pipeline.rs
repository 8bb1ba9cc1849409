//! End-to-end tests: relay router on a real socket, driven by the client
//! session over HTTP.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use vidchat_rs::{
    client::RelayClient,
    messages::{ChatMessage, ChatRequest, Source, StagedVideo, StreamEvent},
    server::{router, AppState, MediaFetcher},
    services::{EventStream, GenerationBackend},
    session::{ChatSession, ExchangePhase},
    Result, VidChatError,
};
use wiremock::{matchers::method, Mock, MockServer, ResponseTemplate};

/// Backend that answers every request with the same events
struct CannedBackend {
    events: Vec<StreamEvent>,
}

#[async_trait]
impl GenerationBackend for CannedBackend {
    fn provider(&self) -> &str {
        "canned"
    }

    fn model(&self) -> &str {
        "canned-model"
    }

    async fn stream_generate(&self, _request: ChatRequest) -> Result<EventStream> {
        let events: Vec<Result<StreamEvent>> = self.events.iter().cloned().map(Ok).collect();
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// Backend that sends one event, stalls, then fails
struct FailingBackend {
    delay: Duration,
}

#[async_trait]
impl GenerationBackend for FailingBackend {
    fn provider(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing-model"
    }

    async fn stream_generate(&self, _request: ChatRequest) -> Result<EventStream> {
        let delay = self.delay;
        Ok(Box::pin(async_stream::stream! {
            yield Ok(StreamEvent::text("partial answer"));
            tokio::time::sleep(delay).await;
            yield Err(VidChatError::MidStream("upstream went away".into()));
        }))
    }
}

/// Start the relay on an ephemeral port and return its base URL
async fn spawn_relay(backend: Option<Arc<dyn GenerationBackend>>) -> String {
    let media = MediaFetcher::new(1024 * 1024, Duration::from_secs(5)).unwrap();
    let app = router(AppState::new(backend, media));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

fn canned(events: Vec<StreamEvent>) -> Option<Arc<dyn GenerationBackend>> {
    Some(Arc::new(CannedBackend { events }))
}

#[tokio::test]
async fn test_full_exchange_over_http() {
    let relay = spawn_relay(canned(vec![
        StreamEvent::text("Hello"),
        StreamEvent::default(),
        StreamEvent::text(" there"),
    ]))
    .await;
    let client = RelayClient::new(relay).unwrap();

    let mut session = ChatSession::new("be helpful");
    session.set_draft("hi");
    session
        .run_exchange(&client, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    assert_eq!(
        session.transcript(),
        &[ChatMessage::user("hi", None), ChatMessage::model("Hello there")]
    );
    assert_eq!(session.phase(), ExchangePhase::Settled);
}

#[tokio::test]
async fn test_citations_reach_the_transcript() {
    let sources = vec![Source {
        title: "Rust".into(),
        uri: "https://www.rust-lang.org".into(),
    }];
    let relay = spawn_relay(canned(vec![
        StreamEvent::text("Rust is a language").with_sources(sources.clone()),
        StreamEvent::text("."),
    ]))
    .await;
    let client = RelayClient::new(relay).unwrap();

    let mut session = ChatSession::new("");
    session.set_draft("what is rust?");
    session
        .run_exchange(&client, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    let answer = &session.transcript()[1];
    assert_eq!(answer.text, "Rust is a language.");
    assert_eq!(answer.sources.as_ref(), Some(&sources));
}

#[tokio::test]
async fn test_unconfigured_relay_rolls_back() {
    let relay = spawn_relay(None).await;
    let client = RelayClient::new(relay).unwrap();

    let mut session = ChatSession::new("");
    session.set_draft("hi");
    let err = session
        .run_exchange(&client, &CancellationToken::new(), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, VidChatError::Relay { status: 500, .. }));
    assert!(session.transcript().is_empty());
    assert!(session.last_error().unwrap().contains("API key"));
    assert_eq!(session.phase(), ExchangePhase::RolledBack);
}

#[tokio::test]
async fn test_video_url_with_wrong_type_leaves_session_unchanged() {
    let host = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, b'P', b'N', b'G'], "image/png"))
        .mount(&host)
        .await;

    let relay = spawn_relay(canned(Vec::new())).await;
    let client = RelayClient::new(relay).unwrap();

    let mut session = ChatSession::new("");
    let staged = StagedVideo {
        name: "earlier.mp4".into(),
        mime_type: "video/mp4".into(),
        base64_data: "AAAA".into(),
    };
    session.stage_video(staged.clone()).unwrap();

    let err = session
        .load_video_url(
            &client,
            &format!("{}/picture.png", host.uri()),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, VidChatError::Relay { status: 400, .. }));
    assert_eq!(session.staged_video(), Some(&staged));
    assert!(session.transcript().is_empty());
}

#[tokio::test]
async fn test_loaded_video_is_sent_with_next_prompt() {
    let host = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8, 1, 2], "video/mp4"))
        .mount(&host)
        .await;

    let relay = spawn_relay(canned(vec![StreamEvent::text("A short clip.")])).await;
    let client = RelayClient::new(relay).unwrap();

    let mut session = ChatSession::new("");
    session
        .load_video_url(
            &client,
            &format!("{}/media/clip.mp4", host.uri()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(session.staged_video().unwrap().name, "clip.mp4");
    assert_eq!(session.staged_video().unwrap().base64_data, "AAEC");

    session.set_draft("what is this?");
    session
        .run_exchange(&client, &CancellationToken::new(), |_| {})
        .await
        .unwrap();

    let video = session.transcript()[0].video.as_ref().unwrap();
    assert_eq!(video.name, "clip.mp4");
    assert_eq!(video.data_url, "data:video/mp4;base64,AAEC");
    assert!(session.staged_video().is_none());
}

#[tokio::test]
async fn test_mid_stream_failure_rolls_back_after_partial_text() {
    let relay = spawn_relay(Some(Arc::new(FailingBackend {
        delay: Duration::from_millis(200),
    })))
    .await;
    let client = RelayClient::new(relay).unwrap();

    let mut session = ChatSession::new("");
    session.set_draft("tell me everything");
    let mut seen = Vec::new();
    let err = session
        .run_exchange(&client, &CancellationToken::new(), |message| {
            seen.push(message.text.clone());
        })
        .await
        .unwrap_err();

    assert_eq!(seen, vec!["partial answer".to_string()]);
    assert!(matches!(err, VidChatError::MidStream(_)));
    assert!(session.transcript().is_empty());
    assert_eq!(session.last_error(), Some(err.to_string().as_str()));
    assert_eq!(session.phase(), ExchangePhase::RolledBack);
}
