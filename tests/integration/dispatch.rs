use std::time::{Duration, Instant};

use relay_core::config::RelayConfig;
use relay_core::wire::{decode_request, Role, WireFrame, FLAG_MESSAGE};
use relay_services::{CallContext, DispatchError, STREAM_CHAT_PATH};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::*;

const PROTO: &str = "application/connect+proto";

fn proto_reply(body: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", PROTO)
        .set_body_bytes(body.to_vec())
}

/// The only request the backend mock received.
async fn single_request(server: &MockServer) -> wiremock::Request {
    let mut received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1, "expected exactly one request");
    received.remove(0)
}

fn header_str<'a>(request: &'a wiremock::Request, name: &str) -> &'a str {
    request
        .headers
        .get(name)
        .unwrap_or_else(|| panic!("missing header {name}"))
        .to_str()
        .unwrap()
}

#[tokio::test]
async fn test_dispatch_returns_raw_stream() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_CHAT_PATH))
        .and(header("content-type", PROTO))
        .and(header("authorization", "Bearer abc.def.ghi"))
        .and(header("connect-protocol-version", "1"))
        .respond_with(proto_reply(b"\x00\x00\x00\x00\x02hi"))
        .expect(1)
        .mount(&backend)
        .await;

    let dispatcher = dispatcher_with(&config_for(&backend), golden_clock());
    let response = dispatcher
        .dispatch(&sample_chat(), &CallContext::new(TOKEN))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.bytes().await.unwrap();
    assert_eq!(&body[..], b"\x00\x00\x00\x00\x02hi");
}

#[tokio::test]
async fn test_dispatch_sends_official_headers() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(proto_reply(b""))
        .mount(&backend)
        .await;

    let dispatcher = dispatcher_with(&config_for(&backend), golden_clock());
    dispatcher
        .dispatch(&sample_chat(), &CallContext::new(TOKEN))
        .await
        .unwrap();

    let request = single_request(&backend).await;
    assert_eq!(header_str(&request, "x-cursor-checksum"), GOLDEN_CHECKSUM);
    assert_eq!(
        header_str(&request, "x-client-key"),
        "89debaafb76bb452e66894d7cf011f342fcf570ab8836ec269cd5bddf64320e6"
    );
    assert_eq!(header_str(&request, "user-agent"), "connect-es/1.6.1");
    assert_eq!(header_str(&request, "x-cursor-client-version"), "0.45.11");
    assert_eq!(header_str(&request, "x-cursor-timezone"), "Asia/Shanghai");
    assert_eq!(header_str(&request, "x-ghost-mode"), "false");
    assert_eq!(header_str(&request, "connect-accept-encoding"), "gzip");
    assert_eq!(header_str(&request, "connect-content-encoding"), "gzip");
    assert_eq!(header_str(&request, "host"), backend.address().to_string());
    assert!(header_str(&request, "traceparent").starts_with("00-"));
    assert!(header_str(&request, "x-amzn-trace-id").starts_with("Root="));
}

#[tokio::test]
async fn test_dispatch_body_is_one_frame() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(proto_reply(b""))
        .mount(&backend)
        .await;

    let dispatcher = dispatcher_with(&config_for(&backend), golden_clock());
    let chat = sample_chat();
    dispatcher
        .dispatch(&chat, &CallContext::new(TOKEN))
        .await
        .unwrap();

    let request = single_request(&backend).await;
    let (frame, rest) = WireFrame::decode(&request.body).unwrap();
    assert!(rest.is_empty());
    assert_eq!(frame.magic(), FLAG_MESSAGE);
    assert_eq!(frame.length() as usize, request.body.len() - 5);

    let message = decode_request(&frame).unwrap();
    assert_eq!(message.model.unwrap().name, "claude-3.5-sonnet");
    assert_eq!(message.messages.len(), 2);
    assert_eq!(message.messages[0].role(), Role::Assistant);
    assert_eq!(message.messages[1].role(), Role::User);
    assert_eq!(message.messages[1].content, "What is a frame?");
    assert_ne!(message.messages[0].message_id, message.messages[1].message_id);
}

#[tokio::test]
async fn test_explicit_checksum_is_forwarded() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-cursor-checksum", "from-inbound-header"))
        .respond_with(proto_reply(b""))
        .expect(1)
        .mount(&backend)
        .await;

    let dispatcher = dispatcher_with(&config_for(&backend), golden_clock());
    let ctx = CallContext::new(TOKEN).with_checksum("from-inbound-header");
    dispatcher.dispatch(&sample_chat(), &ctx).await.unwrap();
}

#[tokio::test]
async fn test_forbidden_is_upstream_rejected() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("checksum invalid"))
        .mount(&backend)
        .await;

    let dispatcher = dispatcher_with(&config_for(&backend), golden_clock());
    let err = dispatcher
        .dispatch(&sample_chat(), &CallContext::new(TOKEN))
        .await
        .unwrap_err();

    match &err {
        DispatchError::UpstreamRejected { status, body } => {
            assert_eq!(*status, StatusCode::FORBIDDEN);
            assert_eq!(body, "checksum invalid");
        }
        other => panic!("expected UpstreamRejected, got {other:?}"),
    }
    assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
}

#[tokio::test]
async fn test_non_proto_reply_is_rejected() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>captcha</html>", "text/html"),
        )
        .mount(&backend)
        .await;

    let dispatcher = dispatcher_with(&config_for(&backend), golden_clock());
    let err = dispatcher
        .dispatch(&sample_chat(), &CallContext::new(TOKEN))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::UnexpectedContentType(ref ct) if ct == "text/html"));
}

#[tokio::test]
async fn test_cancellation_aborts_in_flight_call() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(proto_reply(b"").set_delay(Duration::from_secs(30)))
        .mount(&backend)
        .await;

    let dispatcher = dispatcher_with(&config_for(&backend), golden_clock());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let ctx = CallContext::new(TOKEN).with_cancel(cancel);
    let err = dispatcher.dispatch(&sample_chat(), &ctx).await.unwrap_err();
    assert!(matches!(err, DispatchError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_failure() {
    let mut config = RelayConfig::default();
    // Port 1 refuses connections.
    config.backend.origin = "http://127.0.0.1:1".into();
    config.backend.resolve = String::new();

    let dispatcher = dispatcher_with(&config, golden_clock());
    let err = dispatcher
        .dispatch(&sample_chat(), &CallContext::new(TOKEN))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::Transport(_)), "got {err:?}");
}

#[tokio::test]
async fn test_remote_checksum_is_fetched_once_then_cached() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/checksum"))
        .respond_with(ResponseTemplate::new(200).set_body_string("remote-checksum\n"))
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path(STREAM_CHAT_PATH))
        .and(header("x-cursor-checksum", "remote-checksum"))
        .respond_with(proto_reply(b""))
        .expect(2)
        .mount(&backend)
        .await;

    let mut config = config_for(&backend);
    config.checksum.source = format!("{}/checksum", backend.uri());

    let dispatcher = dispatcher_with(&config, golden_clock());
    for _ in 0..2 {
        dispatcher
            .dispatch(&sample_chat(), &CallContext::new(TOKEN))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_failed_checksum_source_sends_empty_checksum() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/checksum"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&backend)
        .await;
    Mock::given(method("POST"))
        .and(path(STREAM_CHAT_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .mount(&backend)
        .await;

    let mut config = config_for(&backend);
    config.checksum.source = format!("{}/checksum", backend.uri());

    let dispatcher = dispatcher_with(&config, golden_clock());
    let err = dispatcher
        .dispatch(&sample_chat(), &CallContext::new(TOKEN))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));

    let received = backend.received_requests().await.unwrap();
    let post = received
        .iter()
        .find(|r| r.method.as_str() == "POST")
        .expect("chat request still sent");
    assert_eq!(header_str(post, "x-cursor-checksum"), "");
}

#[tokio::test]
async fn test_each_dispatch_mints_new_message_ids() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(proto_reply(b""))
        .expect(2)
        .mount(&backend)
        .await;

    let dispatcher = dispatcher_with(&config_for(&backend), golden_clock());
    let chat = sample_chat();
    for _ in 0..2 {
        dispatcher
            .dispatch(&chat, &CallContext::new(TOKEN))
            .await
            .unwrap();
    }

    let received = backend.received_requests().await.unwrap();
    let ids: Vec<Vec<String>> = received
        .iter()
        .map(|request| {
            let (frame, _) = WireFrame::decode(&request.body).unwrap();
            let message = decode_request(&frame).unwrap();
            message.messages.into_iter().map(|m| m.message_id).collect()
        })
        .collect();
    assert_eq!(ids.len(), 2);
    for (first, second) in ids[0].iter().zip(&ids[1]) {
        assert_ne!(first, second);
    }
}
