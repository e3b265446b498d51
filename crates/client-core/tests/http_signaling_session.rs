//! Full connect against a mock signaling server

mod common;

use std::time::Duration;

use serial_test::serial;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use avatar_rtc_client_core::{ControllerState, SessionConfig, SessionError, SessionManager};

use common::*;

fn config_for(server: &MockServer) -> SessionConfig {
    SessionConfig::receive_only()
        .with_base_url(&server.uri())
        .with_signaling_timeout(Duration::from_millis(500))
}

#[tokio::test]
#[serial]
async fn test_connect_through_http_signaling() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/offer"))
        .and(body_partial_json(serde_json::json!({ "type": "offer" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sdp": "v=0\r\no=- 2 2 IN IP4 0.0.0.0\r\n",
            "type": "answer",
            "sessionid": 7
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = FakeEngine::new(EngineScript::default());
    let manager = SessionManager::builder()
        .config(config_for(&server))
        .engine(engine.clone())
        .build()
        .unwrap();
    let handler = RecordingHandler::new();
    manager.initialize(handler.clone()).await;

    assert!(manager.connect().await);
    assert_eq!(manager.session_id().as_deref(), Some("7"));
    assert!(handler.wait_for_state(ControllerState::Connected).await);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["sdp"].as_str().unwrap().contains(CANDIDATE_LINE));

    manager.cleanup().await;
}

#[tokio::test]
#[serial]
async fn test_server_error_is_a_protocol_failure() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/offer"))
        .respond_with(ResponseTemplate::new(500).set_body_string("avatar pool exhausted"))
        .mount(&server)
        .await;

    let engine = FakeEngine::new(EngineScript::default());
    let manager = SessionManager::builder()
        .config(config_for(&server))
        .engine(engine.clone())
        .build()
        .unwrap();
    let handler = RecordingHandler::new();
    manager.initialize(handler.clone()).await;

    let err = manager.try_connect().await.unwrap_err();
    assert!(matches!(err, SessionError::SignalingProtocol { .. }));
    assert!(err.to_string().contains("500"));
    assert!(engine.last().is_closed());
    assert_eq!(handler.errors().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_slow_server_times_out() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "sdp": "v=0", "type": "answer" }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let manager = SessionManager::builder()
        .config(config_for(&server))
        .engine(FakeEngine::new(EngineScript::default()))
        .build()
        .unwrap();

    let err = manager.try_connect().await.unwrap_err();
    assert!(matches!(err, SessionError::SignalingTransport { .. }));
    assert!(err.is_recoverable());
    assert!(manager.state().is_none());
}
