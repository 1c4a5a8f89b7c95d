//! CRM Client Tests
//!
//! Delivers transcript messages to a mock ingestion endpoint and checks the
//! retry and rejection behavior.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use callbridge::core::crm::{
    CrmChannel, CrmClient, CrmError, CrmMessage, RetryPolicy, SenderKind, SenderProfile,
    TranscriptSink,
};

fn channel() -> CrmChannel {
    CrmChannel {
        service_identifier: "682200".into(),
        channel_type_code: "CX_VOICE".into(),
        bot: SenderProfile::new("bot-1", "Voice Bot"),
        connector: SenderProfile::new("conn-1", "Voice Connector"),
        agent: SenderProfile::new("agent-1", "Human Agent"),
    }
}

fn message(text: &str) -> CrmMessage {
    channel().message("room-1", "12345", SenderKind::Connector, text)
}

fn client(server: &MockServer, max_attempts: u32) -> CrmClient {
    CrmClient::new(format!("{}/ccm/message/receive", server.uri()))
        .with_timeout(Duration::from_secs(2))
        .with_retry(RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(10),
        })
}

#[tokio::test]
async fn test_delivers_json_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/ccm/message/receive"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "id": "room-1",
            "header": {
                "channelData": {
                    "channelCustomerIdentifier": "12345",
                    "serviceIdentifier": "682200",
                    "channelTypeCode": "CX_VOICE"
                },
                "sender": {
                    "id": "conn-1",
                    "type": "CONNECTOR",
                    "senderName": "Voice Connector"
                }
            },
            "body": { "type": "PLAIN", "markdownText": "hello" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, 3).deliver(&message("hello")).await.unwrap();
}

#[tokio::test]
async fn test_any_2xx_is_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, 3).deliver(&message("accepted")).await.unwrap();
}

#[tokio::test]
async fn test_retries_transient_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    client(&server, 3).deliver(&message("retry me")).await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    client(&server, 2).deliver(&message("slow down")).await.unwrap();
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client(&server, 3)
        .deliver(&message("never lands"))
        .await
        .unwrap_err();
    match err {
        CrmError::Exhausted {
            attempts,
            last_error,
        } => {
            assert_eq!(attempts, 3);
            assert!(last_error.contains("500"));
        }
        other => panic!("expected Exhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client(&server, 5)
        .deliver(&message("malformed"))
        .await
        .unwrap_err();
    match err {
        CrmError::Rejected { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "bad payload");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_exhausted() {
    // Nothing listens on this port once the server is dropped
    let uri = {
        let server = MockServer::start().await;
        server.uri()
    };
    let client = CrmClient::new(format!("{uri}/receive")).with_retry(RetryPolicy {
        max_attempts: 2,
        delay: Duration::from_millis(5),
    });

    let err = client.deliver(&message("nobody home")).await.unwrap_err();
    assert!(matches!(err, CrmError::Exhausted { attempts: 2, .. }));
}

#[tokio::test]
async fn test_unbuildable_request_is_not_retried() {
    let client = CrmClient::new("not a url").with_retry(RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_secs(5),
    });

    let err = tokio::time::timeout(Duration::from_secs(1), client.deliver(&message("hello")))
        .await
        .expect("request was retried")
        .unwrap_err();
    assert!(matches!(err, CrmError::Serialization(_)));
    assert!(!err.is_transient());
}
