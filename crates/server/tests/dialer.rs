//! Twilio REST client against a mock server

use wiremock::matchers::{body_string_contains, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use voice_caller_server::{DialerError, TwilioClient};

const SID: &str = "AC0123456789abcdef0123456789abcdef";

fn client(server: &MockServer) -> TwilioClient {
    TwilioClient::new(server.uri(), SID, "0123456789abcdef0123456789abcdef").unwrap()
}

#[tokio::test]
async fn test_create_call_posts_form_with_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/Accounts/{SID}/Calls.json")))
        .and(header_exists("authorization"))
        .and(body_string_contains("To=%2B15550001111"))
        .and(body_string_contains("From=%2B15550002222"))
        .and(body_string_contains("Method=POST"))
        .and(body_string_contains("Url=https%3A%2F%2Fexample.ngrok.io%2Foutbound"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "sid": "CA42",
            "status": "queued",
            "direction": "outbound-api",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = client(&server)
        .create_call(
            "+15550001111",
            "+15550002222",
            "https://example.ngrok.io/outbound",
        )
        .await
        .unwrap();

    assert_eq!(record.sid, "CA42");
    assert_eq!(record.status, "queued");
}

#[tokio::test]
async fn test_api_error_message_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/Accounts/{SID}/Calls.json")))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": 21211,
            "message": "The 'To' number is not a valid phone number.",
            "status": 400,
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_call("+1", "+15550002222", "https://example.ngrok.io/outbound")
        .await
        .unwrap_err();

    match err {
        DialerError::Api { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "The 'To' number is not a valid phone number.");
        },
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_unparseable_success_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/Accounts/{SID}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = client(&server).fetch_account().await.unwrap_err();
    assert!(matches!(err, DialerError::InvalidResponse(_)));
}

async fn mount_account(server: &MockServer, numbers: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/Accounts/{SID}.json")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sid": SID,
            "friendly_name": "Buildn Sales",
            "status": "active",
        })))
        .mount(server)
        .await;

    let numbers: Vec<_> = numbers
        .iter()
        .map(|n| serde_json::json!({ "phone_number": n, "friendly_name": n }))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/Accounts/{SID}/IncomingPhoneNumbers.json")))
        .and(query_param("PageSize", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "incoming_phone_numbers": numbers,
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_check_connection_finds_caller_number() {
    let server = MockServer::start().await;
    mount_account(&server, &["+15550009999", "+15550002222"]).await;

    let check = client(&server)
        .check_connection("+15550002222")
        .await
        .unwrap();

    assert_eq!(check.account.friendly_name, "Buildn Sales");
    assert_eq!(check.account.status.as_deref(), Some("active"));
    assert_eq!(check.numbers.len(), 2);
    assert!(check.caller_number_found);
}

#[tokio::test]
async fn test_check_connection_reports_foreign_caller_number() {
    let server = MockServer::start().await;
    mount_account(&server, &["+15550009999"]).await;

    let check = client(&server)
        .check_connection("+15550002222")
        .await
        .unwrap();

    assert!(!check.caller_number_found);
}

#[tokio::test]
async fn test_bad_credentials_fail_the_check() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/Accounts/{SID}.json")))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": 20003,
            "message": "Authenticate",
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .check_connection("+15550002222")
        .await
        .unwrap_err();

    assert!(matches!(err, DialerError::Api { status: 401, .. }));
}
