mod common;

use common::MockGoogle;
use pns_gateway::adapters::c2dm::C2dmService;
use pns_gateway::domain::{Payload, Payloads, Targets};
use pns_gateway::error::PushError;
use pns_gateway::services::ProviderService;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn payload() -> Payload {
    json!({"message": "hello", "count": 3}).as_object().unwrap().clone()
}

fn c2dm(mock: &MockGoogle) -> C2dmService {
    C2dmService::from_config(&mock.service_config(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_concurrent_token_requests_share_one_login() {
    let mock = MockGoogle::start().await;
    mock.set_login_delay(Duration::from_millis(100));
    let service = Arc::new(c2dm(&mock));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.auth().get_token(false).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().value, "token-1");
    }
    assert_eq!(mock.logins(), 1);
}

#[tokio::test]
async fn test_force_refresh_logs_in_again() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);

    assert_eq!(service.auth().get_token(false).await.unwrap().value, "token-1");
    assert_eq!(service.auth().get_token(false).await.unwrap().value, "token-1");
    assert_eq!(service.auth().get_token(true).await.unwrap().value, "token-2");
    assert_eq!(mock.logins(), 2);
}

#[tokio::test]
async fn test_concurrent_refreshes_of_one_stale_token_share_one_login() {
    let mock = MockGoogle::start().await;
    mock.set_login_delay(Duration::from_millis(50));
    let service = Arc::new(c2dm(&mock));
    let stale = service.auth().get_token(false).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = Arc::clone(&service);
            let stale = stale.clone();
            tokio::spawn(async move { service.auth().refresh(&stale).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().value, "token-2");
    }
    assert_eq!(mock.logins(), 2);
}

#[tokio::test]
async fn test_notify_sends_form_with_auth_header() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);

    let id = service.sender().notify("device-1", &payload()).await.unwrap();
    assert_eq!(id, "0:1");

    let sends = mock.sends();
    assert_eq!(sends.len(), 1);
    let (auth, form) = &sends[0];
    assert_eq!(auth, "GoogleLogin auth=token-1");

    let fields: Vec<(String, String)> = url::form_urlencoded::parse(form.as_bytes()).into_owned().collect();
    assert!(fields.contains(&("registration_id".into(), "device-1".into())));
    assert!(fields.contains(&("data.message".into(), "hello".into())));
    assert!(fields.contains(&("data.count".into(), "3".into())));
    let collapse_key = fields.iter().find(|(k, _)| k == "collapse_key").map(|(_, v)| v.clone()).unwrap();
    assert!(!collapse_key.is_empty());
}

#[tokio::test]
async fn test_rejected_token_is_refreshed_and_retried_once() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);
    mock.push_send_reply(401, "");

    let id = service.sender().notify("device-1", &payload()).await.unwrap();

    assert_eq!(id, "0:2");
    assert_eq!(mock.logins(), 2);
    let sends = mock.sends();
    assert_eq!(sends[0].0, "GoogleLogin auth=token-1");
    assert_eq!(sends[1].0, "GoogleLogin auth=token-2");
}

#[tokio::test]
async fn test_second_rejection_is_an_authentication_error() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);
    mock.push_send_reply(401, "");
    mock.push_send_reply(401, "");

    let result = service.sender().notify("device-1", &payload()).await;

    assert!(matches!(result, Err(PushError::Authentication)));
    assert_eq!(mock.sends().len(), 2);
    assert_eq!(mock.logins(), 2);

    // The rejected token is not reused.
    service.sender().notify("device-1", &payload()).await.unwrap();
    assert_eq!(mock.logins(), 3);
}

#[tokio::test]
async fn test_provider_error_codes() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);

    mock.push_send_reply(200, "Error=InvalidRegistration");
    assert!(matches!(service.sender().notify("bad", &payload()).await, Err(PushError::InvalidRegistration)));

    mock.push_send_reply(200, "Error=NotRegistered");
    assert!(matches!(service.sender().notify("gone", &payload()).await, Err(PushError::NotRegistered)));

    mock.push_send_reply(200, "Error=QuotaExceeded");
    assert!(matches!(service.sender().notify("busy", &payload()).await, Err(PushError::Push(code)) if code == "QuotaExceeded"));

    mock.push_send_reply(503, "");
    assert!(matches!(service.sender().notify("down", &payload()).await, Err(PushError::Upstream { code: 503 })));

    assert_eq!(mock.logins(), 1);
}

#[tokio::test]
async fn test_login_failures() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);

    mock.set_login_reply(403, "Error=BadAuthentication");
    assert!(matches!(service.auth().get_token(false).await, Err(PushError::Authentication)));

    mock.set_login_reply(200, "Auth=only-one-line");
    assert!(matches!(service.auth().get_token(false).await, Err(PushError::TokenParse(_))));

    mock.set_login_reply(500, "");
    assert!(matches!(service.auth().get_token(false).await, Err(PushError::Upstream { code: 500 })));

    assert!(mock.sends().is_empty());
}

#[tokio::test]
async fn test_batch_notify_through_provider_service() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);

    service
        .notify(Targets::from(vec!["device-1".to_string(), "device-2".to_string()]), Payloads::from(payload()))
        .await
        .unwrap();
    assert_eq!(mock.sends().len(), 2);
    assert_eq!(mock.logins(), 1);

    let result = service
        .notify(Targets::from("device-1".to_string()), Payloads::from(vec![payload(), payload()]))
        .await;
    assert!(matches!(result, Err(PushError::ArityMismatch { tokens: 1, payloads: 2 })));
    assert_eq!(mock.sends().len(), 2);
}

#[tokio::test]
async fn test_empty_targets_are_rejected() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);

    let result = service.notify(Targets::from(Vec::<String>::new()), Payloads::from(payload())).await;

    assert!(matches!(result, Err(PushError::Encoding(_))));
    assert!(mock.sends().is_empty());
    assert_eq!(mock.logins(), 0);
}

#[tokio::test]
async fn test_c2dm_has_no_feedback() {
    let mock = MockGoogle::start().await;
    let service = c2dm(&mock);
    assert!(matches!(service.feedback().await, Err(PushError::Configuration(_))));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_connection_error() {
    common::setup_tracing();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = pns_gateway::domain::ServiceConfig {
        email: Some("sender@example.com".into()),
        password: Some("hunter2".into()),
        login_url: Some(format!("http://{addr}/accounts/ClientLogin")),
        ..Default::default()
    };
    let service = C2dmService::from_config(&config, Duration::from_secs(2)).unwrap();

    assert!(matches!(service.auth().get_token(false).await, Err(PushError::Connection(_))));
}

#[test]
fn test_missing_credentials_are_rejected() {
    let config = pns_gateway::domain::ServiceConfig { email: Some("sender@example.com".into()), ..Default::default() };
    assert!(matches!(C2dmService::from_config(&config, Duration::from_secs(1)), Err(PushError::Configuration(_))));
}
