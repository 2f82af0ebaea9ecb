mod common;

use common::*;
use dynamics_webapi::DynamicsError;
use dynamics_webapi::api::{FindRequest, ResilienceConfig};
use reqwest::StatusCode;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page(names: &[&str]) -> serde_json::Value {
    let value: Vec<_> = names.iter().map(|name| json!({ "casenumber": name })).collect();
    json!({ "@odata.context": "https://org/api/data/v9.2/$metadata#incidents", "value": value })
}

#[tokio::test]
async fn throttled_request_waits_and_retries() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(api_path("incidents")))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(api_path("incidents")))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(&["CAS-1"])))
        .mount(&server)
        .await;

    let client = client(&server);
    let cancel = CancellationToken::new();
    let request = FindRequest::<Incident>::all();

    let started = Instant::now();
    let first = client.find_all(&request, &cancel);
    let second = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let started = Instant::now();
        let records = client.find_all(&request, &cancel).await;
        (records, started.elapsed())
    };
    let (first, (second, second_waited)) = tokio::join!(first, second);

    assert_eq!(first.unwrap().len(), 1);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(second.unwrap().len(), 1);
    assert!(second_waited >= Duration::from_millis(1500), "second caller waited {:?}", second_waited);

    let stats = client.transport().gate().stats();
    assert_eq!(stats.deferrals, 1);
}

#[tokio::test]
async fn gives_up_after_attempt_budget() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(api_path("incidents")))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_with(&server, ResilienceConfig::builder().max_attempts(3).build());
    let error = client
        .find_all(&FindRequest::<Incident>::all(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, DynamicsError::RetryExhausted { attempts: 3 }));
    assert_eq!(error.status(), Some(StatusCode::TOO_MANY_REQUESTS));
    server.verify().await;
}

#[tokio::test]
async fn missing_retry_after_is_malformed() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(api_path("incidents")))
        .respond_with(ResponseTemplate::new(429))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let error = client
        .find_all(&FindRequest::<Incident>::all(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, DynamicsError::MalformedServerResponse(_)));
}

#[tokio::test]
async fn oversized_retry_after_is_malformed() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(api_path("incidents")))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "18446744073709551615"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let error = client
        .find_all(&FindRequest::<Incident>::all(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, DynamicsError::MalformedServerResponse(_)));
    assert!(client.transport().gate().stats().open);
    server.verify().await;
}

#[tokio::test]
async fn unexpected_status_carries_body() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(api_path("incidents")))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad $filter"))
        .mount(&server)
        .await;

    let client = client(&server);
    let error = client
        .find_all(&FindRequest::<Incident>::all(), &CancellationToken::new())
        .await
        .unwrap_err();

    match error {
        DynamicsError::Transport { status, reason, body } => {
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(reason, "Bad Request");
            assert_eq!(body, "bad $filter");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn allowed_status_is_passed_through() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    let id = Uuid::new_v4();
    Mock::given(method("GET"))
        .and(path(api_path(&format!("incidents({})", id))))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(&server);
    let record = client
        .retrieve(id, &FindRequest::<Incident>::all(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(record.is_none());
}

#[tokio::test]
async fn cancellation_interrupts_a_deferred_wait() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path(api_path("incidents")))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let client = client(&server);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let error = client
        .find_all(&FindRequest::<Incident>::all(), &cancel)
        .await
        .unwrap_err();

    assert!(error.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(10));
}
