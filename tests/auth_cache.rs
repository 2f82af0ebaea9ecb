mod common;

use common::*;
use dynamics_webapi::DynamicsError;
use dynamics_webapi::api::AuthCache;
use futures::future::join_all;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let cache = AuthCache::new(reqwest::Client::new(), grant(&server));
    let cancel = CancellationToken::new();

    let tokens = join_all((0..8).map(|_| cache.acquire(&cancel))).await;
    for token in tokens {
        assert_eq!(token.unwrap().header_value(), "Bearer test-token");
    }

    server.verify().await;
}

#[tokio::test]
async fn expired_token_is_refreshed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(2)
        .mount(&server)
        .await;

    let cache = AuthCache::new(reqwest::Client::new(), grant(&server));
    let cancel = CancellationToken::new();

    let first = cache.acquire(&cancel).await.unwrap();
    let cached = cache.acquire(&cancel).await.unwrap();
    assert_eq!(first, cached);

    let after_expiry = first.expires_at() + chrono::Duration::seconds(1);
    cache.acquire_at(after_expiry, &cancel).await.unwrap();

    server.verify().await;
}

#[tokio::test]
async fn rejected_credentials_fail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let cache = AuthCache::new(reqwest::Client::new(), grant(&server));
    let error = cache.acquire(&CancellationToken::new()).await.unwrap_err();

    match error {
        DynamicsError::AuthenticationFailure(message) => assert!(message.contains("invalid_client")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_caller_does_not_wait() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let cache = AuthCache::new(reqwest::Client::new(), grant(&server));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let error = cache.acquire(&cancel).await.unwrap_err();
    assert!(error.is_cancelled());
}

#[tokio::test]
async fn failed_refresh_keeps_cached_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&server)
        .await;

    let cache = AuthCache::new(reqwest::Client::new(), grant(&server));
    let cancel = CancellationToken::new();

    let cached = cache.acquire(&cancel).await.unwrap();
    let after_expiry = cached.expires_at() + chrono::Duration::seconds(1);
    let error = cache.acquire_at(after_expiry, &cancel).await.unwrap_err();
    assert!(matches!(error, DynamicsError::AuthenticationFailure(_)));

    let before_expiry = cached.expires_at() - chrono::Duration::seconds(1);
    assert_eq!(cache.acquire_at(before_expiry, &cancel).await.unwrap(), cached);

    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn cancelled_refresh_hands_over_to_next_waiter() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(token_body())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let cache = AuthCache::new(reqwest::Client::new(), grant(&server));
    let holder_cancel = CancellationToken::new();
    let waiter_cancel = CancellationToken::new();

    let holder = cache.acquire(&holder_cancel);
    let waiter = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.acquire(&waiter_cancel).await
    };
    let interrupt = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        holder_cancel.cancel();
    };
    let (holder, waiter, ()) = tokio::join!(holder, waiter, interrupt);

    assert!(holder.unwrap_err().is_cancelled());
    assert_eq!(waiter.unwrap().access_token(), "test-token");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn invalidate_forces_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
        .expect(2)
        .mount(&server)
        .await;

    let cache = AuthCache::new(reqwest::Client::new(), grant(&server));
    let cancel = CancellationToken::new();

    cache.acquire(&cancel).await.unwrap();
    cache.invalidate().await;
    cache.acquire(&cancel).await.unwrap();

    server.verify().await;
}
