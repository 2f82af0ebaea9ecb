//! OAuth2 client-credentials authentication
//!
//! [`AuthCache`] holds at most one bearer token and refreshes it on demand.
//! The check-then-refresh sequence runs under one async mutex, so any number
//! of concurrent callers against an empty or expired cache trigger a single
//! round trip to the identity endpoint and all observe its result.

use crate::api::constants;
use crate::error::{DynamicsError, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use std::fmt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A bearer credential with an absolute expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationToken {
    token_type: String,
    expires_at: DateTime<Utc>,
    access_token: String,
}

impl AuthorizationToken {
    pub fn new(token_type: impl Into<String>, expires_at: DateTime<Utc>, access_token: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            expires_at,
            access_token: access_token.into(),
        }
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// A token is usable until (excluding) its expiry instant.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for AuthorizationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationToken")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// Parameters of the client-credentials grant.
#[derive(Clone)]
pub struct ClientCredentialsGrant {
    token_endpoint: String,
    resource: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentialsGrant {
    /// Grant against the Azure AD endpoint of `tenant_id`, scoped to the
    /// organization URL `resource`.
    pub fn new(
        tenant_id: &str,
        resource: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_endpoint: constants::token_endpoint(tenant_id),
            resource: resource.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Point the grant at a different identity endpoint.
    pub fn with_token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.token_endpoint = url.into();
        self
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Debug for ClientCredentialsGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsGrant")
            .field("token_endpoint", &self.token_endpoint)
            .field("resource", &self.resource)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    expires_on: UnixSeconds,
    access_token: String,
}

/// `expires_on` arrives as a string in v1 responses, some proxies send a number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UnixSeconds {
    Number(i64),
    Text(String),
}

impl UnixSeconds {
    fn to_datetime(&self) -> Result<DateTime<Utc>> {
        let seconds = match self {
            UnixSeconds::Number(n) => *n,
            UnixSeconds::Text(s) => s.trim().parse::<i64>().map_err(|e| {
                DynamicsError::AuthenticationFailure(format!("expires_on '{}' is not a unix timestamp: {}", s, e))
            })?,
        };
        DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| DynamicsError::AuthenticationFailure(format!("expires_on {} is out of range", seconds)))
    }
}

fn parse_token(body: &str) -> Result<AuthorizationToken> {
    let response: TokenResponse = serde_json::from_str(body)
        .map_err(|e| DynamicsError::AuthenticationFailure(format!("unreadable token response: {}", e)))?;
    let expires_at = response.expires_on.to_datetime()?;
    Ok(AuthorizationToken::new(response.token_type, expires_at, response.access_token))
}

/// Single-flight, expiry-aware token cache.
pub struct AuthCache {
    http: reqwest::Client,
    grant: ClientCredentialsGrant,
    token: Mutex<Option<AuthorizationToken>>,
}

impl AuthCache {
    pub fn new(http: reqwest::Client, grant: ClientCredentialsGrant) -> Self {
        Self {
            http,
            grant,
            token: Mutex::new(None),
        }
    }

    pub fn grant(&self) -> &ClientCredentialsGrant {
        &self.grant
    }

    /// Current token, refreshed when missing or expired.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<AuthorizationToken> {
        self.acquire_at(Utc::now(), cancel).await
    }

    /// Like [`AuthCache::acquire`] with an explicit notion of "now".
    ///
    /// Cancelling one waiter never blocks the others: a caller cancelled while
    /// refreshing releases the lock and the next waiter refreshes instead.
    pub async fn acquire_at(&self, now: DateTime<Utc>, cancel: &CancellationToken) -> Result<AuthorizationToken> {
        let mut cached = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DynamicsError::Cancelled),
            guard = self.token.lock() => guard,
        };

        if let Some(token) = cached.as_ref().filter(|token| token.is_valid_at(now)) {
            return Ok(token.clone());
        }

        debug!("Requesting token from {}", self.grant.token_endpoint);
        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DynamicsError::Cancelled),
            token = self.request_token() => token?,
        };

        info!("Acquired {} token valid until {}", token.token_type, token.expires_at);
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Forget the cached token so the next caller refreshes.
    pub async fn invalidate(&self) {
        self.token.lock().await.take();
    }

    async fn request_token(&self) -> Result<AuthorizationToken> {
        let response = self
            .http
            .post(&self.grant.token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.grant.client_id.as_str()),
                ("client_secret", self.grant.client_secret.as_str()),
                ("resource", self.grant.resource.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DynamicsError::AuthenticationFailure(format!("token request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DynamicsError::AuthenticationFailure(format!("token response unreadable: {}", e)))?;

        if !status.is_success() {
            warn!("Identity endpoint answered {}", status);
            return Err(DynamicsError::AuthenticationFailure(format!(
                "identity endpoint returned {}: {}",
                status, body
            )));
        }

        parse_token(&body)
    }
}

impl fmt::Debug for AuthCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCache").field("grant", &self.grant).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_string_and_numeric_expiry() {
        let text = parse_token(r#"{"token_type":"Bearer","expires_on":"1700000000","access_token":"abc"}"#).unwrap();
        let number = parse_token(r#"{"token_type":"Bearer","expires_on":1700000000,"access_token":"abc"}"#).unwrap();

        assert_eq!(text, number);
        assert_eq!(text.expires_at(), Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        assert_eq!(text.header_value(), "Bearer abc");
    }

    #[test]
    fn rejects_unusable_payloads() {
        for body in [
            "not json",
            r#"{"token_type":"Bearer","access_token":"abc"}"#,
            r#"{"token_type":"Bearer","expires_on":"soon","access_token":"abc"}"#,
        ] {
            assert!(matches!(parse_token(body), Err(DynamicsError::AuthenticationFailure(_))));
        }
    }

    #[test]
    fn validity_is_strictly_before_expiry() {
        let expiry = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let token = AuthorizationToken::new("Bearer", expiry, "abc");

        assert!(token.is_valid_at(expiry - chrono::Duration::seconds(1)));
        assert!(!token.is_valid_at(expiry));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let token = AuthorizationToken::new("Bearer", Utc::now(), "super-secret");
        let grant = ClientCredentialsGrant::new("tenant", "https://org.crm.dynamics.com", "id", "hunter2");

        assert!(!format!("{:?}", token).contains("super-secret"));
        assert!(!format!("{:?}", grant).contains("hunter2"));
    }
}
