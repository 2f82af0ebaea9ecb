//! Rate-limit aware request dispatch
//!
//! [`RateLimitedTransport`] wraps a bare [`HttpSend`] and owns the client's
//! [`RetryGate`]. Requests are described by a factory rather than passed in
//! directly, because a throttled request has to be rebuilt (fresh body, and
//! possibly a fresh bearer token) before it is sent again.

use super::config::{RateLimitConfig, ResilienceConfig};
use super::logging::{ApiLogger, OperationContext};
use super::rate_limiter::{RetryGate, parse_retry_after};
use crate::error::{DynamicsError, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use reqwest::{Request, Response, StatusCode};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// The bare HTTP sender underneath the transport.
///
/// Timeouts, TLS and connection pooling are the sender's business.
#[async_trait]
pub trait HttpSend: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl HttpSend for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response> {
        Ok(self.execute(request).await?)
    }
}

#[derive(Debug)]
pub struct RateLimitedTransport<S = reqwest::Client> {
    sender: S,
    gate: RetryGate,
    rate_limit: RateLimitConfig,
    logger: ApiLogger,
}

/// Bookkeeping across the attempts of one `send`
#[derive(Default)]
struct Attempts {
    context: Option<OperationContext>,
    rate_limited: u32,
    delays: Vec<Duration>,
    status: Option<StatusCode>,
}

impl<S: HttpSend> RateLimitedTransport<S> {
    pub fn new(sender: S, config: &ResilienceConfig) -> Self {
        Self {
            sender,
            gate: RetryGate::new(),
            rate_limit: config.rate_limit.clone(),
            logger: ApiLogger::new(config.monitoring.clone()),
        }
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// The shared throttle every request of this transport passes through
    pub fn gate(&self) -> &RetryGate {
        &self.gate
    }

    pub fn max_attempts(&self) -> u32 {
        self.rate_limit.max_attempts
    }

    /// Send the request produced by `factory`
    ///
    /// - 2xx is returned
    /// - 429 moves the shared gate by `Retry-After` and retries until the
    ///   attempt budget is spent
    /// - statuses listed in `allowed` are returned unmodified
    /// - anything else becomes [`DynamicsError::Transport`] with the body read
    pub async fn send<F, Fut>(&self, factory: F, allowed: &[StatusCode], cancel: &CancellationToken) -> Result<Response>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Request>> + Send,
    {
        let mut attempts = Attempts::default();
        let outcome = self.dispatch(&factory, allowed, cancel, &mut attempts).await;

        if let Some(context) = &attempts.context {
            let mut metrics = context.create_metrics(
                outcome.is_ok(),
                attempts.status.map(|s| s.as_u16()),
                outcome.as_ref().err().map(ToString::to_string),
            );
            for delay in &attempts.delays {
                metrics.add_rate_limit_delay(*delay);
            }
            self.logger.complete_operation(context, &metrics);
        }

        outcome
    }

    async fn dispatch<F, Fut>(
        &self,
        factory: &F,
        allowed: &[StatusCode],
        cancel: &CancellationToken,
        attempts: &mut Attempts,
    ) -> Result<Response>
    where
        F: Fn() -> Fut + Send + Sync,
        Fut: Future<Output = Result<Request>> + Send,
    {
        loop {
            self.gate.wait(cancel).await?;

            let request = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DynamicsError::Cancelled),
                request = factory() => request?,
            };

            let context = attempts
                .context
                .get_or_insert_with(|| self.logger.start_operation(request.method(), request.url().as_str()))
                .clone();
            self.logger.log_request(&context, attempts.rate_limited + 1, request.headers());

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DynamicsError::Cancelled),
                response = self.sender.send(request) => response?,
            };

            let status = response.status();
            attempts.status = Some(status);
            self.logger.log_response(&context, status, response.headers());

            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let delay = parse_retry_after(response.headers(), Utc::now())?;
                self.gate.defer_for(delay);

                attempts.rate_limited += 1;
                attempts.delays.push(delay);
                self.logger
                    .log_rate_limit(&context, attempts.rate_limited, self.rate_limit.max_attempts, delay);

                if attempts.rate_limited >= self.rate_limit.max_attempts {
                    return Err(DynamicsError::RetryExhausted {
                        attempts: attempts.rate_limited,
                    });
                }
                continue;
            }

            if allowed.contains(&status) {
                debug!("Passing through allowed status {}", status);
                return Ok(response);
            }

            let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DynamicsError::Cancelled),
                body = response.text() => body?,
            };
            return Err(DynamicsError::Transport { status, reason, body });
        }
    }
}
