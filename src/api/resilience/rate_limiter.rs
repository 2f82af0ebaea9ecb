//! Server-driven rate limiting
//!
//! Dynamics 365 answers throttled requests with `429 Too Many Requests` and a
//! `Retry-After` header. A [`RetryGate`] remembers the instant the server
//! asked us to come back and holds back *every* request of the owning client
//! until then, not only the one that was throttled. Concurrent updates are
//! last-writer-wins.

use crate::api::constants::headers;
use crate::error::{DynamicsError, Result};
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::header::HeaderMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Shared "not before" instant for one client
#[derive(Debug, Clone)]
pub struct RetryGate {
    inner: Arc<Mutex<RetryGateInner>>,
}

#[derive(Debug)]
struct RetryGateInner {
    retry_at: Instant,
    deferrals: u64,
    waits: u64,
    waited: Duration,
}

impl RetryGate {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RetryGateInner {
                retry_at: Instant::now(),
                deferrals: 0,
                waits: 0,
                waited: Duration::ZERO,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RetryGateInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Instant before which no request should be sent
    pub fn retry_at(&self) -> Instant {
        self.lock().retry_at
    }

    /// Hold back requests until `at`, replacing any earlier value
    pub fn defer_until(&self, at: Instant) {
        let mut inner = self.lock();
        inner.retry_at = at;
        inner.deferrals += 1;
        debug!("Retry gate: closed for {:?}", at.saturating_duration_since(Instant::now()));
    }

    /// Hold back requests for `delay`, at most [`MAX_RETRY_AFTER`]
    pub fn defer_for(&self, delay: Duration) {
        self.defer_until(Instant::now() + delay.min(MAX_RETRY_AFTER));
    }

    /// Suspend until the gate is open
    ///
    /// The gate is re-read after every sleep, so a deferral written while we
    /// were waiting extends the wait.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        loop {
            let retry_at = self.retry_at();
            let now = Instant::now();
            if retry_at <= now {
                return Ok(());
            }

            debug!("Retry gate: waiting {:?}", retry_at - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DynamicsError::Cancelled),
                _ = sleep_until(retry_at) => {}
            }

            let mut inner = self.lock();
            inner.waits += 1;
            inner.waited += retry_at - now;
        }
    }

    /// Get current gate statistics
    pub fn stats(&self) -> RetryGateStats {
        let inner = self.lock();
        RetryGateStats {
            deferrals: inner.deferrals,
            waits: inner.waits,
            total_wait: inner.waited,
            open: inner.retry_at <= Instant::now(),
        }
    }

    /// Open the gate and clear statistics
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.retry_at = Instant::now();
        inner.deferrals = 0;
        inner.waits = 0;
        inner.waited = Duration::ZERO;
    }
}

impl Default for RetryGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry gate statistics
#[derive(Debug, Clone)]
pub struct RetryGateStats {
    /// Number of 429 responses that moved the gate
    pub deferrals: u64,
    /// Number of times a request had to wait
    pub waits: u64,
    /// Total time spent waiting
    pub total_wait: Duration,
    /// Whether requests may go out right now
    pub open: bool,
}

/// Longest server-requested delay that is honoured
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

/// Parse `Retry-After` into a delay from `now`
///
/// Supports both forms of RFC 9110:
/// - delta seconds: `"120"`
/// - HTTP-date: `"Wed, 21 Oct 2015 07:28:00 GMT"`, a date in the past gives
///   a zero delay
///
/// A missing or unreadable header, or a delay beyond [`MAX_RETRY_AFTER`], is a
/// [`DynamicsError::MalformedServerResponse`].
pub fn parse_retry_after(response_headers: &HeaderMap, now: DateTime<Utc>) -> Result<Duration> {
    let value = response_headers
        .get(headers::RETRY_AFTER)
        .ok_or_else(|| DynamicsError::malformed("429 response without Retry-After"))?
        .to_str()
        .map_err(|_| DynamicsError::malformed("Retry-After is not valid text"))?
        .trim();

    let delay = match value.parse::<u64>() {
        Ok(seconds) => Duration::from_secs(seconds),
        Err(_) => {
            let date = DateTime::parse_from_rfc2822(value)
                .map_err(|_| DynamicsError::malformed(format!("unreadable Retry-After '{}'", value)))?;
            (date.with_timezone(&Utc) - now).to_std().unwrap_or(Duration::ZERO)
        }
    };

    if delay > MAX_RETRY_AFTER {
        return Err(DynamicsError::malformed(format!(
            "Retry-After '{}' exceeds {} seconds",
            value,
            MAX_RETRY_AFTER.as_secs()
        )));
    }

    Ok(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::HeaderValue;

    fn retry_after(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(headers::RETRY_AFTER, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn test_parse_delta_seconds() {
        let now = Utc::now();
        assert_eq!(parse_retry_after(&retry_after("2"), now).unwrap(), Duration::from_secs(2));
        assert_eq!(parse_retry_after(&retry_after(" 0 "), now).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_http_date() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 30).unwrap();
        let headers = retry_after("Wed, 21 Oct 2015 07:28:00 GMT");
        assert_eq!(parse_retry_after(&headers, now).unwrap(), Duration::from_secs(30));

        let later = Utc.with_ymd_and_hms(2015, 10, 21, 8, 0, 0).unwrap();
        assert_eq!(parse_retry_after(&headers, later).unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_missing_or_garbage_is_malformed() {
        let now = Utc::now();
        for headers in [HeaderMap::new(), retry_after("soon"), retry_after("-5")] {
            assert!(matches!(
                parse_retry_after(&headers, now),
                Err(DynamicsError::MalformedServerResponse(_))
            ));
        }
    }

    #[test]
    fn test_unbounded_delay_is_malformed() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 0, 0).unwrap();
        for value in ["18446744073709551615", "86401", "Fri, 21 Oct 2016 07:00:00 GMT"] {
            assert!(matches!(
                parse_retry_after(&retry_after(value), now),
                Err(DynamicsError::MalformedServerResponse(_))
            ));
        }
        assert_eq!(parse_retry_after(&retry_after("86400"), now).unwrap(), MAX_RETRY_AFTER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_honours_latest_deferral() {
        let gate = RetryGate::new();
        let cancel = CancellationToken::new();

        gate.defer_for(Duration::from_secs(1));
        gate.defer_for(Duration::from_secs(3));

        let start = Instant::now();
        gate.wait(&cancel).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(3));

        let stats = gate.stats();
        assert_eq!(stats.deferrals, 2);
        assert_eq!(stats.waits, 1);
        assert!(stats.open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_defer_for_is_bounded() {
        let gate = RetryGate::new();
        gate.defer_for(Duration::MAX);
        assert!(gate.retry_at() <= Instant::now() + MAX_RETRY_AFTER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let gate = RetryGate::new();
        let cancel = CancellationToken::new();
        gate.defer_for(Duration::from_secs(60));

        let waiter = {
            let gate = gate.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { gate.wait(&cancel).await })
        };
        cancel.cancel();

        assert!(matches!(waiter.await.unwrap(), Err(DynamicsError::Cancelled)));
    }

    #[tokio::test]
    async fn test_open_gate_does_not_wait() {
        let gate = RetryGate::new();
        gate.wait(&CancellationToken::new()).await.unwrap();
        assert_eq!(gate.stats().waits, 0);

        gate.defer_for(Duration::from_secs(30));
        gate.reset();
        assert!(gate.stats().open);
    }
}
