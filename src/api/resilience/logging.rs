//! Structured logging with correlation tracking for Dynamics 365 API operations
//!
//! Every dispatched request gets an [`OperationContext`]; request, response
//! and throttling events are written through the `log` facade as one JSON
//! object per line. Credential-bearing headers are redacted.

use super::config::{LogLevel, MonitoringConfig};
use log::{debug, error, info, warn};
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Structured logger for API operations with correlation tracking
#[derive(Debug, Clone)]
pub struct ApiLogger {
    config: MonitoringConfig,
}

/// Context for a single API operation with correlation tracking
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Unique correlation ID for this operation, empty when disabled
    pub correlation_id: String,
    /// HTTP method of the operation
    pub method: String,
    /// URL the operation targets
    pub url: String,
    /// Start time for performance tracking
    pub start_time: Instant,
}

/// Outcome of an API operation
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    /// Total duration of the operation
    pub duration: Duration,
    /// Number of 429 responses received
    pub rate_limit_attempts: u32,
    /// Whether the operation succeeded
    pub success: bool,
    /// HTTP status code returned
    pub status_code: Option<u16>,
    /// Error message if failed
    pub error_message: Option<String>,
    /// Delays requested by the server
    pub rate_limit_delays: Vec<Duration>,
}

impl ApiLogger {
    /// Create a new API logger with the given configuration
    pub fn new(config: MonitoringConfig) -> Self {
        Self { config }
    }

    /// Start tracking a new operation
    pub fn start_operation(&self, method: &Method, url: &str) -> OperationContext {
        let correlation_id = if self.config.correlation_ids {
            Uuid::new_v4().to_string()
        } else {
            String::new()
        };

        OperationContext {
            correlation_id,
            method: method.to_string(),
            url: url.to_string(),
            start_time: Instant::now(),
        }
    }

    /// Log HTTP request details
    pub fn log_request(&self, context: &OperationContext, attempt: u32, headers: &HeaderMap) {
        if !self.config.request_logging || !self.should_log(LogLevel::Debug) {
            return;
        }

        let log_data = json!({
            "event": "http_request",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "url": context.url,
            "attempt": attempt,
            "headers": sanitize_headers(headers),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        debug!("HTTP Request: {}", log_data);
    }

    /// Log HTTP response details
    pub fn log_response(&self, context: &OperationContext, status: StatusCode, headers: &HeaderMap) {
        if !self.config.request_logging || !self.should_log(LogLevel::Debug) {
            return;
        }

        let log_data = json!({
            "event": "http_response",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "url": context.url,
            "status_code": status.as_u16(),
            "duration_ms": context.elapsed().as_millis(),
            "headers": sanitize_headers(headers),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if status.is_client_error() || status.is_server_error() {
            if self.should_log(LogLevel::Warn) {
                warn!("HTTP Response (Error): {}", log_data);
            }
        } else {
            debug!("HTTP Response: {}", log_data);
        }
    }

    /// Log a 429 and the delay the server asked for
    pub fn log_rate_limit(&self, context: &OperationContext, attempt: u32, max_attempts: u32, delay: Duration) {
        if !self.should_log(LogLevel::Warn) {
            return;
        }

        let log_data = json!({
            "event": "rate_limited",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "url": context.url,
            "attempt": attempt,
            "max_attempts": max_attempts,
            "delay_ms": delay.as_millis(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        warn!("Rate Limited: {}", log_data);
    }

    /// Complete an operation and log metrics
    pub fn complete_operation(&self, context: &OperationContext, metrics: &OperationMetrics) {
        if !self.config.request_logging {
            return;
        }

        let log_data = json!({
            "event": "operation_completed",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "url": context.url,
            "duration_ms": metrics.duration.as_millis(),
            "rate_limit_attempts": metrics.rate_limit_attempts,
            "success": metrics.success,
            "status_code": metrics.status_code,
            "error_message": metrics.error_message,
            "rate_limit_delays_ms": metrics.rate_limit_delays.iter().map(|d| d.as_millis()).collect::<Vec<_>>(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if metrics.success {
            if self.should_log(LogLevel::Info) {
                info!("API Operation Completed: {}", log_data);
            }
        } else {
            error!("API Operation Failed: {}", log_data);
        }
    }

    /// Check if we should log at the given level
    fn should_log(&self, level: LogLevel) -> bool {
        level.to_level() <= self.config.log_level.to_level()
    }
}

/// Copy headers into a JSON object, redacting anything credential-like
fn sanitize_headers(headers: &HeaderMap) -> Map<String, Value> {
    let mut sanitized = Map::new();

    for (key, value) in headers {
        let key_lower = key.as_str().to_lowercase();
        let rendered = if key_lower.contains("authorization") || key_lower.contains("token") || key_lower.contains("key")
        {
            "[REDACTED]".to_string()
        } else {
            value.to_str().unwrap_or("<binary>").to_string()
        };
        sanitized.insert(key.as_str().to_string(), Value::String(rendered));
    }

    sanitized
}

impl OperationContext {
    /// Calculate elapsed time since operation started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Create metrics from this context
    pub fn create_metrics(&self, success: bool, status_code: Option<u16>, error_message: Option<String>) -> OperationMetrics {
        OperationMetrics {
            duration: self.elapsed(),
            rate_limit_attempts: 0,
            success,
            status_code,
            error_message,
            rate_limit_delays: Vec::new(),
        }
    }
}

impl OperationMetrics {
    /// Record one 429 and the delay it asked for
    pub fn add_rate_limit_delay(&mut self, delay: Duration) {
        self.rate_limit_attempts += 1;
        self.rate_limit_delays.push(delay);
    }

    /// Calculate total time spent waiting for rate limits
    pub fn total_rate_limit_delay(&self) -> Duration {
        self.rate_limit_delays.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};

    fn config(log_level: LogLevel) -> MonitoringConfig {
        MonitoringConfig {
            correlation_ids: true,
            request_logging: true,
            log_level,
        }
    }

    #[test]
    fn test_operation_context_creation() {
        let logger = ApiLogger::new(config(LogLevel::Debug));
        let context = logger.start_operation(&Method::GET, "https://org.crm.dynamics.com/api/data/v9.2/contacts");

        assert!(Uuid::parse_str(&context.correlation_id).is_ok());
        assert_eq!(context.method, "GET");
        assert!(context.url.ends_with("/contacts"));

        let quiet = ApiLogger::new(MonitoringConfig {
            correlation_ids: false,
            ..config(LogLevel::Debug)
        });
        assert!(quiet.start_operation(&Method::GET, "x").correlation_id.is_empty());
    }

    #[test]
    fn test_operation_metrics() {
        let logger = ApiLogger::new(config(LogLevel::Info));
        let context = logger.start_operation(&Method::POST, "x");

        let mut metrics = context.create_metrics(true, Some(204), None);
        assert_eq!(metrics.rate_limit_attempts, 0);

        metrics.add_rate_limit_delay(Duration::from_millis(100));
        metrics.add_rate_limit_delay(Duration::from_millis(250));

        assert_eq!(metrics.rate_limit_attempts, 2);
        assert_eq!(metrics.total_rate_limit_delay(), Duration::from_millis(350));
    }

    #[test]
    fn test_header_sanitization() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer secret-token"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-api-key", HeaderValue::from_static("secret-key"));

        let sanitized = sanitize_headers(&headers);

        assert_eq!(sanitized["authorization"], "[REDACTED]");
        assert_eq!(sanitized["content-type"], "application/json");
        assert_eq!(sanitized["x-api-key"], "[REDACTED]");
    }

    #[test]
    fn test_log_level_filtering() {
        let logger = ApiLogger::new(config(LogLevel::Warn));

        assert!(logger.should_log(LogLevel::Error));
        assert!(logger.should_log(LogLevel::Warn));
        assert!(!logger.should_log(LogLevel::Info));
        assert!(!logger.should_log(LogLevel::Debug));
        assert!(!logger.should_log(LogLevel::Trace));
    }
}
