//! Production resilience and hardening features
//!
//! Provides server-driven rate limiting, a rate-limit aware transport and
//! structured request logging for Dynamics 365 API interactions.

pub mod config;
pub mod logging;
pub mod rate_limiter;
pub mod transport;

pub use config::{LogLevel, MonitoringConfig, RateLimitConfig, ResilienceConfig, ResilienceConfigBuilder};
pub use logging::{ApiLogger, OperationContext, OperationMetrics};
pub use rate_limiter::{MAX_RETRY_AFTER, RetryGate, RetryGateStats, parse_retry_after};
pub use transport::{HttpSend, RateLimitedTransport};
