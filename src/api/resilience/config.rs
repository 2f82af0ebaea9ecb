//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for rate-limit handling and request
//! monitoring with sane defaults.

/// Global resilience configuration for API operations
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub rate_limit: RateLimitConfig,
    pub monitoring: MonitoringConfig,
}

/// Handling of 429 responses
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Number of rate-limited responses tolerated before giving up.
    pub max_attempts: u32,
}

/// Monitoring and logging configuration
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub correlation_ids: bool,
    pub request_logging: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level(self) -> log::Level {
        match self {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            correlation_ids: true,
            request_logging: true,
            log_level: LogLevel::Info,
        }
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Conservative config for production environments
    pub fn conservative() -> Self {
        Self {
            rate_limit: RateLimitConfig { max_attempts: 3 },
            monitoring: MonitoringConfig {
                correlation_ids: true,
                request_logging: true,
                log_level: LogLevel::Warn, // Less verbose in production
            },
        }
    }

    /// Patient config for development/testing against shared sandboxes
    pub fn development() -> Self {
        Self {
            rate_limit: RateLimitConfig { max_attempts: 10 },
            monitoring: MonitoringConfig {
                correlation_ids: true,
                request_logging: true,
                log_level: LogLevel::Debug,
            },
        }
    }

    /// Give up on the first 429 and log nothing (for testing)
    pub fn disabled() -> Self {
        Self {
            rate_limit: RateLimitConfig { max_attempts: 1 },
            monitoring: MonitoringConfig {
                correlation_ids: false,
                request_logging: false,
                log_level: LogLevel::Error,
            },
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    /// Configure rate-limit handling
    pub fn rate_limit_config(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Set the 429 attempt budget (at least one)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.rate_limit.max_attempts = attempts.max(1);
        self
    }

    /// Configure monitoring
    pub fn monitoring_config(mut self, monitoring: MonitoringConfig) -> Self {
        self.config.monitoring = monitoring;
        self
    }

    /// Enable/disable correlation IDs
    pub fn correlation_ids(mut self, enabled: bool) -> Self {
        self.config.monitoring.correlation_ids = enabled;
        self
    }

    /// Enable/disable request logging
    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.monitoring.request_logging = enabled;
        self
    }

    /// Set logging level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.monitoring.log_level = level;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();

        assert_eq!(config.rate_limit.max_attempts, 5);
        assert!(config.monitoring.correlation_ids);
        assert!(config.monitoring.request_logging);
        assert_eq!(config.monitoring.log_level, LogLevel::Info);
    }

    #[test]
    fn test_presets() {
        assert_eq!(ResilienceConfig::conservative().rate_limit.max_attempts, 3);
        assert_eq!(ResilienceConfig::development().rate_limit.max_attempts, 10);

        let disabled = ResilienceConfig::disabled();
        assert_eq!(disabled.rate_limit.max_attempts, 1);
        assert!(!disabled.monitoring.request_logging);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ResilienceConfig::builder()
            .max_attempts(0)
            .request_logging(false)
            .log_level(LogLevel::Debug)
            .build();

        assert_eq!(config.rate_limit.max_attempts, 1);
        assert!(!config.monitoring.request_logging);
        assert_eq!(config.monitoring.log_level.to_level(), log::Level::Debug);
    }
}
