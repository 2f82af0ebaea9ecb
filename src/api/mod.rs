//! Dynamics 365 Web API Module
//!
//! Typed entity and property handles, the OData query compiler, and a client
//! that layers token caching, server-driven rate limiting and pagination over
//! a bare HTTP transport.

pub mod auth;
pub mod client;
pub mod constants;
pub mod metadata;
pub mod model;
pub mod query;
pub mod resilience;

pub use auth::{AuthCache, AuthorizationToken, ClientCredentialsGrant};
pub use client::{DynamicsClient, DynamicsClientBuilder, EntityStream};
pub use metadata::{EntitySetResolver, PluralizingResolver};
pub use model::{EntityId, EntityRecord, EntityType, Many, Property, PropertyKind, Ref, Untyped};
pub use query::{Encoding, Filter, FindRequest, QueryBuilder, QueryCompiler};
pub use resilience::{LogLevel, MonitoringConfig, RateLimitConfig, RateLimitedTransport, ResilienceConfig};
