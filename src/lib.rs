//! Typed OData query compiler and rate-limit aware client for the
//! Microsoft Dynamics 365 Web API.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;

pub use error::{DynamicsError, Result};
