//! API Layer Module
//!
//! HTTP server, routes, middleware and error mapping.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use middleware::{CorrelationId, RateLimitConfig, RateLimiter, ValidationError};
pub use server::{create_router, start_server, AppState, SharedAppState};
