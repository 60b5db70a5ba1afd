//! Middleware components for HTTP request processing.
//!
//! Cross-cutting concerns layered around the router: client identification,
//! rate limiting, request validation and response hardening.

pub mod ip;
pub mod rate_limit;
pub mod security_headers;
pub mod validation;

pub use rate_limit::{EndpointRateLimiter, RateLimiter};
