//! # cropdoc backend library
//!
//! REST backend for crop disease detection. Farmers upload leaf photos, the
//! service stores three renditions of each image, asks an external ML service
//! for a diagnosis and links the answer to a disease catalog.
//!
//! ## Architecture
//!
//! - **Axum** for routing, extractors and middleware
//! - **SQLx** with SQLite for accounts, images, predictions and the catalog
//! - **jsonwebtoken** / **argon2** for authentication
//! - **image** for the processed and thumbnail renditions
//! - **reqwest** for the ML service, **aws-sdk-s3** or local disk for storage
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration and startup validation
//! - [`db`]: schema initialization
//! - [`error`]: `AppError` and the JSON error envelope
//! - [`auth`]: password hashing, tokens and request guards
//! - [`services`]: business operations per domain
//! - [`routes`]: HTTP handlers and the router
//! - [`storage`]: object storage backends
//! - [`ml`]: ML service client
//! - [`imaging`]: rendition generation
//! - [`middleware`]: rate limiting, request validation and security headers

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod imaging;
pub mod metrics;
pub mod middleware;
pub mod ml;
pub mod models;
pub mod response;
pub mod routes;
pub mod seed;
pub mod services;
pub mod state;
pub mod storage;

#[cfg(test)]
mod tests;
