//! Integration and unit tests for the cropdoc backend.
//!
//! API tests drive the full router in-process through `tower::ServiceExt::oneshot`
//! against a temporary SQLite database, an in-memory image store and a mock ML
//! client (see [`support`]).
//!
//! ## Test Modules
//!
//! - **auth_api_tests**: registration, login, tokens and account self-service
//! - **users_api_tests**: admin user management and soft delete
//! - **members_api_tests**: farmer and admin directories
//! - **images_api_tests**: upload pipeline, serving and deletion
//! - **ml_api_tests**: ML health and prediction flows
//! - **diseases_api_tests**: disease catalog and detection history
//! - **health_api_tests**: probes, metrics and global middleware
//! - **config_tests**, **db_tests**, **error_tests**: building blocks
//!
//! Individual modules can be run with:
//! ```bash
//! cargo test images_api_tests
//! ```

pub mod support;

pub mod config_tests;
pub mod db_tests;
pub mod members_api_tests;
pub mod ml_api_tests;
