//! Password hashing, JWT issuance and the request guards built on them.

pub mod guard;
pub mod password;
pub mod token;

pub use guard::{AuthUser, RequireAdmin, RequireFarmer, RequireMember};
pub use password::{hash_password, verify_password};
pub use token::{Claims, TokenKind, TokenPair, TokenService};
