//! Credential primitives shared by the login and password-reset flows.

pub mod password;
pub mod token;
pub mod validate;

pub use password::{hash_password, verify_password, verify_password_or_dummy};
pub use token::{ResetToken, random_hex, sha256_hex};
