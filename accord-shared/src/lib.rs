//! # Accord Shared Library
//!
//! Types and business logic used by the Accord API server.
//!
//! ## Module Organization
//!
//! - `account`: account deletion coordinator and its storage seam
//! - `auth`: passwords, tokens, API keys, request authentication
//! - `db`: connection pool, migrations, PostgreSQL account store
//! - `email`: verification mail delivery
//! - `models`: database models

pub mod account;
pub mod auth;
pub mod db;
pub mod email;
pub mod models;

/// Current version of the Accord shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
