/// API route handlers
///
/// Handlers organized by resource:
///
/// - `health`: health check
/// - `auth`: signup, email verification, login, token refresh
/// - `users`: the caller's profile, password and account deletion
/// - `keys`: API key management
/// - `subscription`: subscription lookup
/// - `admin`: administrator operations

pub mod admin;
pub mod auth;
pub mod health;
pub mod keys;
pub mod subscription;
pub mod users;
